// Purpose: the fixed-size expression voice pool
// Voices are owned by the allocator and only mutated from the tick thread

pub mod allocator;
pub mod message;
pub mod voice;
