// Purpose: turn concurrently-arriving observations into one decision per tick
// Adapters write through `InputPort`; the tick thread owns `InputFusionCore`

pub mod event;
pub mod fusion;
pub mod gesture;
