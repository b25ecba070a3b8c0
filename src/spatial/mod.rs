// Purpose: arrangement of virtual sound sources for 3D placement
// Recomputed every tick from the live voice count and the coherence scalar

pub mod geometry;
pub mod mapper;
