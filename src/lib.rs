pub mod engine; // Fixed-rate control loop, routing, sinks, diagnostics
pub mod input; // Input fusion and gesture qualification
pub mod io;
pub mod spatial; // Source geometry derived from voices and coherence
pub mod voice; // Voice pool and host note commands

pub use engine::{
    config::{ConfigError, EngineConfig, FieldConfig, GestureConfig, RouterConfig},
    diagnostics::DiagnosticsSnapshot,
    scheduler::{ControlLoopScheduler, SchedulerError},
    Engine,
};
pub use input::{
    event::{GestureObservation, GestureSymbol, InputSource, NormalizedInputEvent, Payload},
    fusion::{ActiveInputDecision, DecisionReason, InputFusionCore, InputPort},
    gesture::GestureQualifier,
};
pub use spatial::{
    geometry::{FieldGeometry, GeometryClass, GeometryKind, Point3},
    mapper::SpatialFieldMapper,
};
pub use voice::{
    allocator::VoiceAllocator,
    voice::{Voice, VoiceHandle},
};

/// MPE lower zone: one master channel plus at most fifteen member channels.
pub const MAX_VOICES: usize = 15;
