//! The tick pipeline: fusion → voices → geometry → dispatch.
//!
//! [`Engine`] owns all four sub-components by value. One call to
//! [`Engine::tick_at`] runs the whole pipeline synchronously; the
//! [`scheduler::ControlLoopScheduler`] calls it at a fixed rate on its own
//! thread. Input adapters only ever touch the engine through an
//! [`InputPort`].

pub mod config;
pub mod diagnostics;
pub mod router;
pub mod scheduler;
pub mod sink;

use std::{sync::Arc, time::Instant};

use tracing::info;

use self::{
    config::{ConfigError, EngineConfig},
    diagnostics::{Diagnostics, DiagnosticsSnapshot, TickMeter},
    router::ExpressionRouter,
    sink::{ExpressionBatch, ExpressionSink, NoteChange, SourceAssignment, SpatialSink},
};
use crate::{
    input::{
        event::{InputSource, Payload},
        fusion::{ActiveInputDecision, InputFusionCore, InputPort},
    },
    spatial::{
        geometry::{FieldGeometry, GeometryClass},
        mapper::SpatialFieldMapper,
    },
    voice::{
        allocator::{VoiceAllocator, VoiceEvent},
        message::{MessageReceiver, NoteMessage},
    },
};

/// Bio payloads are 0..1; coherence boundaries are expressed on 0..100.
pub const COHERENCE_SCALE: f32 = 100.0;

/// Upper bound on host note messages handled in one tick
const MAX_NOTE_MESSAGES_PER_TICK: usize = 64;

pub struct Engine {
    config: EngineConfig,
    fusion: InputFusionCore,
    voices: VoiceAllocator,
    mapper: SpatialFieldMapper,
    router: ExpressionRouter,
    notes: Option<Box<dyn MessageReceiver + Send>>,
    expression_sinks: Vec<Box<dyn ExpressionSink>>,
    spatial_sinks: Vec<Box<dyn SpatialSink>>,
    batch: ExpressionBatch,
    assignments: Vec<SourceAssignment>,
    coherence: f32,
    meter: TickMeter,
    diagnostics: Arc<Diagnostics>,
    last_decision: Option<ActiveInputDecision>,
    tick_count: u64,
    dropped_deltas: u64,
    overrun_ticks: u64,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let engine = Self {
            fusion: InputFusionCore::from_config(&config)?,
            voices: VoiceAllocator::new(config.max_voices)?,
            mapper: SpatialFieldMapper::new(config.field)?,
            router: ExpressionRouter::new(config.router),
            notes: None,
            expression_sinks: Vec::new(),
            spatial_sinks: Vec::new(),
            // Worst case: every channel stolen and restarted in one tick
            batch: ExpressionBatch::with_capacity(config.max_voices * 3),
            assignments: Vec::with_capacity(config.max_voices),
            coherence: 0.0,
            meter: TickMeter::new(),
            diagnostics: Arc::new(Diagnostics::new()),
            last_decision: None,
            tick_count: 0,
            dropped_deltas: 0,
            overrun_ticks: 0,
            config,
        };
        engine.publish(None);
        Ok(engine)
    }

    /// Receive host note commands, drained at the start of voice handling
    pub fn with_note_receiver(mut self, receiver: impl MessageReceiver + Send + 'static) -> Self {
        self.notes = Some(Box::new(receiver));
        self
    }

    pub fn with_expression_sink(mut self, sink: impl ExpressionSink + 'static) -> Self {
        self.expression_sinks.push(Box::new(sink));
        self
    }

    pub fn with_spatial_sink(mut self, sink: impl SpatialSink + 'static) -> Self {
        self.spatial_sinks.push(Box::new(sink));
        self
    }

    /// Producer handle for input adapters
    pub fn input_port(&self) -> InputPort {
        self.fusion.port()
    }

    /// Shared read-only diagnostics surface
    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        Arc::clone(&self.diagnostics)
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn voices(&self) -> &VoiceAllocator {
        &self.voices
    }

    pub fn fusion(&self) -> &InputFusionCore {
        &self.fusion
    }

    pub fn geometry(&self) -> Option<&FieldGeometry> {
        self.mapper.geometry()
    }

    /// Coherence on the 0..100 scale, held while bio input is stale
    pub fn coherence(&self) -> f32 {
        self.coherence
    }

    pub fn last_decision(&self) -> Option<&ActiveInputDecision> {
        self.last_decision.as_ref()
    }

    pub fn tick(&mut self) -> ActiveInputDecision {
        self.tick_at(Instant::now())
    }

    /// Run one full pipeline pass as of `now`.
    pub fn tick_at(&mut self, now: Instant) -> ActiveInputDecision {
        // 1. arbitration
        let decision = self.fusion.resolve_at(now);

        // 2. voice and expression state
        self.router.apply(&decision, &mut self.voices);
        self.drain_notes();
        if let Some(event) = self.fusion.fresh(InputSource::Bio, now) {
            if let Payload::Scalar(value) = event.payload {
                if value.is_finite() {
                    self.coherence = value * COHERENCE_SCALE;
                }
            }
        }

        // 3. geometry
        let geometry = self
            .mapper
            .compute_geometry_at(self.voices.live_count(), self.coherence, now);

        // 4. dispatch
        self.batch.begin(self.tick_count);
        for event in self.voices.drain_events() {
            match event {
                VoiceEvent::NoteOn {
                    channel,
                    note,
                    velocity,
                } => self
                    .batch
                    .push_note(channel, NoteChange::On { note, velocity }),
                VoiceEvent::NoteOff { channel, note, .. } => {
                    self.batch.push_note(channel, NoteChange::Off { note })
                }
            }
        }
        let batch = &mut self.batch;
        self.voices
            .flush_dirty(|voice, dirty| batch.push_expression(voice, dirty));
        for sink in &mut self.expression_sinks {
            self.dropped_deltas += sink.dispatch(&self.batch) as u64;
        }

        self.assignments.clear();
        self.assignments
            .extend(self.voices.voices().enumerate().filter_map(|(index, voice)| {
                geometry.source_for(index).map(|source| SourceAssignment {
                    channel: voice.channel(),
                    source,
                })
            }));
        for sink in &mut self.spatial_sinks {
            sink.update(geometry, &self.assignments);
        }
        let class = geometry.class();

        // 5. measurement
        self.tick_count += 1;
        self.meter.record(now);
        self.last_decision = Some(decision);
        self.publish(Some(class));
        decision
    }

    /// Apply a new configuration between ticks.
    ///
    /// Shrinking the voice count releases voices on the dropped channels.
    pub fn reconfigure(&mut self, config: EngineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.fusion.set_staleness(config.staleness)?;
        self.fusion.set_gesture_config(config.gesture)?;
        self.voices.resize(config.max_voices)?;
        self.mapper.set_config(config.field)?;
        self.router.set_config(config.router);
        if config.tick_rate_hz != self.config.tick_rate_hz {
            self.meter.reset();
        }
        self.config = config;
        info!(
            tick_rate_hz = config.tick_rate_hz,
            max_voices = config.max_voices,
            staleness_ms = config.staleness.as_millis() as u64,
            "engine reconfigured"
        );
        self.publish(self.mapper.geometry().map(FieldGeometry::class));
        Ok(())
    }

    /// Count tick periods skipped by the scheduler.
    pub(crate) fn record_overrun(&mut self, skipped: u32) {
        self.overrun_ticks += skipped as u64;
    }

    fn drain_notes(&mut self) {
        let Some(notes) = self.notes.as_mut() else {
            return;
        };
        for _ in 0..MAX_NOTE_MESSAGES_PER_TICK {
            let Some(message) = notes.pop() else { break };
            match message {
                NoteMessage::NoteOn { note, velocity } => {
                    self.voices.allocate(note, velocity);
                }
                NoteMessage::NoteOff { note } => {
                    self.voices.release_note(note);
                }
                NoteMessage::AllNotesOff => self.voices.release_all(),
            }
        }
    }

    fn publish(&self, geometry: Option<GeometryClass>) {
        self.diagnostics.publish(&DiagnosticsSnapshot {
            measured_hz: self.meter.hz(),
            target_hz: self.config.tick_rate_hz,
            last_source: self.router.last_source(),
            live_voices: self.voices.live_count(),
            max_voices: self.voices.capacity(),
            steal_count: self.voices.steal_count(),
            stale_skip_count: self.fusion.stale_skips(),
            dropped_deltas: self.dropped_deltas,
            overrun_ticks: self.overrun_ticks,
            tick_count: self.tick_count,
            geometry,
        });
    }
}
