//! Embody - application wiring and run modes

use std::{
    thread,
    time::{Duration, Instant},
};

use color_eyre::eyre::{Result as EyreResult, WrapErr};
use rtrb::RingBuffer;
use tracing::{info, trace};

use embody::{
    engine::sink::{ExpressionDelta, SourceAssignment},
    io::{midi::MidiEvent, mpe::MpeEncoder},
    voice::message::NoteMessage,
    ConfigError, ControlLoopScheduler, DiagnosticsSnapshot, Engine, EngineConfig, FieldGeometry,
};

use super::sim::Simulation;
use super::ui::{FieldView, UiApp};

const DELTA_RING: usize = 1024;
const MIDI_RING: usize = 4096;
const FIELD_RING: usize = 8;
const NOTE_RING: usize = 64;
const REPORT_EVERY: Duration = Duration::from_secs(1);

pub struct Embody {
    config: EngineConfig,
}

impl Embody {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run for `duration`, encoding MPE into a ring that is drained and
    /// counted, then print the final diagnostics.
    pub fn run_headless(self, duration: Duration) -> EyreResult<()> {
        let (midi_tx, mut midi_rx) = RingBuffer::<MidiEvent>::new(MIDI_RING);
        let mut encoder = MpeEncoder::new(midi_tx);
        encoder.zone_configuration(self.config.max_voices as u8);

        let engine = Engine::new(self.config)?.with_expression_sink(encoder);
        let scheduler = ControlLoopScheduler::new(engine);
        scheduler.start().wrap_err("failed to start control loop")?;
        let mut sim = Simulation::spawn(scheduler.input_port())?;

        info!(
            rate_hz = self.config.tick_rate_hz,
            voices = self.config.max_voices,
            ?duration,
            "running headless"
        );

        let started = Instant::now();
        let mut last_report = started;
        let mut midi_events = 0u64;
        while started.elapsed() < duration {
            thread::sleep(Duration::from_millis(50));
            while let Ok(event) = midi_rx.pop() {
                trace!(?event, "midi");
                midi_events += 1;
            }
            if last_report.elapsed() >= REPORT_EVERY {
                last_report = Instant::now();
                report(&scheduler.diagnostics());
            }
        }

        sim.stop();
        scheduler.stop();
        while midi_rx.pop().is_ok() {
            midi_events += 1;
        }

        let snapshot = scheduler.diagnostics();
        println!("=== embody ===");
        println!(
            "rate:        {:.2} Hz (target {:.0})",
            snapshot.measured_hz, snapshot.target_hz
        );
        println!("ticks:       {}", snapshot.tick_count);
        println!("overruns:    {}", snapshot.overrun_ticks);
        println!(
            "voices:      {}/{} ({:.0}%)",
            snapshot.live_voices,
            snapshot.max_voices,
            snapshot.voice_utilization() * 100.0
        );
        println!("steals:      {}", snapshot.steal_count);
        println!("stale skips: {}", snapshot.stale_skip_count);
        println!("dropped:     {}", snapshot.dropped_deltas);
        println!(
            "geometry:    {}",
            snapshot.geometry.map_or("none", |g| g.name())
        );
        println!("midi events: {midi_events}");
        Ok(())
    }

    /// Run the dashboard until the user quits
    pub fn run_dashboard(self) -> EyreResult<()> {
        let (delta_tx, delta_rx) = RingBuffer::<ExpressionDelta>::new(DELTA_RING);
        let (mut field_tx, field_rx) = RingBuffer::<FieldView>::new(FIELD_RING);
        let (note_tx, note_rx) = RingBuffer::<NoteMessage>::new(NOTE_RING);

        let engine = Engine::new(self.config)?
            .with_note_receiver(note_rx)
            .with_expression_sink(delta_tx)
            .with_spatial_sink(
                move |geometry: &FieldGeometry, assignments: &[SourceAssignment]| {
                    // A full ring just means the UI is behind; it only wants the latest
                    let _ = field_tx.push(FieldView::capture(geometry, assignments));
                },
            );
        let scheduler = ControlLoopScheduler::new(engine);
        scheduler.start().wrap_err("failed to start control loop")?;
        let mut sim = Simulation::spawn(scheduler.input_port())?;

        let mut terminal = ratatui::init();
        let result = UiApp::new(&scheduler, self.config, delta_rx, field_rx, note_tx)
            .run(&mut terminal);
        ratatui::restore();

        sim.stop();
        scheduler.stop();
        report(&scheduler.diagnostics());
        result
    }
}

fn report(snapshot: &DiagnosticsSnapshot) {
    info!(
        hz = snapshot.measured_hz,
        source = snapshot.last_source.map_or("none", |s| s.name()),
        live = snapshot.live_voices,
        steals = snapshot.steal_count,
        overruns = snapshot.overrun_ticks,
        geometry = snapshot.geometry.map_or("none", |g| g.name()),
        "diagnostics"
    );
}
