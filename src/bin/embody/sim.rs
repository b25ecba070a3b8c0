//! Synthetic adapters standing in for camera, touch and sensor drivers.
//!
//! Each adapter runs on its own thread at its own rate and pushes
//! normalized observations through a cloned input port. The script repeats
//! every [`CYCLE`]:
//!
//! - 0-4 s: hand 0 pinches on and off, far from the face
//! - 4-7 s: a touch contact drags across the surface
//! - 7-12 s: both hands alternate spread and swipe, then a fist
//!
//! Bio coherence sweeps 0..1..0 over [`BIO_SWEEP`], walking the spatial
//! field through grid, circle and sphere.

use std::{
    f32::consts::TAU,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use color_eyre::eyre::{Result as EyreResult, WrapErr};
use tracing::{debug, warn};

use embody::{GestureObservation, GestureSymbol, InputPort, NormalizedInputEvent};

const CYCLE: f32 = 12.0;
const BIO_SWEEP: f32 = 40.0;
const FACE_ANCHOR: [f32; 2] = [0.5, 0.25];

/// Running adapter threads; stopped and joined on drop
pub struct Simulation {
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl Simulation {
    pub fn spawn(port: InputPort) -> EyreResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let epoch = Instant::now();
        let mut sim = Self {
            stop,
            threads: Vec::new(),
        };

        sim.adapter("touch", 120.0, port.clone(), epoch, touch)?;
        sim.adapter("gesture", 30.0, port.clone(), epoch, gesture)?;
        sim.adapter("face", 30.0, port.clone(), epoch, face)?;
        sim.adapter("bio", 4.0, port, epoch, bio)?;
        Ok(sim)
    }

    fn adapter(
        &mut self,
        name: &'static str,
        rate_hz: f32,
        port: InputPort,
        epoch: Instant,
        sample: fn(f32, Instant, &mut Vec<NormalizedInputEvent>),
    ) -> EyreResult<()> {
        let stop = Arc::clone(&self.stop);
        let period = Duration::from_secs_f32(1.0 / rate_hz);
        let handle = thread::Builder::new()
            .name(format!("sim-{name}"))
            .spawn(move || {
                let mut events = Vec::with_capacity(2);
                while !stop.load(Ordering::Relaxed) {
                    let now = Instant::now();
                    let t = now.duration_since(epoch).as_secs_f32();
                    sample(t, now, &mut events);
                    for event in events.drain(..) {
                        port.ingest(event);
                    }
                    thread::sleep(period);
                }
                debug!(adapter = name, "adapter stopped");
            })
            .wrap_err_with(|| format!("failed to spawn {name} adapter"))?;
        self.threads.push(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("adapter thread panicked");
            }
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.stop();
    }
}

fn phase(t: f32) -> f32 {
    t % CYCLE
}

fn touch(t: f32, now: Instant, out: &mut Vec<NormalizedInputEvent>) {
    let p = phase(t);
    if (4.0..7.0).contains(&p) {
        let u = (p - 4.0) / 3.0;
        let y = 0.5 + 0.4 * (u * TAU).sin();
        out.push(NormalizedInputEvent::touch(now, u, y, 0.3 + 0.5 * u));
    }
}

fn gesture(t: f32, now: Instant, out: &mut Vec<NormalizedInputEvent>) {
    let p = phase(t);
    let far = [0.3, 0.8];
    let observe = |hand: u8, symbol: GestureSymbol, magnitude: f32| {
        NormalizedInputEvent::gesture(
            now,
            GestureObservation::new(hand, symbol, magnitude, 0.9),
            far,
        )
    };

    if p < 4.0 {
        // 600 ms pinches every second, magnitude walks up the scale
        let symbol = if p.fract() < 0.6 {
            GestureSymbol::Pinch
        } else {
            GestureSymbol::None
        };
        out.push(observe(0, symbol, p.floor() / 4.0 + 0.1));
    } else if (7.0..12.0).contains(&p) {
        let (hand, symbol) = match ((p - 7.0) * 2.0) as u32 {
            0 | 2 | 4 => (0, GestureSymbol::Spread),
            1 | 3 | 5 => (1, GestureSymbol::Swipe),
            6 | 7 => (0, GestureSymbol::Pinch),
            _ => (0, GestureSymbol::Fist),
        };
        out.push(observe(hand, symbol, 0.5 + 0.4 * (p * 1.3).sin()));
    }
}

fn face(t: f32, now: Instant, out: &mut Vec<NormalizedInputEvent>) {
    let intensity = 0.5 + 0.5 * (t * 0.7).sin();
    out.push(NormalizedInputEvent::face(now, FACE_ANCHOR, intensity, 0.95));
}

fn bio(t: f32, now: Instant, out: &mut Vec<NormalizedInputEvent>) {
    let u = (t % BIO_SWEEP) / BIO_SWEEP;
    let coherence = 1.0 - (2.0 * u - 1.0).abs();
    out.push(NormalizedInputEvent::bio(now, coherence));
}
