//! Fixed-rate control loop.
//!
//! One dedicated thread runs [`Engine::tick_at`] at the configured rate.
//! Deadlines advance on a fixed grid; when a tick runs past its deadline the
//! missed periods are skipped, never replayed, so overload lowers the
//! measured rate instead of producing bursts.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle, ThreadId},
    time::Instant,
};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, trace, warn};

use super::{
    config::{ConfigError, EngineConfig},
    diagnostics::{Diagnostics, DiagnosticsSnapshot},
    Engine,
};
use crate::input::fusion::InputPort;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("control loop is already running")]
    AlreadyRunning,

    #[error("failed to spawn control loop thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct LoopShared {
    running: AtomicBool,
    /// Engine parked here whenever the loop is not running
    engine: Mutex<Option<Engine>>,
    pending: Mutex<Option<EngineConfig>>,
    tick_thread: Mutex<Option<ThreadId>>,
}

impl LoopShared {
    fn on_tick_thread(&self) -> bool {
        *self.tick_thread.lock() == Some(thread::current().id())
    }
}

/// Owns the engine and drives it from a dedicated tick thread.
///
/// All methods take `&self`, so the scheduler can be shared (for example in
/// an `Arc`) and stopped from any thread, including from inside a sink.
pub struct ControlLoopScheduler {
    shared: Arc<LoopShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    port: InputPort,
    diagnostics: Arc<Diagnostics>,
}

impl ControlLoopScheduler {
    pub fn new(engine: Engine) -> Self {
        let port = engine.input_port();
        let diagnostics = engine.diagnostics();
        Self {
            shared: Arc::new(LoopShared {
                running: AtomicBool::new(false),
                engine: Mutex::new(Some(engine)),
                pending: Mutex::new(None),
                tick_thread: Mutex::new(None),
            }),
            thread: Mutex::new(None),
            port,
            diagnostics,
        }
    }

    /// Build the engine and scheduler from one configuration.
    pub fn from_config(config: EngineConfig) -> Result<Self, ConfigError> {
        Engine::new(config).map(Self::new)
    }

    /// Start ticking. Input is (re)opened for ingestion.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut thread = self.thread.lock();
        if thread.is_some() || self.shared.engine.lock().is_none() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.port.reopen();
        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("embody-tick".into())
            .spawn(move || run(shared));

        match spawned {
            Ok(handle) => {
                *thread = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                self.port.close();
                Err(SchedulerError::Spawn(err))
            }
        }
    }

    /// Stop ticking and close input.
    ///
    /// Waits for an in-flight tick to finish; no tick starts after this
    /// returns. Called from the tick thread itself (from a sink), it only
    /// requests the stop: the current tick is the last one.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.port.close();

        if self.shared.on_tick_thread() {
            return;
        }

        // Held across the join so concurrent callers also wait for it
        let mut thread = self.thread.lock();
        if let Some(handle) = thread.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("control loop thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Validate and schedule a configuration change.
    ///
    /// Rejected configurations leave the running one untouched. Accepted
    /// ones are applied before the next tick, or immediately when stopped.
    pub fn reconfigure(&self, config: EngineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        match self.shared.engine.lock().as_mut() {
            Some(engine) => engine.reconfigure(config),
            None => {
                *self.shared.pending.lock() = Some(config);
                Ok(())
            }
        }
    }

    /// Producer handle for input adapters
    pub fn input_port(&self) -> InputPort {
        self.port.clone()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Run `f` against the engine while the loop is stopped.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> Option<R> {
        self.shared.engine.lock().as_mut().map(f)
    }
}

impl Drop for ControlLoopScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: Arc<LoopShared>) {
    let Some(mut engine) = shared.engine.lock().take() else {
        return;
    };
    *shared.tick_thread.lock() = Some(thread::current().id());

    let mut period = engine.config().tick_period();
    let mut next = Instant::now();
    info!(
        tick_rate_hz = engine.config().tick_rate_hz,
        max_voices = engine.config().max_voices,
        "control loop started"
    );

    while shared.running.load(Ordering::Acquire) {
        if let Some(config) = shared.pending.lock().take() {
            match engine.reconfigure(config) {
                Ok(()) => period = engine.config().tick_period(),
                Err(err) => warn!(%err, "pending configuration rejected"),
            }
        }

        engine.tick_at(Instant::now());

        next += period;
        let finished = Instant::now();
        if finished >= next {
            let behind = finished - next;
            let skipped = (behind.as_nanos() / period.as_nanos().max(1)) as u32 + 1;
            next += period * skipped;
            engine.record_overrun(skipped);
            trace!(skipped, behind_us = behind.as_micros() as u64, "tick overrun");
        }

        while shared.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= next {
                break;
            }
            thread::park_timeout(next - now);
        }
    }

    let ticks = engine.snapshot().tick_count;
    *shared.tick_thread.lock() = None;
    // Engine before pending, same order as `reconfigure`
    let mut slot = shared.engine.lock();
    if let Some(config) = shared.pending.lock().take() {
        if let Err(err) = engine.reconfigure(config) {
            warn!(%err, "pending configuration rejected");
        }
    }
    *slot = Some(engine);
    drop(slot);
    info!(ticks, "control loop stopped");
}
