//! Read-only diagnostics surface.
//!
//! The tick thread publishes once per tick into lock-free atomics; any
//! thread may take a [`DiagnosticsSnapshot`] at any time. Individual fields
//! are consistent, the snapshot as a whole may straddle two ticks.

use std::{
    sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering},
    time::Instant,
};

use crate::{input::event::InputSource, spatial::geometry::GeometryClass};

const NO_VALUE: u8 = u8::MAX;

/// Intervals averaged by the tick meter
const METER_WINDOW: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DiagnosticsSnapshot {
    /// Ticks per second averaged over the last second of ticks
    pub measured_hz: f64,
    pub target_hz: f64,
    pub last_source: Option<InputSource>,
    pub live_voices: usize,
    pub max_voices: usize,
    pub steal_count: u64,
    pub stale_skip_count: u64,
    /// Deltas a sink refused (for example a full ring buffer)
    pub dropped_deltas: u64,
    /// Tick periods skipped because a tick ran late
    pub overrun_ticks: u64,
    pub tick_count: u64,
    pub geometry: Option<GeometryClass>,
}

impl DiagnosticsSnapshot {
    /// Live voices as a fraction of capacity
    pub fn voice_utilization(&self) -> f32 {
        if self.max_voices == 0 {
            return 0.0;
        }
        self.live_voices as f32 / self.max_voices as f32
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    measured_hz: AtomicU64,
    target_hz: AtomicU64,
    last_source: AtomicU8,
    live_voices: AtomicUsize,
    max_voices: AtomicUsize,
    steal_count: AtomicU64,
    stale_skip_count: AtomicU64,
    dropped_deltas: AtomicU64,
    overrun_ticks: AtomicU64,
    tick_count: AtomicU64,
    geometry: AtomicU8,
}

impl Diagnostics {
    pub fn new() -> Self {
        let diagnostics = Self::default();
        diagnostics.last_source.store(NO_VALUE, Ordering::Relaxed);
        diagnostics.geometry.store(NO_VALUE, Ordering::Relaxed);
        diagnostics
    }

    pub fn publish(&self, snapshot: &DiagnosticsSnapshot) {
        let o = Ordering::Relaxed;
        self.measured_hz.store(snapshot.measured_hz.to_bits(), o);
        self.target_hz.store(snapshot.target_hz.to_bits(), o);
        self.last_source.store(
            snapshot.last_source.map_or(NO_VALUE, |s| s.index() as u8),
            o,
        );
        self.live_voices.store(snapshot.live_voices, o);
        self.max_voices.store(snapshot.max_voices, o);
        self.steal_count.store(snapshot.steal_count, o);
        self.stale_skip_count.store(snapshot.stale_skip_count, o);
        self.dropped_deltas.store(snapshot.dropped_deltas, o);
        self.overrun_ticks.store(snapshot.overrun_ticks, o);
        self.geometry
            .store(snapshot.geometry.map_or(NO_VALUE, geometry_code), o);
        // Written last so a reader seeing tick n sees at least tick n's fields
        self.tick_count.store(snapshot.tick_count, Ordering::Release);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let tick_count = self.tick_count.load(Ordering::Acquire);
        let o = Ordering::Relaxed;
        DiagnosticsSnapshot {
            measured_hz: f64::from_bits(self.measured_hz.load(o)),
            target_hz: f64::from_bits(self.target_hz.load(o)),
            last_source: InputSource::from_index(self.last_source.load(o) as usize),
            live_voices: self.live_voices.load(o),
            max_voices: self.max_voices.load(o),
            steal_count: self.steal_count.load(o),
            stale_skip_count: self.stale_skip_count.load(o),
            dropped_deltas: self.dropped_deltas.load(o),
            overrun_ticks: self.overrun_ticks.load(o),
            tick_count,
            geometry: geometry_from_code(self.geometry.load(o)),
        }
    }
}

fn geometry_code(class: GeometryClass) -> u8 {
    match class {
        GeometryClass::Grid => 0,
        GeometryClass::Circle => 1,
        GeometryClass::FibonacciSphere => 2,
    }
}

fn geometry_from_code(code: u8) -> Option<GeometryClass> {
    match code {
        0 => Some(GeometryClass::Grid),
        1 => Some(GeometryClass::Circle),
        2 => Some(GeometryClass::FibonacciSphere),
        _ => None,
    }
}

/// Measures tick frequency over a sliding window of intervals.
///
/// Fixed-size storage, no allocation after construction.
#[derive(Debug, Clone)]
pub struct TickMeter {
    last: Option<Instant>,
    intervals: [f64; METER_WINDOW],
    next: usize,
    filled: usize,
    sum: f64,
}

impl TickMeter {
    pub fn new() -> Self {
        Self {
            last: None,
            intervals: [0.0; METER_WINDOW],
            next: 0,
            filled: 0,
            sum: 0.0,
        }
    }

    pub fn record(&mut self, now: Instant) {
        if let Some(last) = self.last {
            let dt = now.saturating_duration_since(last).as_secs_f64();
            self.sum += dt - self.intervals[self.next];
            self.intervals[self.next] = dt;
            self.next = (self.next + 1) % METER_WINDOW;
            self.filled = (self.filled + 1).min(METER_WINDOW);
        }
        self.last = Some(now);
    }

    /// Average ticks per second; zero until two ticks have been recorded.
    pub fn hz(&self) -> f64 {
        if self.filled == 0 || self.sum <= 0.0 {
            return 0.0;
        }
        self.filled as f64 / self.sum
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for TickMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_meter_measures_steady_rate() {
        let mut meter = TickMeter::new();
        let t0 = Instant::now();
        assert_eq!(meter.hz(), 0.0);
        for i in 0..200u32 {
            meter.record(t0 + Duration::from_micros(16_667) * i);
        }
        assert!((meter.hz() - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_meter_tracks_rate_change() {
        let mut meter = TickMeter::new();
        let t0 = Instant::now();
        for i in 0..100u32 {
            meter.record(t0 + Duration::from_millis(10) * i);
        }
        let t1 = t0 + Duration::from_millis(990);
        for i in 1..=100u32 {
            meter.record(t1 + Duration::from_millis(20) * i);
        }
        assert!((meter.hz() - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_snapshot_roundtrips_through_atomics() {
        let diagnostics = Diagnostics::new();
        assert_eq!(diagnostics.snapshot().last_source, None);
        assert_eq!(diagnostics.snapshot().geometry, None);

        let snapshot = DiagnosticsSnapshot {
            measured_hz: 59.8,
            target_hz: 60.0,
            last_source: Some(InputSource::Gesture),
            live_voices: 3,
            max_voices: 15,
            steal_count: 2,
            stale_skip_count: 7,
            dropped_deltas: 0,
            overrun_ticks: 1,
            tick_count: 42,
            geometry: Some(GeometryClass::Circle),
        };
        diagnostics.publish(&snapshot);
        assert_eq!(diagnostics.snapshot(), snapshot);
        assert!((snapshot.voice_utilization() - 0.2).abs() < 1e-6);
    }
}
