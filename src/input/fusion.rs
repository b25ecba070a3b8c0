//! Input fusion with priority arbitration.
//!
//! Producers write through cloned [`InputPort`]s. Each source has its own
//! independently locked slot, so producers for different sources never
//! contend with each other, and a write only holds its slot for one copy.
//! The tick thread owns the [`InputFusionCore`] and calls
//! [`InputFusionCore::resolve`] once per tick.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{
    engine::config::{ConfigError, EngineConfig, GestureConfig},
    input::{
        event::{InputSource, NormalizedInputEvent, Payload, HAND_LANES, PRIORITY_TABLE},
        gesture::GestureQualifier,
    },
};

type Lanes = [Option<NormalizedInputEvent>; HAND_LANES];

/// Why a decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    /// Winner is the highest-priority fresh, qualified source
    Fresh,
    /// Observations are cached but all are older than the staleness window
    AllStale,
    /// The only fresh observations were gestures that did not qualify
    GestureRejected,
    /// Nothing has been ingested yet
    Empty,
    /// Input has been closed by `stop()`
    Closed,
}

/// Result of one arbitration pass: exactly one winner, or an explicit none.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveInputDecision {
    winner: Option<(NormalizedInputEvent, usize)>,
    reason: DecisionReason,
    timestamp: Instant,
}

impl ActiveInputDecision {
    pub fn none(reason: DecisionReason, timestamp: Instant) -> Self {
        Self {
            winner: None,
            reason,
            timestamp,
        }
    }

    fn winner(event: NormalizedInputEvent, lane: usize, timestamp: Instant) -> Self {
        Self {
            winner: Some((event, lane)),
            reason: DecisionReason::Fresh,
            timestamp,
        }
    }

    pub fn source(&self) -> Option<InputSource> {
        self.winner.map(|(event, _)| event.source)
    }

    /// The winning observation
    pub fn event(&self) -> Option<&NormalizedInputEvent> {
        self.winner.as_ref().map(|(event, _)| event)
    }

    /// Cache lane the winner came from (hand lane for gestures)
    pub fn lane(&self) -> Option<usize> {
        self.winner.map(|(_, lane)| lane)
    }

    pub fn reason(&self) -> DecisionReason {
        self.reason
    }

    /// Tick time the decision was made at
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn is_none(&self) -> bool {
        self.winner.is_none()
    }
}

struct SlotBank {
    slots: [Mutex<Lanes>; InputSource::COUNT],
    closed: AtomicBool,
}

impl SlotBank {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new([None; HAND_LANES])),
            closed: AtomicBool::new(false),
        }
    }

    fn write(&self, event: NormalizedInputEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let lane = event.lane();
        self.slots[event.source.index()].lock()[lane] = Some(event);
    }

    fn read(&self, source: InputSource) -> Lanes {
        *self.slots[source.index()].lock()
    }

    fn clear(&self) {
        for slot in &self.slots {
            *slot.lock() = [None; HAND_LANES];
        }
    }
}

/// Cloneable producer handle given to input adapters.
///
/// `ingest` is O(1) and never blocks on another source. After the engine is
/// stopped it silently does nothing.
#[derive(Clone)]
pub struct InputPort {
    bank: Arc<SlotBank>,
}

impl InputPort {
    /// Overwrite the cache slot for the event's source (and lane).
    #[inline]
    pub fn ingest(&self, event: NormalizedInputEvent) {
        self.bank.write(event);
    }

    pub fn is_closed(&self) -> bool {
        self.bank.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.bank.closed.store(true, Ordering::Release);
    }

    pub(crate) fn reopen(&self) {
        self.bank.closed.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for InputPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputPort")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Latest-observation cache plus per-tick arbitration
pub struct InputFusionCore {
    bank: Arc<SlotBank>,
    qualifiers: [GestureQualifier; HAND_LANES],
    staleness: Duration,
    stale_skips: u64,
}

impl InputFusionCore {
    pub fn new(staleness: Duration, gesture: GestureConfig) -> Result<Self, ConfigError> {
        if staleness.is_zero() {
            return Err(ConfigError::Staleness(staleness));
        }
        let qualifier = GestureQualifier::new(gesture)?;
        Ok(Self {
            bank: Arc::new(SlotBank::new()),
            qualifiers: std::array::from_fn(|_| qualifier.clone()),
            staleness,
            stale_skips: 0,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Self::new(config.staleness, config.gesture)
    }

    /// Producer handle sharing this core's cache
    pub fn port(&self) -> InputPort {
        InputPort {
            bank: Arc::clone(&self.bank),
        }
    }

    #[inline]
    pub fn ingest(&self, event: NormalizedInputEvent) {
        self.bank.write(event);
    }

    pub fn resolve(&mut self) -> ActiveInputDecision {
        self.resolve_at(Instant::now())
    }

    /// Pick the single active source as of `now`.
    ///
    /// Walks [`PRIORITY_TABLE`] and returns the first source holding a fresh
    /// observation (gestures must also qualify). Within a source the most
    /// recent lane wins. Gesture lanes are qualified on every call, winner
    /// or not, so hold and cooldown tracking never skips a tick.
    pub fn resolve_at(&mut self, now: Instant) -> ActiveInputDecision {
        if self.is_closed() {
            return ActiveInputDecision::none(DecisionReason::Closed, now);
        }

        let cached: [Lanes; InputSource::COUNT] =
            std::array::from_fn(|index| match InputSource::from_index(index) {
                Some(source) => self.bank.read(source),
                None => [None; HAND_LANES],
            });

        let face_anchor = self.face_anchor(&cached[InputSource::Face.index()], now);
        let qualified = self.qualify_gestures(&cached[InputSource::Gesture.index()], face_anchor, now);

        let mut any_cached = false;
        let mut rejected = false;
        let mut skipped = 0u64;

        for source in PRIORITY_TABLE {
            let mut best: Option<(NormalizedInputEvent, usize)> = None;
            let mut stale = false;

            for (lane, slot) in cached[source.index()].iter().take(source.lanes()).enumerate() {
                let Some(event) = slot else { continue };
                any_cached = true;
                if !event.is_fresh_at(now, self.staleness) {
                    stale = true;
                    continue;
                }
                if source == InputSource::Gesture && !qualified[lane] {
                    rejected = true;
                    continue;
                }
                if best.map_or(true, |(b, _)| event.timestamp > b.timestamp) {
                    best = Some((*event, lane));
                }
            }

            if let Some((event, lane)) = best {
                self.stale_skips += skipped;
                return ActiveInputDecision::winner(event, lane, now);
            }
            if stale {
                skipped += 1;
            }
        }

        self.stale_skips += skipped;
        let reason = if rejected {
            DecisionReason::GestureRejected
        } else if any_cached {
            DecisionReason::AllStale
        } else {
            DecisionReason::Empty
        };
        ActiveInputDecision::none(reason, now)
    }

    /// Freshest cached observation for `source`, regardless of age
    pub fn latest(&self, source: InputSource) -> Option<NormalizedInputEvent> {
        freshest(&self.bank.read(source))
    }

    /// Freshest observation for `source` that is inside the staleness window
    pub fn fresh(&self, source: InputSource, now: Instant) -> Option<NormalizedInputEvent> {
        self.latest(source)
            .filter(|event| event.is_fresh_at(now, self.staleness))
    }

    /// Count of higher-priority sources passed over because they were stale
    pub fn stale_skips(&self) -> u64 {
        self.stale_skips
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    pub fn qualifier(&self, lane: usize) -> Option<&GestureQualifier> {
        self.qualifiers.get(lane)
    }

    pub fn set_staleness(&mut self, staleness: Duration) -> Result<(), ConfigError> {
        if staleness.is_zero() {
            return Err(ConfigError::Staleness(staleness));
        }
        self.staleness = staleness;
        Ok(())
    }

    pub fn set_gesture_config(&mut self, config: GestureConfig) -> Result<(), ConfigError> {
        config.validate()?;
        for qualifier in &mut self.qualifiers {
            qualifier.set_config(config)?;
        }
        Ok(())
    }

    /// Stop accepting input. Later `ingest` calls are no-ops.
    pub fn close(&self) {
        self.bank.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.bank.closed.load(Ordering::Acquire)
    }

    /// Drop every cached observation and all gesture tracking state.
    pub fn clear(&mut self) {
        self.bank.clear();
        for qualifier in &mut self.qualifiers {
            qualifier.reset();
        }
    }

    fn face_anchor(&self, lanes: &Lanes, now: Instant) -> Option<[f32; 2]> {
        let face = freshest(lanes).filter(|event| event.is_fresh_at(now, self.staleness))?;
        match face.payload {
            Payload::Vector([x, y, _]) => Some([x, y]),
            _ => None,
        }
    }

    fn qualify_gestures(
        &mut self,
        lanes: &Lanes,
        face_anchor: Option<[f32; 2]>,
        now: Instant,
    ) -> [bool; HAND_LANES] {
        let mut qualified = [false; HAND_LANES];
        for (lane, slot) in lanes.iter().enumerate() {
            let qualifier = &mut self.qualifiers[lane];
            match slot {
                Some(event) if event.is_fresh_at(now, self.staleness) => {
                    if let Payload::Gesture {
                        observation,
                        hand_position,
                    } = event.payload
                    {
                        qualified[lane] = qualifier.is_intentional(
                            &observation,
                            hand_position,
                            face_anchor,
                            event.timestamp,
                        );
                    }
                }
                _ => qualifier.observe_absent(now),
            }
        }
        qualified
    }
}

fn freshest(lanes: &Lanes) -> Option<NormalizedInputEvent> {
    lanes
        .iter()
        .flatten()
        .max_by_key(|event| event.timestamp)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::event::{GestureObservation, GestureSymbol};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn core() -> InputFusionCore {
        InputFusionCore::new(ms(250), GestureConfig::default()).unwrap()
    }

    fn pinch(hand: u8) -> GestureObservation {
        GestureObservation::new(hand, GestureSymbol::Pinch, 0.5, 0.9)
    }

    #[test]
    fn test_empty_core_resolves_to_none() {
        let mut core = core();
        let decision = core.resolve_at(Instant::now());
        assert!(decision.is_none());
        assert_eq!(decision.reason(), DecisionReason::Empty);
    }

    #[test]
    fn test_touch_wins_over_every_fresh_source() {
        let mut core = core();
        let t = Instant::now();
        core.ingest(NormalizedInputEvent::bio(t, 0.5));
        core.ingest(NormalizedInputEvent::vector(InputSource::Gaze, t, [0.1, 0.2, 0.0]));
        core.ingest(NormalizedInputEvent::face(t, [0.5, 0.5], 0.2, 0.9));
        core.ingest(NormalizedInputEvent::touch(t, 0.3, 0.3, 0.7));
        let decision = core.resolve_at(t + ms(10));
        assert_eq!(decision.source(), Some(InputSource::Touch));
        assert_eq!(decision.reason(), DecisionReason::Fresh);
    }

    #[test]
    fn test_stale_touch_yields_to_lower_priority() {
        let mut core = core();
        let t = Instant::now();
        core.ingest(NormalizedInputEvent::touch(t, 0.3, 0.3, 0.7));
        core.ingest(NormalizedInputEvent::bio(t + ms(200), 0.5));
        let decision = core.resolve_at(t + ms(300));
        assert_eq!(decision.source(), Some(InputSource::Bio));
        assert_eq!(core.stale_skips(), 1);
    }

    #[test]
    fn test_all_stale_is_none_not_error() {
        let mut core = core();
        let t = Instant::now();
        core.ingest(NormalizedInputEvent::touch(t, 0.3, 0.3, 0.7));
        let decision = core.resolve_at(t + ms(250));
        assert!(decision.is_none());
        assert_eq!(decision.reason(), DecisionReason::AllStale);
    }

    #[test]
    fn test_gesture_requires_qualification() {
        let mut core = core();
        let t = Instant::now();
        core.ingest(NormalizedInputEvent::gesture(t, pinch(0), [0.9, 0.9]));
        let first = core.resolve_at(t);
        assert_eq!(first.reason(), DecisionReason::GestureRejected);

        core.ingest(NormalizedInputEvent::gesture(t + ms(200), pinch(0), [0.9, 0.9]));
        let decision = core.resolve_at(t + ms(200));
        assert_eq!(decision.source(), Some(InputSource::Gesture));
        assert_eq!(decision.lane(), Some(0));
    }

    #[test]
    fn test_unqualified_gesture_falls_through_to_face() {
        let mut core = core();
        let t = Instant::now();
        core.ingest(NormalizedInputEvent::face(t, [0.5, 0.3], 0.4, 0.9));
        core.ingest(NormalizedInputEvent::gesture(t, pinch(0), [0.5, 0.35]));
        core.resolve_at(t);
        core.ingest(NormalizedInputEvent::face(t + ms(200), [0.5, 0.3], 0.4, 0.9));
        core.ingest(NormalizedInputEvent::gesture(t + ms(200), pinch(0), [0.5, 0.35]));
        // Pinch is held long enough but sits right next to the face anchor
        let decision = core.resolve_at(t + ms(200));
        assert_eq!(decision.source(), Some(InputSource::Face));
    }

    #[test]
    fn test_most_recent_lane_wins_within_source() {
        let mut core = core();
        let t = Instant::now();
        for hand in [0, 1] {
            core.ingest(NormalizedInputEvent::gesture(t, pinch(hand), [0.9, 0.9]));
        }
        core.resolve_at(t);
        core.ingest(NormalizedInputEvent::gesture(t + ms(150), pinch(0), [0.9, 0.9]));
        core.ingest(NormalizedInputEvent::gesture(t + ms(160), pinch(1), [0.1, 0.9]));
        let decision = core.resolve_at(t + ms(170));
        assert_eq!(decision.lane(), Some(1));
    }

    #[test]
    fn test_ingest_after_close_is_noop() {
        let mut core = core();
        let port = core.port();
        let t = Instant::now();
        core.close();
        port.ingest(NormalizedInputEvent::touch(t, 0.1, 0.1, 0.1));
        assert!(port.is_closed());
        assert!(core.latest(InputSource::Touch).is_none());
        assert_eq!(core.resolve_at(t).reason(), DecisionReason::Closed);
    }

    #[test]
    fn test_concurrent_producers() {
        let core = core();
        let handles: Vec<_> = [InputSource::Touch, InputSource::Gaze, InputSource::Bio]
            .into_iter()
            .map(|source| {
                let port = core.port();
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        let v = i as f32 / 1000.0;
                        port.ingest(NormalizedInputEvent::vector(source, Instant::now(), [v, v, v]));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for source in [InputSource::Touch, InputSource::Gaze, InputSource::Bio] {
            let latest = core.latest(source).unwrap();
            assert_eq!(latest.payload, Payload::Vector([0.999; 3]));
        }
    }

    #[test]
    fn test_fresh_filters_by_window() {
        let core = core();
        let t = Instant::now();
        core.ingest(NormalizedInputEvent::bio(t, 0.7));
        assert!(core.fresh(InputSource::Bio, t + ms(100)).is_some());
        assert!(core.fresh(InputSource::Bio, t + ms(300)).is_none());
        assert!(core.latest(InputSource::Bio).is_some());
    }
}
