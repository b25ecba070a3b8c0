//! Applies each tick's input decision to the voice pool.
//!
//! | winner payload  | effect                                                  |
//! |-----------------|---------------------------------------------------------|
//! | vector (x, y, z)| every live voice: bend = 2x − 1, brightness = y, timbre = z |
//! | scalar v        | every live voice: timbre = v                            |
//! | gesture onset   | pinch: note-on; fist: release all; spread: brightness;  |
//! |                 | swipe: bend (left hand down, right hand up); point: none |
//!
//! A change of winner from one source to a different source is a mode
//! transition and releases every voice. A tick with no winner keeps the
//! current voices but ends any gesture in progress, which releases the
//! voice a pinch started.

use tracing::debug;

use crate::{
    engine::config::RouterConfig,
    input::{
        event::{GestureObservation, GestureSymbol, InputSource, Payload, HAND_LANES},
        fusion::ActiveInputDecision,
    },
    voice::{
        allocator::VoiceAllocator,
        voice::{Expression, VoiceHandle},
    },
};

#[derive(Debug, Clone, Copy)]
struct LaneState {
    symbol: GestureSymbol,
    /// Voice started by a pinch on this lane
    voice: Option<VoiceHandle>,
}

impl LaneState {
    const IDLE: LaneState = LaneState {
        symbol: GestureSymbol::None,
        voice: None,
    };
}

pub struct ExpressionRouter {
    config: RouterConfig,
    last_source: Option<InputSource>,
    lanes: [LaneState; HAND_LANES],
    transitions: u64,
}

impl ExpressionRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            last_source: None,
            lanes: [LaneState::IDLE; HAND_LANES],
            transitions: 0,
        }
    }

    pub fn set_config(&mut self, config: RouterConfig) {
        self.config = config;
    }

    /// Last source that won arbitration
    pub fn last_source(&self) -> Option<InputSource> {
        self.last_source
    }

    /// Number of mode transitions so far
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn apply(&mut self, decision: &ActiveInputDecision, voices: &mut VoiceAllocator) {
        let Some(event) = decision.event() else {
            self.end_gestures(None, voices);
            return;
        };

        if let Some(previous) = self.last_source {
            if previous != event.source {
                voices.release_all();
                self.lanes = [LaneState::IDLE; HAND_LANES];
                self.transitions += 1;
                debug!(
                    from = previous.name(),
                    to = event.source.name(),
                    "input mode transition, released all voices"
                );
            }
        }
        self.last_source = Some(event.source);

        match event.payload {
            Payload::Vector([x, y, z]) => {
                self.end_gestures(None, voices);
                voices.set_all(Expression::PitchBend, x * 2.0 - 1.0);
                voices.set_all(Expression::Brightness, y);
                voices.set_all(Expression::Timbre, z);
            }
            Payload::Scalar(value) => {
                self.end_gestures(None, voices);
                voices.set_all(Expression::Timbre, value);
            }
            Payload::Gesture { observation, .. } => {
                let lane = decision.lane().unwrap_or_else(|| observation.lane());
                self.end_gestures(Some(lane), voices);
                self.apply_gesture(lane, &observation, voices);
            }
        }
    }

    fn apply_gesture(
        &mut self,
        lane: usize,
        observation: &GestureObservation,
        voices: &mut VoiceAllocator,
    ) {
        let magnitude = observation.magnitude.clamp(0.0, 1.0);

        if self.lanes[lane].symbol == observation.symbol {
            // Held: continuous symbols keep following magnitude
            match observation.symbol {
                GestureSymbol::Spread => voices.set_all(Expression::Brightness, magnitude),
                GestureSymbol::Swipe => {
                    voices.set_all(Expression::PitchBend, swipe_bend(lane, magnitude))
                }
                _ => {}
            }
            return;
        }

        self.end_lane(lane, voices);
        let state = &mut self.lanes[lane];
        state.symbol = observation.symbol;

        match observation.symbol {
            GestureSymbol::Pinch => {
                let note = self.config.base_note
                    + (magnitude * self.config.note_range as f32).round() as u8;
                let velocity = 1 + (magnitude * 126.0).round() as u8;
                let voice = voices.allocate(note, velocity);
                state.voice = Some(voice.handle());
            }
            GestureSymbol::Fist => {
                voices.release_all();
                for other in &mut self.lanes {
                    other.voice = None;
                }
            }
            GestureSymbol::Spread => voices.set_all(Expression::Brightness, magnitude),
            GestureSymbol::Swipe => voices.set_all(Expression::PitchBend, swipe_bend(lane, magnitude)),
            GestureSymbol::Point | GestureSymbol::None => {}
        }
    }

    /// End gestures on every lane except `keep`.
    fn end_gestures(&mut self, keep: Option<usize>, voices: &mut VoiceAllocator) {
        for lane in 0..HAND_LANES {
            if Some(lane) != keep {
                self.end_lane(lane, voices);
            }
        }
    }

    fn end_lane(&mut self, lane: usize, voices: &mut VoiceAllocator) {
        let state = &mut self.lanes[lane];
        if let Some(handle) = state.voice.take() {
            voices.release(handle);
        }
        state.symbol = GestureSymbol::None;
    }
}

fn swipe_bend(lane: usize, magnitude: f32) -> f32 {
    if lane == 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::config::GestureConfig,
        input::{event::NormalizedInputEvent, fusion::InputFusionCore},
    };
    use std::time::{Duration, Instant};

    struct Rig {
        core: InputFusionCore,
        voices: VoiceAllocator,
        router: ExpressionRouter,
        t0: Instant,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                core: InputFusionCore::new(Duration::from_millis(250), GestureConfig::default())
                    .unwrap(),
                voices: VoiceAllocator::new(15).unwrap(),
                router: ExpressionRouter::new(RouterConfig::default()),
                t0: Instant::now(),
            }
        }

        fn at(&self, ms: u64) -> Instant {
            self.t0 + Duration::from_millis(ms)
        }

        fn gesture(&mut self, ms: u64, hand: u8, symbol: GestureSymbol, magnitude: f32) {
            let obs = GestureObservation::new(hand, symbol, magnitude, 0.9);
            self.core
                .ingest(NormalizedInputEvent::gesture(self.at(ms), obs, [0.9, 0.9]));
            self.tick(ms);
        }

        fn tick(&mut self, ms: u64) {
            let decision = self.core.resolve_at(self.at(ms));
            self.router.apply(&decision, &mut self.voices);
        }
    }

    #[test]
    fn test_pinch_onset_starts_one_note() {
        let mut rig = Rig::new();
        rig.gesture(0, 0, GestureSymbol::Pinch, 0.5);
        assert_eq!(rig.voices.live_count(), 0);
        rig.gesture(120, 0, GestureSymbol::Pinch, 0.5);
        rig.gesture(140, 0, GestureSymbol::Pinch, 0.5);
        assert_eq!(rig.voices.live_count(), 1);
        let voice = rig.voices.voice_on(1).unwrap();
        assert_eq!(voice.note(), 72);
        assert_eq!(voice.velocity(), 64);
    }

    #[test]
    fn test_pinch_release_ends_its_voice() {
        let mut rig = Rig::new();
        rig.gesture(0, 0, GestureSymbol::Pinch, 0.0);
        rig.gesture(120, 0, GestureSymbol::Pinch, 0.0);
        assert_eq!(rig.voices.live_count(), 1);
        // Pinch stops qualifying once it goes stale
        rig.tick(400);
        assert_eq!(rig.voices.live_count(), 0);
    }

    #[test]
    fn test_fist_releases_everything() {
        let mut rig = Rig::new();
        rig.voices.allocate(50, 100);
        rig.voices.allocate(52, 100);
        rig.gesture(0, 0, GestureSymbol::Fist, 1.0);
        rig.gesture(120, 0, GestureSymbol::Fist, 1.0);
        assert_eq!(rig.voices.live_count(), 0);
    }

    #[test]
    fn test_vector_payload_drives_all_voices() {
        let mut rig = Rig::new();
        rig.voices.allocate(60, 100);
        rig.voices.allocate(64, 100);
        let t = rig.at(0);
        rig.core
            .ingest(NormalizedInputEvent::touch(t, 0.75, 0.2, 0.6));
        rig.tick(0);
        for voice in rig.voices.voices() {
            assert!((voice.pitch_bend() - 0.5).abs() < 1e-6);
            assert!((voice.brightness() - 0.2).abs() < 1e-6);
            assert!((voice.timbre() - 0.6).abs() < 1e-6);
        }
    }

    #[test]
    fn test_source_change_is_mode_transition() {
        let mut rig = Rig::new();
        let t = rig.at(0);
        rig.core.ingest(NormalizedInputEvent::bio(t, 0.5));
        rig.tick(0);
        rig.voices.allocate(60, 100);

        rig.core
            .ingest(NormalizedInputEvent::touch(rig.at(10), 0.5, 0.5, 0.5));
        rig.tick(10);
        assert_eq!(rig.voices.live_count(), 0);
        assert_eq!(rig.router.transitions(), 1);
        assert_eq!(rig.router.last_source(), Some(InputSource::Touch));
    }

    #[test]
    fn test_no_decision_keeps_voices() {
        let mut rig = Rig::new();
        rig.core
            .ingest(NormalizedInputEvent::touch(rig.at(0), 0.5, 0.5, 0.5));
        rig.tick(0);
        rig.voices.allocate(60, 100);
        rig.tick(1000);
        assert_eq!(rig.voices.live_count(), 1);
    }
}
