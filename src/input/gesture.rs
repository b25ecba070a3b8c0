//! Gesture intent qualification.
//!
//! A raw observation only counts as an intentional gesture when all of the
//! following hold:
//! - confidence is at or above the configured threshold
//! - the same symbol has been observed continuously for at least `hold_time`
//! - the hand is not within `proximity_threshold` of a present face anchor
//! - no *different* gesture ended less than `cooldown` ago
//!
//! Hold timing is measured on observation timestamps, so the result is the
//! same no matter how often the tick re-evaluates a cached observation.

use std::time::{Duration, Instant};

use crate::{
    engine::config::{ConfigError, GestureConfig},
    input::event::{GestureObservation, GestureSymbol},
};

/// Per-hand qualification state
#[derive(Debug, Clone)]
pub struct GestureQualifier {
    config: GestureConfig,
    /// Start time of the symbol currently held, indexed by symbol
    started: [Option<Instant>; GestureSymbol::COUNT],
    current: GestureSymbol,
    hand: Option<u8>,
    /// Most recent gesture end: (symbol, end time)
    ended: Option<(GestureSymbol, Instant)>,
}

impl GestureQualifier {
    pub fn new(config: GestureConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            started: [None; GestureSymbol::COUNT],
            current: GestureSymbol::None,
            hand: None,
            ended: None,
        })
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Replace thresholds without losing tracking state.
    pub fn set_config(&mut self, config: GestureConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Decide whether `observation`, captured at `at`, is intentional.
    ///
    /// Also advances hold/cooldown tracking, so it must be fed every
    /// observation of this hand in timestamp order (repeats are harmless).
    pub fn is_intentional(
        &mut self,
        observation: &GestureObservation,
        hand_position: [f32; 2],
        face_anchor: Option<[f32; 2]>,
        at: Instant,
    ) -> bool {
        self.track(observation.symbol, observation.hand, at);

        let symbol = observation.symbol;
        if symbol.is_none() {
            return false;
        }
        if observation.confidence < self.config.confidence_threshold {
            return false;
        }
        if self.held_for(symbol, at) < self.config.hold_time {
            return false;
        }
        if let Some(face) = face_anchor {
            if distance(hand_position, face) < self.config.proximity_threshold {
                return false;
            }
        }
        if self.in_cooldown(symbol, at) {
            return false;
        }
        true
    }

    /// The hand disappeared (or its observation went stale).
    pub fn observe_absent(&mut self, at: Instant) {
        self.end_current(at);
        self.hand = None;
    }

    /// Forget all tracking state, including any running cooldown.
    pub fn reset(&mut self) {
        self.started = [None; GestureSymbol::COUNT];
        self.current = GestureSymbol::None;
        self.hand = None;
        self.ended = None;
    }

    /// Symbol currently being held, if any
    pub fn current(&self) -> Option<GestureSymbol> {
        (!self.current.is_none()).then_some(self.current)
    }

    /// How long `symbol` has been held as of `at`; zero if not held.
    pub fn held_for(&self, symbol: GestureSymbol, at: Instant) -> Duration {
        self.started[symbol.index()]
            .map(|start| at.saturating_duration_since(start))
            .unwrap_or(Duration::ZERO)
    }

    fn track(&mut self, symbol: GestureSymbol, hand: u8, at: Instant) {
        let hand_changed = self.hand.is_some_and(|h| h != hand);
        if symbol != self.current || hand_changed {
            self.end_current(at);
            if !symbol.is_none() {
                self.started[symbol.index()] = Some(at);
            }
            self.current = symbol;
        }
        self.hand = Some(hand);
    }

    fn end_current(&mut self, at: Instant) {
        if !self.current.is_none() {
            self.started[self.current.index()] = None;
            self.ended = Some((self.current, at));
        }
        self.current = GestureSymbol::None;
    }

    fn in_cooldown(&self, symbol: GestureSymbol, at: Instant) -> bool {
        match self.ended {
            Some((ended, ended_at)) if ended != symbol => {
                at.saturating_duration_since(ended_at) < self.config.cooldown
            }
            _ => false,
        }
    }
}

#[inline]
fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}
