//! Engine configuration and construction-time validation.
//!
//! Every constructor that accepts configuration calls [`EngineConfig::validate`]
//! (or the relevant sub-validator) first. Invalid values are rejected with a
//! descriptive [`ConfigError`], never clamped.

use std::time::Duration;

use thiserror::Error;

use crate::MAX_VOICES;

/// Errors raised when a configuration is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("tick rate must be a finite value > 0 Hz, got {0}")]
    TickRate(f64),

    #[error("tick rate {0} Hz has no representable non-zero tick period")]
    TickPeriod(f64),

    #[error("max voices must be in 1..={max}, got {requested}")]
    VoiceCount { requested: usize, max: usize },

    #[error("staleness window must be > 0, got {0:?}")]
    Staleness(Duration),

    #[error("gesture confidence threshold must be in [0, 1], got {0}")]
    ConfidenceThreshold(f32),

    #[error("gesture proximity threshold must be finite and >= 0, got {0}")]
    ProximityThreshold(f32),

    #[error("coherence boundaries inverted: low {low} must be below high {high}")]
    InvertedCoherence { low: f32, high: f32 },

    #[error("geometry debounce must be at least 1 tick, got {0}")]
    Debounce(u32),

    #[error("grid must have rows, cols >= 1 and spacing > 0, got {rows}x{cols} spacing {spacing}")]
    Grid { rows: usize, cols: usize, spacing: f32 },

    #[error("{name} radius must be finite and > 0, got {value}")]
    Radius { name: &'static str, value: f32 },

    #[error("router note span {base}+{range} exceeds the MIDI note range")]
    NoteRange { base: u8, range: u8 },
}

/// Gesture intent thresholds
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureConfig {
    /// Minimum observation confidence
    pub confidence_threshold: f32,
    /// How long one symbol must be continuously observed
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub hold_time: Duration,
    /// Hands closer than this to a present face anchor are rejected
    pub proximity_threshold: f32,
    /// After a gesture ends, a different symbol is rejected for this long
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub cooldown: Duration,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            hold_time: Duration::from_millis(100),
            proximity_threshold: 0.2,
            cooldown: Duration::from_millis(150),
        }
    }
}

impl GestureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ConfidenceThreshold(self.confidence_threshold));
        }
        if !self.proximity_threshold.is_finite() || self.proximity_threshold < 0.0 {
            return Err(ConfigError::ProximityThreshold(self.proximity_threshold));
        }
        Ok(())
    }
}

/// Coherence boundaries and per-kind geometry parameters
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldConfig {
    /// Below this coherence the field is a grid
    pub low_coherence: f32,
    /// At or above this coherence the field is a Fibonacci sphere
    pub high_coherence: f32,
    /// Consecutive ticks a new kind must hold before it is adopted
    pub debounce_ticks: u32,
    pub grid_rows: usize,
    pub grid_cols: usize,
    pub grid_spacing: f32,
    pub circle_radius: f32,
    pub sphere_radius: f32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            low_coherence: 40.0,
            high_coherence: 60.0,
            debounce_ticks: 2,
            grid_rows: 3,
            grid_cols: 3,
            grid_spacing: 0.5,
            circle_radius: 1.5,
            sphere_radius: 1.0,
        }
    }
}

impl FieldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // NaN fails this comparison too
        if !(self.low_coherence < self.high_coherence) {
            return Err(ConfigError::InvertedCoherence {
                low: self.low_coherence,
                high: self.high_coherence,
            });
        }
        if self.debounce_ticks == 0 {
            return Err(ConfigError::Debounce(self.debounce_ticks));
        }
        if self.grid_rows == 0
            || self.grid_cols == 0
            || !self.grid_spacing.is_finite()
            || self.grid_spacing <= 0.0
        {
            return Err(ConfigError::Grid {
                rows: self.grid_rows,
                cols: self.grid_cols,
                spacing: self.grid_spacing,
            });
        }
        for (name, value) in [
            ("circle", self.circle_radius),
            ("sphere", self.sphere_radius),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Radius { name, value });
            }
        }
        Ok(())
    }
}

/// How qualified gestures translate into notes
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterConfig {
    /// Note played by a pinch of zero magnitude
    pub base_note: u8,
    /// Semitones spanned by pinch magnitude 0..1
    pub note_range: u8,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_note: 60,
            note_range: 24,
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_note as u16 + self.note_range as u16 > 127 {
            return Err(ConfigError::NoteRange {
                base: self.base_note,
                range: self.note_range,
            });
        }
        Ok(())
    }
}

/// Complete engine configuration.
///
/// Set at construction; may be replaced at runtime through
/// [`ControlLoopScheduler::reconfigure`](crate::engine::scheduler::ControlLoopScheduler::reconfigure),
/// which validates before applying.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub tick_rate_hz: f64,
    pub max_voices: usize,
    /// Maximum age of a cached observation before it counts as absent
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub staleness: Duration,
    pub gesture: GestureConfig,
    pub field: FieldConfig,
    pub router: RouterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60.0,
            max_voices: MAX_VOICES,
            staleness: Duration::from_millis(250),
            gesture: GestureConfig::default(),
            field: FieldConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_tick_rate(mut self, hz: f64) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    pub fn with_max_voices(mut self, voices: usize) -> Self {
        self.max_voices = voices;
        self
    }

    pub fn with_staleness(mut self, window: Duration) -> Self {
        self.staleness = window;
        self
    }

    pub fn with_gesture(mut self, gesture: GestureConfig) -> Self {
        self.gesture = gesture;
        self
    }

    pub fn with_field(mut self, field: FieldConfig) -> Self {
        self.field = field;
        self
    }

    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    /// Nominal tick period
    ///
    /// Only meaningful for a validated config; an unrepresentable period
    /// saturates to [`Duration::MAX`].
    pub fn tick_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.tick_rate_hz).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tick_rate_hz.is_finite() || self.tick_rate_hz <= 0.0 {
            return Err(ConfigError::TickRate(self.tick_rate_hz));
        }
        match Duration::try_from_secs_f64(1.0 / self.tick_rate_hz) {
            Ok(period) if !period.is_zero() => {}
            _ => return Err(ConfigError::TickPeriod(self.tick_rate_hz)),
        }
        validate_voice_count(self.max_voices)?;
        if self.staleness.is_zero() {
            return Err(ConfigError::Staleness(self.staleness));
        }
        self.gesture.validate()?;
        self.field.validate()?;
        self.router.validate()
    }
}

pub(crate) fn validate_voice_count(voices: usize) -> Result<(), ConfigError> {
    if voices == 0 || voices > MAX_VOICES {
        return Err(ConfigError::VoiceCount {
            requested: voices,
            max: MAX_VOICES,
        });
    }
    Ok(())
}

#[cfg(feature = "serde")]
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_voices, 15);
        assert_eq!(config.staleness, Duration::from_millis(250));
        assert!((config.tick_period().as_secs_f64() - 1.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        for rate in [0.0, -60.0, f64::NAN, f64::INFINITY] {
            let err = EngineConfig::default().with_tick_rate(rate).validate();
            assert!(matches!(err, Err(ConfigError::TickRate(_))), "rate {rate}");
        }
    }

    #[test]
    fn test_rejects_rates_without_a_usable_period() {
        for rate in [1e12, 1e-30] {
            let config = EngineConfig::default().with_tick_rate(rate);
            assert_eq!(config.validate(), Err(ConfigError::TickPeriod(rate)));
        }
        let slow = EngineConfig::default().with_tick_rate(0.5);
        assert!(slow.validate().is_ok());
        assert_eq!(slow.tick_period(), Duration::from_secs(2));
        assert_eq!(
            EngineConfig::default().with_tick_rate(1e-30).tick_period(),
            Duration::MAX
        );
    }

    #[test]
    fn test_rejects_voice_count_out_of_range() {
        let err = EngineConfig::default().with_max_voices(0).validate();
        assert_eq!(
            err,
            Err(ConfigError::VoiceCount {
                requested: 0,
                max: 15
            })
        );
        assert!(EngineConfig::default().with_max_voices(16).validate().is_err());
        assert!(EngineConfig::default().with_max_voices(1).validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_coherence_boundaries() {
        let field = FieldConfig {
            low_coherence: 60.0,
            high_coherence: 40.0,
            ..FieldConfig::default()
        };
        let err = EngineConfig::default().with_field(field).validate();
        assert!(matches!(err, Err(ConfigError::InvertedCoherence { .. })));

        let equal = FieldConfig {
            low_coherence: 50.0,
            high_coherence: 50.0,
            ..FieldConfig::default()
        };
        assert!(equal.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_gesture_thresholds() {
        let gesture = GestureConfig {
            confidence_threshold: 1.5,
            ..GestureConfig::default()
        };
        assert_eq!(
            gesture.validate(),
            Err(ConfigError::ConfidenceThreshold(1.5))
        );

        let gesture = GestureConfig {
            proximity_threshold: -0.1,
            ..GestureConfig::default()
        };
        assert!(gesture.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_staleness_and_debounce() {
        let err = EngineConfig::default()
            .with_staleness(Duration::ZERO)
            .validate();
        assert!(matches!(err, Err(ConfigError::Staleness(_))));

        let field = FieldConfig {
            debounce_ticks: 0,
            ..FieldConfig::default()
        };
        assert_eq!(field.validate(), Err(ConfigError::Debounce(0)));
    }

    #[test]
    fn test_error_messages_name_the_offending_value() {
        let msg = ConfigError::TickRate(-1.0).to_string();
        assert!(msg.contains("-1"));
        let msg = ConfigError::NoteRange {
            base: 120,
            range: 24,
        }
        .to_string();
        assert!(msg.contains("120+24"));
    }
}
