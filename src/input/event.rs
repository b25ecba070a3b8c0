use std::time::{Duration, Instant};

/// Origin of an observation.
///
/// Variants are declared in priority order: `Touch` always outranks
/// `Gesture`, which outranks `Face`, and so on down to `Bio`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputSource {
    Touch,
    Gesture,
    Face,
    Gaze,
    Position,
    Bio,
}

/// Static total order used for arbitration, highest priority first.
pub const PRIORITY_TABLE: [InputSource; InputSource::COUNT] = [
    InputSource::Touch,
    InputSource::Gesture,
    InputSource::Face,
    InputSource::Gaze,
    InputSource::Position,
    InputSource::Bio,
];

/// Independent hands tracked by the gesture source.
pub const HAND_LANES: usize = 2;

impl InputSource {
    pub const COUNT: usize = 6;

    /// Slot index, equal to the source's rank in [`PRIORITY_TABLE`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// True if `self` wins arbitration against `other`.
    #[inline]
    pub fn outranks(self, other: InputSource) -> bool {
        self.index() < other.index()
    }

    /// Number of cache lanes kept for this source
    pub fn lanes(self) -> usize {
        match self {
            InputSource::Gesture => HAND_LANES,
            _ => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InputSource::Touch => "touch",
            InputSource::Gesture => "gesture",
            InputSource::Face => "face",
            InputSource::Gaze => "gaze",
            InputSource::Position => "position",
            InputSource::Bio => "bio",
        }
    }

    pub(crate) fn from_index(index: usize) -> Option<InputSource> {
        PRIORITY_TABLE.get(index).copied()
    }
}

/// Discrete hand-gesture vocabulary.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureSymbol {
    Pinch,
    Spread,
    Fist,
    Point,
    Swipe,
    /// Hand visible but not forming any symbol
    None,
}

impl GestureSymbol {
    pub const COUNT: usize = 6;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_none(self) -> bool {
        self == GestureSymbol::None
    }
}

/// One raw hand-tracking observation.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureObservation {
    pub hand: u8,
    pub symbol: GestureSymbol,
    /// 0..1
    pub magnitude: f32,
    /// 0..1
    pub confidence: f32,
}

impl GestureObservation {
    pub fn new(hand: u8, symbol: GestureSymbol, magnitude: f32, confidence: f32) -> Self {
        Self {
            hand,
            symbol,
            magnitude,
            confidence,
        }
    }

    /// Lane this hand's observations are cached in
    #[inline]
    pub fn lane(&self) -> usize {
        self.hand as usize % HAND_LANES
    }
}

/// Value carried by an observation.
///
/// Scalars and vector components are pre-normalized to 0..1 by the adapter.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    Scalar(f32),
    Vector([f32; 3]),
    Gesture {
        observation: GestureObservation,
        /// Normalized image-plane position of the initiating hand
        hand_position: [f32; 2],
    },
}

/// Shared observation shape produced by every input adapter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedInputEvent {
    pub source: InputSource,
    /// Monotonic capture time
    pub timestamp: Instant,
    pub payload: Payload,
    /// 0..1
    pub confidence: f32,
}

impl NormalizedInputEvent {
    pub fn new(source: InputSource, timestamp: Instant, payload: Payload, confidence: f32) -> Self {
        Self {
            source,
            timestamp,
            payload,
            confidence,
        }
    }

    /// Touch contact at normalized (x, y) with normalized pressure
    pub fn touch(timestamp: Instant, x: f32, y: f32, pressure: f32) -> Self {
        Self::new(
            InputSource::Touch,
            timestamp,
            Payload::Vector([x, y, pressure]),
            1.0,
        )
    }

    pub fn gesture(
        timestamp: Instant,
        observation: GestureObservation,
        hand_position: [f32; 2],
    ) -> Self {
        Self::new(
            InputSource::Gesture,
            timestamp,
            Payload::Gesture {
                observation,
                hand_position,
            },
            observation.confidence,
        )
    }

    /// Face anchor position; the expression intensity rides in `z`
    pub fn face(timestamp: Instant, anchor: [f32; 2], intensity: f32, confidence: f32) -> Self {
        Self::new(
            InputSource::Face,
            timestamp,
            Payload::Vector([anchor[0], anchor[1], intensity]),
            confidence,
        )
    }

    pub fn vector(source: InputSource, timestamp: Instant, value: [f32; 3]) -> Self {
        Self::new(source, timestamp, Payload::Vector(value), 1.0)
    }

    /// Bio coherence sample, normalized to 0..1
    pub fn bio(timestamp: Instant, coherence: f32) -> Self {
        Self::new(InputSource::Bio, timestamp, Payload::Scalar(coherence), 1.0)
    }

    /// Cache lane within the event's source slot
    #[inline]
    pub fn lane(&self) -> usize {
        match self.payload {
            Payload::Gesture { observation, .. } => observation.lane(),
            _ => 0,
        }
    }

    #[inline]
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }

    /// Fresh means strictly younger than the staleness window.
    #[inline]
    pub fn is_fresh_at(&self, now: Instant, staleness: Duration) -> bool {
        self.age_at(now) < staleness
    }
}
