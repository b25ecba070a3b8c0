//! Output collaborators and the per-tick batch handed to them.
//!
//! Sinks are called from the tick thread once per tick, after the voice
//! and geometry state for that tick is final. They must not block.

#[cfg(feature = "rtrb")]
use rtrb::Producer;

use crate::{
    spatial::geometry::FieldGeometry,
    voice::voice::{Voice, DIRTY_BRIGHTNESS, DIRTY_PITCH_BEND, DIRTY_TIMBRE},
};

/// Reserved global channel; voices use member channels 1..=N.
pub const MASTER_CHANNEL: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteChange {
    On { note: u8, velocity: u8 },
    Off { note: u8 },
}

/// Changes for one channel. Only fields that changed this tick are set.
///
/// A sink applying a delta should release before expression and send
/// expression before a note-on, so a new note starts with its initial
/// pitch bend, brightness and timbre already in place.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExpressionDelta {
    pub channel: u8,
    pub note: Option<NoteChange>,
    pub pitch_bend: Option<f32>,
    pub brightness: Option<f32>,
    pub timbre: Option<f32>,
}

impl ExpressionDelta {
    pub fn is_note_on(&self) -> bool {
        matches!(self.note, Some(NoteChange::On { .. }))
    }

    fn apply_dirty(&mut self, voice: &Voice, dirty: u8) {
        if dirty & DIRTY_PITCH_BEND != 0 {
            self.pitch_bend = Some(voice.pitch_bend());
        }
        if dirty & DIRTY_BRIGHTNESS != 0 {
            self.brightness = Some(voice.brightness());
        }
        if dirty & DIRTY_TIMBRE != 0 {
            self.timbre = Some(voice.timbre());
        }
    }
}

/// Everything that changed on the expression channels during one tick
#[derive(Debug, Clone, Default)]
pub struct ExpressionBatch {
    tick: u64,
    deltas: Vec<ExpressionDelta>,
}

impl ExpressionBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tick: 0,
            deltas: Vec::with_capacity(capacity),
        }
    }

    /// Index of the tick that produced this batch
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn deltas(&self) -> &[ExpressionDelta] {
        &self.deltas
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExpressionDelta> {
        self.deltas.iter()
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub(crate) fn begin(&mut self, tick: u64) {
        self.tick = tick;
        self.deltas.clear();
    }

    pub(crate) fn push_note(&mut self, channel: u8, note: NoteChange) {
        self.deltas.push(ExpressionDelta {
            channel,
            note: Some(note),
            ..ExpressionDelta::default()
        });
    }

    /// Record dirty expression for a live voice.
    ///
    /// Merges into this tick's note-on for the same channel when that is
    /// the channel's latest delta.
    pub(crate) fn push_expression(&mut self, voice: &Voice, dirty: u8) {
        let channel = voice.channel();
        let latest = self.deltas.iter_mut().rev().find(|d| d.channel == channel);
        match latest {
            Some(delta) if delta.is_note_on() => delta.apply_dirty(voice, dirty),
            _ => {
                let mut delta = ExpressionDelta {
                    channel,
                    ..ExpressionDelta::default()
                };
                delta.apply_dirty(voice, dirty);
                self.deltas.push(delta);
            }
        }
    }
}

impl<'a> IntoIterator for &'a ExpressionBatch {
    type Item = &'a ExpressionDelta;
    type IntoIter = std::slice::Iter<'a, ExpressionDelta>;

    fn into_iter(self) -> Self::IntoIter {
        self.deltas.iter()
    }
}

/// Live voice → virtual source id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceAssignment {
    pub channel: u8,
    pub source: usize,
}

/// Receives one expression batch per tick
pub trait ExpressionSink: Send {
    /// Deliver a batch. Returns how many deltas could not be delivered.
    fn dispatch(&mut self, batch: &ExpressionBatch) -> usize;
}

/// Receives the current geometry and voice placement once per tick
pub trait SpatialSink: Send {
    fn update(&mut self, geometry: &FieldGeometry, assignments: &[SourceAssignment]);
}

/// Adapts a closure into an [`ExpressionSink`]
pub struct ExpressionFn<F>(pub F);

impl<F> ExpressionSink for ExpressionFn<F>
where
    F: FnMut(&ExpressionBatch) + Send,
{
    fn dispatch(&mut self, batch: &ExpressionBatch) -> usize {
        (self.0)(batch);
        0
    }
}

impl<F> SpatialSink for F
where
    F: FnMut(&FieldGeometry, &[SourceAssignment]) + Send,
{
    fn update(&mut self, geometry: &FieldGeometry, assignments: &[SourceAssignment]) {
        self(geometry, assignments)
    }
}

/// Pushes each delta into a ring buffer; full slots count as dropped.
#[cfg(feature = "rtrb")]
impl ExpressionSink for Producer<ExpressionDelta> {
    fn dispatch(&mut self, batch: &ExpressionBatch) -> usize {
        batch
            .iter()
            .filter(|delta| self.push(**delta).is_err())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::allocator::VoiceAllocator;

    #[test]
    fn test_initial_expression_merges_into_note_on() {
        let mut pool = VoiceAllocator::new(2).unwrap();
        let voice = pool.allocate(60, 100);
        let mut batch = ExpressionBatch::with_capacity(8);
        batch.begin(1);
        batch.push_note(
            voice.channel(),
            NoteChange::On {
                note: 60,
                velocity: 100,
            },
        );
        pool.flush_dirty(|v, dirty| batch.push_expression(v, dirty));

        assert_eq!(batch.len(), 1);
        let delta = batch.deltas()[0];
        assert!(delta.is_note_on());
        assert_eq!(delta.pitch_bend, Some(0.0));
        assert_eq!(delta.brightness, Some(0.5));
        assert_eq!(delta.timbre, Some(0.0));
    }

    #[test]
    fn test_expression_after_note_off_gets_own_delta() {
        let mut pool = VoiceAllocator::new(1).unwrap();
        let voice = pool.allocate(60, 100);
        pool.flush_dirty(|_, _| {});
        pool.set_brightness(voice.handle(), 0.9);

        let mut batch = ExpressionBatch::default();
        batch.begin(2);
        batch.push_note(1, NoteChange::Off { note: 48 });
        pool.flush_dirty(|v, dirty| batch.push_expression(v, dirty));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.deltas()[1].brightness, Some(0.9));
        assert_eq!(batch.deltas()[1].pitch_bend, None);
    }

    #[cfg(feature = "rtrb")]
    #[test]
    fn test_ring_sink_counts_dropped_deltas() {
        let (mut tx, mut rx) = rtrb::RingBuffer::<ExpressionDelta>::new(2);
        let mut batch = ExpressionBatch::default();
        batch.begin(0);
        for channel in 1..=3 {
            batch.push_note(channel, NoteChange::Off { note: 60 });
        }
        assert_eq!(tx.dispatch(&batch), 1);
        assert_eq!(rx.pop().ok().map(|d| d.channel), Some(1));
    }

    #[test]
    fn test_closures_are_sinks() {
        let mut seen = 0usize;
        {
            let mut sink = ExpressionFn(|batch: &ExpressionBatch| seen += batch.len());
            let mut batch = ExpressionBatch::default();
            batch.begin(0);
            batch.push_note(1, NoteChange::Off { note: 1 });
            assert_eq!(sink.dispatch(&batch), 0);
        }
        assert_eq!(seen, 1);
    }
}
