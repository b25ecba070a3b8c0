//! Fixed-size voice pool with oldest-first stealing.
//!
//! Channel `c` lives in slot `c - 1`. Allocation takes the lowest free
//! channel; when the pool is full the voice with the smallest
//! `allocated_at` is stolen, and its note-off is queued before the new
//! note-on. Nothing is emitted from here: the scheduler drains
//! [`VoiceEvent`]s and dirty expression state once per tick.

use tracing::debug;

use crate::{
    engine::config::{validate_voice_count, ConfigError},
    voice::voice::{Expression, Voice, VoiceHandle},
};

/// Note lifecycle notification queued for the next batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceEvent {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
        /// Released to make room for another note
        stolen: bool,
    },
}

pub struct VoiceAllocator {
    slots: Vec<Option<Voice>>,
    clock: u64,
    serial: u64,
    events: Vec<VoiceEvent>,
    steals: u64,
}

impl VoiceAllocator {
    pub fn new(max_voices: usize) -> Result<Self, ConfigError> {
        validate_voice_count(max_voices)?;
        Ok(Self {
            slots: vec![None; max_voices],
            clock: 0,
            serial: 0,
            events: Vec::with_capacity(max_voices * 4),
            steals: 0,
        })
    }

    /// Start a note on the lowest free channel, stealing the oldest voice
    /// if every channel is taken.
    pub fn allocate(&mut self, note: u8, velocity: u8) -> Voice {
        let index = match self.slots.iter().position(Option::is_none) {
            Some(index) => index,
            None => self.steal_oldest(),
        };

        let channel = (index + 1) as u8;
        let handle = VoiceHandle::new(channel, self.serial);
        let voice = Voice::start(handle, note, velocity, self.clock);
        self.serial += 1;
        self.clock += 1;

        self.slots[index] = Some(voice);
        self.events.push(VoiceEvent::NoteOn {
            channel,
            note,
            velocity,
        });
        voice
    }

    /// Release a voice. Returns false if it was already released or stolen.
    pub fn release(&mut self, handle: VoiceHandle) -> bool {
        let Some(index) = self.index_of(handle) else {
            return false;
        };
        self.free(index, false);
        true
    }

    /// Release the oldest live voice playing `note`.
    pub fn release_note(&mut self, note: u8) -> Option<VoiceHandle> {
        let index = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|v| (i, v)))
            .filter(|(_, v)| v.note() == note)
            .min_by_key(|(_, v)| v.allocated_at())
            .map(|(i, _)| i)?;
        self.free(index, false)
    }

    /// Free every channel.
    pub fn release_all(&mut self) {
        for index in 0..self.slots.len() {
            self.free(index, false);
        }
    }

    pub fn set(&mut self, handle: VoiceHandle, expression: Expression, value: f32) -> bool {
        match self.index_of(handle) {
            Some(index) => {
                if let Some(voice) = self.slots[index].as_mut() {
                    voice.set(expression, value);
                }
                true
            }
            None => false,
        }
    }

    pub fn set_pitch_bend(&mut self, handle: VoiceHandle, value: f32) -> bool {
        self.set(handle, Expression::PitchBend, value)
    }

    pub fn set_brightness(&mut self, handle: VoiceHandle, value: f32) -> bool {
        self.set(handle, Expression::Brightness, value)
    }

    pub fn set_timbre(&mut self, handle: VoiceHandle, value: f32) -> bool {
        self.set(handle, Expression::Timbre, value)
    }

    /// Apply one expression value to every live voice
    pub fn set_all(&mut self, expression: Expression, value: f32) {
        for voice in self.slots.iter_mut().flatten() {
            voice.set(expression, value);
        }
    }

    /// Change the pool size. Voices on channels above the new size are released.
    pub fn resize(&mut self, max_voices: usize) -> Result<(), ConfigError> {
        validate_voice_count(max_voices)?;
        for index in max_voices..self.slots.len() {
            self.free(index, false);
        }
        self.slots.resize(max_voices, None);
        Ok(())
    }

    pub fn voice(&self, handle: VoiceHandle) -> Option<&Voice> {
        self.index_of(handle).and_then(|i| self.slots[i].as_ref())
    }

    pub fn voice_on(&self, channel: u8) -> Option<&Voice> {
        let index = (channel as usize).checked_sub(1)?;
        self.slots.get(index)?.as_ref()
    }

    /// Live voices in channel order
    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.slots.iter().flatten()
    }

    pub fn is_live(&self, handle: VoiceHandle) -> bool {
        self.index_of(handle).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live voices as a fraction of capacity
    pub fn utilization(&self) -> f32 {
        self.live_count() as f32 / self.capacity() as f32
    }

    pub fn steal_count(&self) -> u64 {
        self.steals
    }

    /// Note lifecycle events queued since the last drain, in order
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, VoiceEvent> {
        self.events.drain(..)
    }

    /// Visit each voice with pending expression changes, clearing them.
    ///
    /// The visitor receives the voice and its dirty mask.
    pub fn flush_dirty(&mut self, mut visit: impl FnMut(&Voice, u8)) {
        for voice in self.slots.iter_mut().flatten() {
            let dirty = voice.take_dirty();
            if dirty != 0 {
                visit(voice, dirty);
            }
        }
    }

    fn index_of(&self, handle: VoiceHandle) -> Option<usize> {
        let index = (handle.channel() as usize).checked_sub(1)?;
        match self.slots.get(index)? {
            Some(voice) if voice.handle() == handle => Some(index),
            _ => None,
        }
    }

    fn steal_oldest(&mut self) -> usize {
        let index = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|v| (i, v.allocated_at())))
            .min_by_key(|&(_, allocated_at)| allocated_at)
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.free(index, true);
        self.steals += 1;
        debug!(
            channel = index + 1,
            steals = self.steals,
            "voice pool full, stole oldest voice"
        );
        index
    }

    fn free(&mut self, index: usize, stolen: bool) -> Option<VoiceHandle> {
        let voice = self.slots.get_mut(index)?.take()?;
        self.events.push(VoiceEvent::NoteOff {
            channel: voice.channel(),
            note: voice.note(),
            stolen,
        });
        Some(voice.handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::voice::DIRTY_ALL;

    #[test]
    fn test_allocates_lowest_free_channel() {
        let mut pool = VoiceAllocator::new(4).unwrap();
        let a = pool.allocate(60, 100);
        let b = pool.allocate(62, 100);
        assert_eq!(a.channel(), 1);
        assert_eq!(b.channel(), 2);

        pool.release(a.handle());
        let c = pool.allocate(64, 90);
        assert_eq!(c.channel(), 1);
        assert_eq!(pool.live_count(), 2);
    }

    #[test]
    fn test_steals_oldest_when_full() {
        let mut pool = VoiceAllocator::new(3).unwrap();
        let voices: Vec<_> = (0..3).map(|i| pool.allocate(60 + i, 100)).collect();
        // Free and reuse channel 1 so the oldest voice sits on channel 2
        pool.release(voices[0].handle());
        pool.allocate(70, 100);
        pool.drain_events().for_each(drop);

        let stolen = pool.allocate(72, 100);
        assert_eq!(stolen.channel(), 2);
        assert_eq!(pool.steal_count(), 1);
        assert!(!pool.is_live(voices[1].handle()));

        let events: Vec<_> = pool.drain_events().collect();
        assert_eq!(
            events,
            vec![
                VoiceEvent::NoteOff {
                    channel: 2,
                    note: 61,
                    stolen: true
                },
                VoiceEvent::NoteOn {
                    channel: 2,
                    note: 72,
                    velocity: 100
                },
            ]
        );
    }

    #[test]
    fn test_live_count_never_exceeds_capacity() {
        let mut pool = VoiceAllocator::new(5).unwrap();
        let mut handles = Vec::new();
        // Deterministic mixed sequence of allocations and releases
        for step in 0..500u32 {
            let roll = step.wrapping_mul(2_654_435_761) >> 28;
            if roll < 11 || handles.is_empty() {
                handles.push(pool.allocate((step % 128) as u8, 100).handle());
            } else {
                let victim = handles.remove((roll as usize) % handles.len());
                pool.release(victim);
            }
            assert!(pool.live_count() <= 5);
            for voice in pool.voices() {
                assert!((1..=5).contains(&voice.channel()));
            }
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut pool = VoiceAllocator::new(2).unwrap();
        let v = pool.allocate(60, 100);
        assert!(pool.release(v.handle()));
        assert!(!pool.release(v.handle()));
        let offs = pool
            .drain_events()
            .filter(|e| matches!(e, VoiceEvent::NoteOff { .. }))
            .count();
        assert_eq!(offs, 1);
    }

    #[test]
    fn test_stale_handle_does_not_touch_new_owner() {
        let mut pool = VoiceAllocator::new(1).unwrap();
        let old = pool.allocate(60, 100);
        let new = pool.allocate(62, 100);
        assert_eq!(new.channel(), old.channel());
        assert!(!pool.set_brightness(old.handle(), 0.9));
        assert!(!pool.release(old.handle()));
        assert!(pool.is_live(new.handle()));
    }

    #[test]
    fn test_release_all_frees_every_channel() {
        let mut pool = VoiceAllocator::new(15).unwrap();
        for note in 0..10 {
            pool.allocate(note, 100);
        }
        pool.release_all();
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.voices().count(), 0);
    }

    #[test]
    fn test_release_note_picks_oldest_match() {
        let mut pool = VoiceAllocator::new(4).unwrap();
        let first = pool.allocate(60, 100);
        let second = pool.allocate(60, 80);
        assert_eq!(pool.release_note(60), Some(first.handle()));
        assert!(pool.is_live(second.handle()));
        assert_eq!(pool.release_note(61), None);
    }

    #[test]
    fn test_setters_clamp_and_mark_dirty() {
        let mut pool = VoiceAllocator::new(2).unwrap();
        let v = pool.allocate(60, 100);
        pool.flush_dirty(|_, dirty| assert_eq!(dirty, DIRTY_ALL));

        assert!(pool.set_pitch_bend(v.handle(), 2.0));
        assert!(pool.set_timbre(v.handle(), 0.3));
        let voice = pool.voice(v.handle()).unwrap();
        assert_eq!(voice.pitch_bend(), 1.0);
        assert_eq!(voice.timbre(), 0.3);

        let mut seen = 0;
        pool.flush_dirty(|voice, _| {
            assert_eq!(voice.channel(), 1);
            seen += 1;
        });
        assert_eq!(seen, 1);
        pool.flush_dirty(|_, _| panic!("nothing should be dirty"));
    }

    #[test]
    fn test_resize_releases_high_channels() {
        let mut pool = VoiceAllocator::new(4).unwrap();
        for note in 0..4 {
            pool.allocate(note, 100);
        }
        pool.drain_events().for_each(drop);
        pool.resize(2).unwrap();
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.live_count(), 2);
        assert_eq!(pool.drain_events().count(), 2);
        assert!(pool.resize(0).is_err());
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn test_rejects_invalid_capacity() {
        assert!(VoiceAllocator::new(0).is_err());
        assert!(VoiceAllocator::new(16).is_err());
    }
}
