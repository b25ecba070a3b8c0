/// Identifies one allocation of a channel.
///
/// A handle goes dead when its voice is released or stolen; operations on a
/// dead handle are no-ops, even if the channel has since been reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    channel: u8,
    serial: u64,
}

impl VoiceHandle {
    pub(crate) fn new(channel: u8, serial: u64) -> Self {
        Self { channel, serial }
    }

    /// Member channel, 1..=N
    pub fn channel(&self) -> u8 {
        self.channel
    }
}

/// Per-voice expression dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expression {
    /// -1..1
    PitchBend,
    /// 0..1
    Brightness,
    /// 0..1
    Timbre,
}

impl Expression {
    pub(crate) fn clamp(self, value: f32) -> f32 {
        match self {
            Expression::PitchBend => value.clamp(-1.0, 1.0),
            Expression::Brightness | Expression::Timbre => value.clamp(0.0, 1.0),
        }
    }

    pub(crate) fn dirty_bit(self) -> u8 {
        match self {
            Expression::PitchBend => DIRTY_PITCH_BEND,
            Expression::Brightness => DIRTY_BRIGHTNESS,
            Expression::Timbre => DIRTY_TIMBRE,
        }
    }
}

pub(crate) const DIRTY_PITCH_BEND: u8 = 0b001;
pub(crate) const DIRTY_BRIGHTNESS: u8 = 0b010;
pub(crate) const DIRTY_TIMBRE: u8 = 0b100;
pub(crate) const DIRTY_ALL: u8 = DIRTY_PITCH_BEND | DIRTY_BRIGHTNESS | DIRTY_TIMBRE;

/// One live polyphonic note slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voice {
    handle: VoiceHandle,
    note: u8,
    velocity: u8,
    pitch_bend: f32,
    brightness: f32,
    timbre: f32,
    allocated_at: u64,
    dirty: u8,
}

impl Voice {
    pub(crate) fn start(handle: VoiceHandle, note: u8, velocity: u8, allocated_at: u64) -> Self {
        Self {
            handle,
            note,
            velocity,
            pitch_bend: 0.0,
            // Centre of the CC74 range
            brightness: 0.5,
            timbre: 0.0,
            allocated_at,
            dirty: DIRTY_ALL,
        }
    }

    pub fn handle(&self) -> VoiceHandle {
        self.handle
    }

    pub fn channel(&self) -> u8 {
        self.handle.channel
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    /// Velocity captured at allocation
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn pitch_bend(&self) -> f32 {
        self.pitch_bend
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn timbre(&self) -> f32 {
        self.timbre
    }

    /// Allocation order stamp; lower is older
    pub fn allocated_at(&self) -> u64 {
        self.allocated_at
    }

    pub fn get(&self, expression: Expression) -> f32 {
        match expression {
            Expression::PitchBend => self.pitch_bend,
            Expression::Brightness => self.brightness,
            Expression::Timbre => self.timbre,
        }
    }

    /// Clamp and store. Marks the dimension dirty only if the value changed.
    pub(crate) fn set(&mut self, expression: Expression, value: f32) {
        if value.is_nan() {
            return;
        }
        let value = expression.clamp(value);
        let slot = match expression {
            Expression::PitchBend => &mut self.pitch_bend,
            Expression::Brightness => &mut self.brightness,
            Expression::Timbre => &mut self.timbre,
        };
        if *slot != value {
            *slot = value;
            self.dirty |= expression.dirty_bit();
        }
    }

    #[cfg(test)]
    pub(crate) fn dirty(&self) -> u8 {
        self.dirty
    }

    pub(crate) fn take_dirty(&mut self) -> u8 {
        std::mem::take(&mut self.dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice() -> Voice {
        let mut v = Voice::start(VoiceHandle::new(1, 0), 60, 100, 0);
        v.take_dirty();
        v
    }

    #[test]
    fn test_new_voice_is_fully_dirty() {
        let v = Voice::start(VoiceHandle::new(3, 7), 64, 90, 5);
        assert_eq!(v.dirty(), DIRTY_ALL);
        assert_eq!(v.channel(), 3);
        assert_eq!(v.brightness(), 0.5);
    }

    #[test]
    fn test_set_clamps_into_range() {
        let mut v = voice();
        v.set(Expression::PitchBend, -3.0);
        v.set(Expression::Brightness, 1.7);
        v.set(Expression::Timbre, -0.2);
        assert_eq!(v.pitch_bend(), -1.0);
        assert_eq!(v.brightness(), 1.0);
        assert_eq!(v.timbre(), 0.0);
    }

    #[test]
    fn test_unchanged_value_stays_clean() {
        let mut v = voice();
        v.set(Expression::Brightness, 0.5);
        assert_eq!(v.dirty(), 0);
        v.set(Expression::Timbre, 0.25);
        assert_eq!(v.take_dirty(), DIRTY_TIMBRE);
        assert_eq!(v.dirty(), 0);
    }

    #[test]
    fn test_nan_is_ignored() {
        let mut v = voice();
        v.set(Expression::PitchBend, f32::NAN);
        assert_eq!(v.pitch_bend(), 0.0);
        assert_eq!(v.dirty(), 0);
    }
}
