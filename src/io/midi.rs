/// Channel voice messages. Channels are 0-based (0..=15).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// 14-bit, centre 8192
    PitchBend { channel: u8, value: u16 },
    ChannelPressure { channel: u8, value: u8 },
}

impl MidiEvent {
    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. }
            | MidiEvent::ChannelPressure { channel, .. } => channel,
        }
    }

    /// Wire bytes; the second value is how many of them are used.
    pub fn to_bytes(&self) -> ([u8; 3], usize) {
        match *self {
            MidiEvent::NoteOn {
                channel,
                key,
                velocity,
            } => ([0x90 | (channel & 0x0F), key & 0x7F, velocity & 0x7F], 3),
            MidiEvent::NoteOff {
                channel,
                key,
                velocity,
            } => ([0x80 | (channel & 0x0F), key & 0x7F, velocity & 0x7F], 3),
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => ([0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F], 3),
            MidiEvent::PitchBend { channel, value } => (
                [
                    0xE0 | (channel & 0x0F),
                    (value & 0x7F) as u8,
                    ((value >> 7) & 0x7F) as u8,
                ],
                3,
            ),
            MidiEvent::ChannelPressure { channel, value } => {
                ([0xD0 | (channel & 0x0F), value & 0x7F, 0], 2)
            }
        }
    }

    /// Parse one channel voice message; running status is not supported.
    pub fn from_bytes(bytes: &[u8]) -> Option<MidiEvent> {
        let status = *bytes.first()?;
        let channel = status & 0x0F;
        let data = |i: usize| bytes.get(i).map(|b| b & 0x7F);
        match status & 0xF0 {
            0x80 => Some(MidiEvent::NoteOff {
                channel,
                key: data(1)?,
                velocity: data(2)?,
            }),
            0x90 => Some(MidiEvent::NoteOn {
                channel,
                key: data(1)?,
                velocity: data(2)?,
            }),
            0xB0 => Some(MidiEvent::ControlChange {
                channel,
                controller: data(1)?,
                value: data(2)?,
            }),
            0xD0 => Some(MidiEvent::ChannelPressure {
                channel,
                value: data(1)?,
            }),
            0xE0 => Some(MidiEvent::PitchBend {
                channel,
                value: data(1)? as u16 | (data(2)? as u16) << 7,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_bend_bytes_are_lsb_first() {
        let event = MidiEvent::PitchBend {
            channel: 2,
            value: 8192,
        };
        assert_eq!(event.to_bytes(), ([0xE2, 0x00, 0x40], 3));
        assert_eq!(MidiEvent::from_bytes(&[0xE2, 0x00, 0x40]), Some(event));
    }

    #[test]
    fn test_channel_pressure_is_two_bytes() {
        let event = MidiEvent::ChannelPressure {
            channel: 1,
            value: 100,
        };
        let (bytes, len) = event.to_bytes();
        assert_eq!(&bytes[..len], &[0xD1, 100]);
    }

    #[test]
    fn test_rejects_truncated_and_system_messages() {
        assert_eq!(MidiEvent::from_bytes(&[0x90, 60]), None);
        assert_eq!(MidiEvent::from_bytes(&[0xF8]), None);
        assert_eq!(MidiEvent::from_bytes(&[]), None);
    }
}
