use crate::{io::midi::MidiEvent, voice::message::NoteMessage};

/// Host note command from an incoming MIDI message on `channel_filter`.
///
/// A note-on with velocity 0 is a note-off; CC 123 is all-notes-off.
pub fn midi_to_note(midi: MidiEvent, channel_filter: u8) -> Option<NoteMessage> {
    match midi {
        MidiEvent::NoteOn {
            channel,
            key,
            velocity: 0,
        } if channel == channel_filter => Some(NoteMessage::NoteOff { note: key }),
        MidiEvent::NoteOn {
            channel,
            key,
            velocity,
        } if channel == channel_filter => Some(NoteMessage::NoteOn {
            note: key,
            velocity,
        }),
        MidiEvent::NoteOff { channel, key, .. } if channel == channel_filter => {
            Some(NoteMessage::NoteOff { note: key })
        }
        MidiEvent::ControlChange {
            channel,
            controller: 123,
            ..
        } if channel == channel_filter => Some(NoteMessage::AllNotesOff),
        _ => None,
    }
}

/// -1..1 → 14-bit pitch bend, exact centre at 8192
pub fn bend_to_14bit(bend: f32) -> u16 {
    let bend = bend.clamp(-1.0, 1.0);
    let offset = if bend >= 0.0 {
        bend * 8191.0
    } else {
        bend * 8192.0
    };
    (8192.0 + offset).round() as u16
}

/// 0..1 → 14-bit value
pub fn unit_to_14bit(value: f32) -> u16 {
    (value.clamp(0.0, 1.0) * 16383.0).round() as u16
}

/// 0..1 → 7-bit value
pub fn unit_to_7bit(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 127.0).round() as u8
}
