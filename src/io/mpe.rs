//! MPE lower-zone encoder.
//!
//! Voice channel `c` (1..=15) goes out on MIDI channel index `c`; index 0 is
//! the zone's master channel.
//!
//! Pitch bend is 14-bit. Brightness and timbre go out as 14-bit MSB/LSB
//! controller pairs (CC74/CC106 and CC71/CC103). Receivers that read timbre
//! from channel pressure can opt into that with
//! [`MpeEncoder::with_pressure_timbre`], which is 7-bit only.

#[cfg(feature = "rtrb")]
use rtrb::Producer;

use crate::{
    engine::sink::{ExpressionBatch, ExpressionDelta, ExpressionSink, NoteChange, MASTER_CHANNEL},
    io::{
        converter::{bend_to_14bit, unit_to_14bit, unit_to_7bit},
        midi::MidiEvent,
    },
};

pub const CC_BRIGHTNESS: u8 = 74;
pub const CC_BRIGHTNESS_LSB: u8 = 106;
pub const CC_TIMBRE: u8 = 71;
pub const CC_TIMBRE_LSB: u8 = 103;
const CC_RPN_MSB: u8 = 101;
const CC_RPN_LSB: u8 = 100;
const CC_DATA_ENTRY: u8 = 6;
const RPN_MPE_CONFIGURATION: u8 = 6;
const RPN_NULL: u8 = 127;
const NOTE_OFF_VELOCITY: u8 = 64;

/// Destination for encoded events. Returns false when the event was dropped.
pub trait MidiWriter {
    fn write(&mut self, event: MidiEvent) -> bool;
}

impl MidiWriter for Vec<MidiEvent> {
    fn write(&mut self, event: MidiEvent) -> bool {
        self.push(event);
        true
    }
}

#[cfg(feature = "rtrb")]
impl MidiWriter for Producer<MidiEvent> {
    fn write(&mut self, event: MidiEvent) -> bool {
        self.push(event).is_ok()
    }
}

pub struct MpeEncoder<W> {
    writer: W,
    brightness_lsb: bool,
    pressure_timbre: bool,
}

impl<W: MidiWriter> MpeEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            brightness_lsb: true,
            pressure_timbre: false,
        }
    }

    /// Send brightness as CC74 only, without the CC106 fine value
    pub fn without_brightness_lsb(mut self) -> Self {
        self.brightness_lsb = false;
        self
    }

    /// Send timbre as 7-bit channel pressure instead of CC71/CC103
    pub fn with_pressure_timbre(mut self) -> Self {
        self.pressure_timbre = true;
        self
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Announce a lower zone with `member_channels` voice channels.
    ///
    /// RPN 6 on the master channel, followed by the null RPN.
    pub fn zone_configuration(&mut self, member_channels: u8) -> bool {
        let member_channels = member_channels.min(15);
        let cc = |controller, value| MidiEvent::ControlChange {
            channel: MASTER_CHANNEL,
            controller,
            value,
        };
        [
            cc(CC_RPN_LSB, RPN_MPE_CONFIGURATION),
            cc(CC_RPN_MSB, 0),
            cc(CC_DATA_ENTRY, member_channels),
            cc(CC_RPN_LSB, RPN_NULL),
            cc(CC_RPN_MSB, RPN_NULL),
        ]
        .into_iter()
        .fold(true, |ok, event| self.writer.write(event) && ok)
    }

    /// Encode one delta. Returns false if any of its events were dropped.
    pub fn encode(&mut self, delta: &ExpressionDelta) -> bool {
        let channel = delta.channel & 0x0F;
        let mut ok = true;

        if let Some(NoteChange::Off { note }) = delta.note {
            ok &= self.writer.write(MidiEvent::NoteOff {
                channel,
                key: note,
                velocity: NOTE_OFF_VELOCITY,
            });
        }

        if let Some(bend) = delta.pitch_bend {
            ok &= self.writer.write(MidiEvent::PitchBend {
                channel,
                value: bend_to_14bit(bend),
            });
        }
        if let Some(brightness) = delta.brightness {
            ok &= if self.brightness_lsb {
                self.write_fine_cc(channel, CC_BRIGHTNESS, CC_BRIGHTNESS_LSB, brightness)
            } else {
                self.writer.write(MidiEvent::ControlChange {
                    channel,
                    controller: CC_BRIGHTNESS,
                    value: unit_to_7bit(brightness),
                })
            };
        }
        if let Some(timbre) = delta.timbre {
            ok &= if self.pressure_timbre {
                self.writer.write(MidiEvent::ChannelPressure {
                    channel,
                    value: unit_to_7bit(timbre),
                })
            } else {
                self.write_fine_cc(channel, CC_TIMBRE, CC_TIMBRE_LSB, timbre)
            };
        }

        if let Some(NoteChange::On { note, velocity }) = delta.note {
            ok &= self.writer.write(MidiEvent::NoteOn {
                channel,
                key: note,
                velocity: velocity.clamp(1, 127),
            });
        }
        ok
    }

    /// MSB on `coarse`, then LSB on `fine`
    fn write_fine_cc(&mut self, channel: u8, coarse: u8, fine: u8, unit: f32) -> bool {
        let value = unit_to_14bit(unit);
        let msb = self.writer.write(MidiEvent::ControlChange {
            channel,
            controller: coarse,
            value: (value >> 7) as u8,
        });
        let lsb = self.writer.write(MidiEvent::ControlChange {
            channel,
            controller: fine,
            value: (value & 0x7F) as u8,
        });
        msb && lsb
    }
}

impl<W: MidiWriter + Send> ExpressionSink for MpeEncoder<W> {
    fn dispatch(&mut self, batch: &ExpressionBatch) -> usize {
        batch.iter().filter(|delta| !self.encode(delta)).count()
    }
}
