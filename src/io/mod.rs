// Purpose - MIDI wire format, host note conversion, MPE output

pub mod converter;
pub mod midi;
pub mod mpe;
