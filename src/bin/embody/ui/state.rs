//! Shared state types for UI communication
//!
//! Everything crossing from the tick thread is `Copy` and fixed-size, so
//! the sinks never allocate.

use embody::{
    engine::sink::{ExpressionDelta, NoteChange, SourceAssignment},
    FieldGeometry, GeometryClass, Point3, MAX_VOICES,
};

/// Channel slots including the unused master channel 0
pub const CHANNELS: usize = MAX_VOICES + 1;

/// Most points drawn for one geometry
pub const MAX_POINTS: usize = 64;

/// Dashboard view of one member channel, rebuilt from expression deltas
#[derive(Clone, Copy, Debug, Default)]
pub struct VoiceRow {
    pub live: bool,
    pub note: u8,
    pub velocity: u8,
    pub pitch_bend: f32,
    pub brightness: f32,
    pub timbre: f32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct VoiceTable {
    rows: [VoiceRow; CHANNELS],
}

impl VoiceTable {
    pub fn apply(&mut self, delta: &ExpressionDelta) {
        let Some(row) = self.rows.get_mut(delta.channel as usize) else {
            return;
        };
        match delta.note {
            Some(NoteChange::Off { .. }) => row.live = false,
            Some(NoteChange::On { note, velocity }) => {
                *row = VoiceRow {
                    live: true,
                    note,
                    velocity,
                    ..*row
                };
            }
            None => {}
        }
        if let Some(bend) = delta.pitch_bend {
            row.pitch_bend = bend;
        }
        if let Some(brightness) = delta.brightness {
            row.brightness = brightness;
        }
        if let Some(timbre) = delta.timbre {
            row.timbre = timbre;
        }
    }

    /// Member channels 1..=`max_voices` with their rows
    pub fn members(&self, max_voices: usize) -> impl Iterator<Item = (u8, &VoiceRow)> {
        self.rows
            .iter()
            .enumerate()
            .skip(1)
            .take(max_voices)
            .map(|(channel, row)| (channel as u8, row))
    }
}

/// Geometry snapshot sent from the spatial sink (allocation-free, Copy)
#[derive(Clone, Copy, Debug)]
pub struct FieldView {
    pub class: GeometryClass,
    pub count: usize,
    pub points: [Point3; MAX_POINTS],
    /// Source id per channel, if the channel is live
    pub assigned: [Option<usize>; CHANNELS],
}

impl FieldView {
    pub fn capture(geometry: &FieldGeometry, assignments: &[SourceAssignment]) -> Self {
        let mut view = Self {
            class: geometry.class(),
            count: geometry.points().len(),
            ..Self::default()
        };
        for (slot, point) in view.points.iter_mut().zip(geometry.points()) {
            *slot = *point;
        }
        for assignment in assignments {
            if let Some(slot) = view.assigned.get_mut(assignment.channel as usize) {
                *slot = Some(assignment.source);
            }
        }
        view
    }

    pub fn points(&self) -> &[Point3] {
        &self.points[..self.count.min(MAX_POINTS)]
    }

    pub fn occupied(&self) -> impl Iterator<Item = Point3> + '_ {
        self.assigned
            .iter()
            .flatten()
            .filter_map(|&source| self.points().get(source).copied())
    }
}

impl Default for FieldView {
    fn default() -> Self {
        Self {
            class: GeometryClass::Grid,
            count: 0,
            points: [[0.0; 3]; MAX_POINTS],
            assigned: [None; CHANNELS],
        }
    }
}
