//! Source geometries and deterministic point placement.
//!
//! Coordinates are right-handed with `z` up: grids and circles lie in the
//! horizontal `xy` plane, and the Fibonacci sphere's inclination is
//! measured from `+z`.

use std::{
    f64::consts::{PI, TAU},
    time::Instant,
};

pub type Point3 = [f32; 3];

/// Golden angle in radians, π(3 − √5)
pub fn golden_angle() -> f64 {
    PI * (3.0 - 5.0_f64.sqrt())
}

/// Geometry family, ignoring parameters. Hysteresis compares these.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryClass {
    Grid,
    Circle,
    FibonacciSphere,
}

impl GeometryClass {
    pub fn name(self) -> &'static str {
        match self {
            GeometryClass::Grid => "grid",
            GeometryClass::Circle => "circle",
            GeometryClass::FibonacciSphere => "fibonacci-sphere",
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometryKind {
    Grid { rows: usize, cols: usize, spacing: f32 },
    Circle { radius: f32, count: usize },
    FibonacciSphere { count: usize },
}

impl GeometryKind {
    pub fn class(&self) -> GeometryClass {
        match self {
            GeometryKind::Grid { .. } => GeometryClass::Grid,
            GeometryKind::Circle { .. } => GeometryClass::Circle,
            GeometryKind::FibonacciSphere { .. } => GeometryClass::FibonacciSphere,
        }
    }

    /// Number of sources this geometry places
    pub fn count(&self) -> usize {
        match *self {
            GeometryKind::Grid { rows, cols, .. } => rows * cols,
            GeometryKind::Circle { count, .. } => count,
            GeometryKind::FibonacciSphere { count } => count,
        }
    }
}

/// Current arrangement of virtual sources
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGeometry {
    kind: GeometryKind,
    generated_at: Instant,
    points: Vec<Point3>,
}

impl FieldGeometry {
    pub fn new(kind: GeometryKind, sphere_radius: f32, generated_at: Instant) -> Self {
        let mut geometry = Self {
            kind,
            generated_at,
            points: Vec::with_capacity(kind.count()),
        };
        geometry.regenerate(kind, sphere_radius, generated_at);
        geometry
    }

    pub fn kind(&self) -> &GeometryKind {
        &self.kind
    }

    pub fn class(&self) -> GeometryClass {
        self.kind.class()
    }

    pub fn generated_at(&self) -> Instant {
        self.generated_at
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Source id for the `index`-th live voice (voices in channel order).
    ///
    /// Circle and sphere place one source per voice; a grid has a fixed
    /// number of cells, so voices wrap around it.
    pub fn source_for(&self, index: usize) -> Option<usize> {
        match self.points.len() {
            0 => None,
            n => Some(index % n),
        }
    }

    /// Rebuild in place, reusing the point buffer.
    pub(crate) fn regenerate(&mut self, kind: GeometryKind, sphere_radius: f32, at: Instant) {
        self.kind = kind;
        self.generated_at = at;
        self.points.clear();
        match kind {
            GeometryKind::Grid {
                rows,
                cols,
                spacing,
            } => self.points.extend(grid_points(rows, cols, spacing)),
            GeometryKind::Circle { radius, count } => {
                self.points.extend(circle_points(radius, count))
            }
            GeometryKind::FibonacciSphere { count } => self
                .points
                .extend((0..count).map(|k| fibonacci_point(k, count, sphere_radius))),
        }
    }
}

/// Rows x cols lattice centred on the origin
pub fn grid_points(rows: usize, cols: usize, spacing: f32) -> impl Iterator<Item = Point3> {
    let row_offset = (rows as f32 - 1.0) / 2.0;
    let col_offset = (cols as f32 - 1.0) / 2.0;
    (0..rows).flat_map(move |r| {
        (0..cols).map(move |c| {
            [
                (c as f32 - col_offset) * spacing,
                (r as f32 - row_offset) * spacing,
                0.0,
            ]
        })
    })
}

/// `count` points evenly spaced on a circle, first point on `+x`
pub fn circle_points(radius: f32, count: usize) -> impl Iterator<Item = Point3> {
    (0..count).map(move |k| {
        let angle = TAU * k as f64 / count as f64;
        [
            (radius as f64 * angle.cos()) as f32,
            (radius as f64 * angle.sin()) as f32,
            0.0,
        ]
    })
}

/// Point `k` of `n` on a golden-angle sphere.
///
/// inclination = acos(1 − 2(k + 0.5)/n), azimuth = k · golden angle.
pub fn fibonacci_point(k: usize, n: usize, radius: f32) -> Point3 {
    let inclination = (1.0 - 2.0 * (k as f64 + 0.5) / n as f64).acos();
    let azimuth = k as f64 * golden_angle();
    let r = radius as f64;
    [
        (r * inclination.sin() * azimuth.cos()) as f32,
        (r * inclination.sin() * azimuth.sin()) as f32,
        (r * inclination.cos()) as f32,
    ]
}
