//! Coherence-driven geometry selection with kind hysteresis.
//!
//! | coherence            | geometry                              |
//! |----------------------|---------------------------------------|
//! | `< low` (40)         | grid(rows, cols, spacing) = (3, 3, 0.5) |
//! | `low ..< high` (60)  | circle(radius 1.5, count = voices)    |
//! | `>= high`            | Fibonacci sphere(count = voices)      |
//!
//! The geometry *kind* only switches once a new classification has held
//! for `debounce_ticks` consecutive calls. Count changes within the current
//! kind apply on the same call.

use std::time::Instant;

use tracing::debug;

use crate::{
    engine::config::{ConfigError, FieldConfig},
    spatial::geometry::{FieldGeometry, GeometryClass, GeometryKind},
};

pub struct SpatialFieldMapper {
    config: FieldConfig,
    geometry: Option<FieldGeometry>,
    /// Candidate kind and how many consecutive calls it has been seen
    pending: Option<(GeometryClass, u32)>,
    kind_changes: u64,
}

impl SpatialFieldMapper {
    pub fn new(config: FieldConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            geometry: None,
            pending: None,
            kind_changes: 0,
        })
    }

    /// Stateless classification of a coherence value
    pub fn classify(&self, coherence: f32) -> GeometryClass {
        if coherence < self.config.low_coherence {
            GeometryClass::Grid
        } else if coherence < self.config.high_coherence {
            GeometryClass::Circle
        } else {
            GeometryClass::FibonacciSphere
        }
    }

    pub fn compute_geometry(&mut self, voice_count: usize, coherence: f32) -> &FieldGeometry {
        self.compute_geometry_at(voice_count, coherence, Instant::now())
    }

    pub fn compute_geometry_at(
        &mut self,
        voice_count: usize,
        coherence: f32,
        now: Instant,
    ) -> &FieldGeometry {
        let current = self.geometry.as_ref().map(FieldGeometry::class);
        let target = if coherence.is_nan() {
            current.unwrap_or(GeometryClass::Grid)
        } else {
            self.classify(coherence)
        };

        let class = match current {
            None => target,
            Some(current) if current == target => {
                self.pending = None;
                current
            }
            Some(current) => {
                let held = match self.pending {
                    Some((candidate, ticks)) if candidate == target => ticks + 1,
                    _ => 1,
                };
                if held >= self.config.debounce_ticks {
                    self.pending = None;
                    self.kind_changes += 1;
                    debug!(
                        from = current.name(),
                        to = target.name(),
                        coherence,
                        "field geometry kind changed"
                    );
                    target
                } else {
                    self.pending = Some((target, held));
                    current
                }
            }
        };

        let kind = self.kind_for(class, voice_count);
        let sphere_radius = self.config.sphere_radius;
        let geometry = self
            .geometry
            .get_or_insert_with(|| FieldGeometry::new(kind, sphere_radius, now));
        geometry.regenerate(kind, sphere_radius, now);
        geometry
    }

    /// Most recently computed geometry
    pub fn geometry(&self) -> Option<&FieldGeometry> {
        self.geometry.as_ref()
    }

    /// Number of debounced kind switches so far
    pub fn kind_changes(&self) -> u64 {
        self.kind_changes
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    /// Replace boundaries and parameters; takes effect on the next compute.
    pub fn set_config(&mut self, config: FieldConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn kind_for(&self, class: GeometryClass, voice_count: usize) -> GeometryKind {
        match class {
            GeometryClass::Grid => GeometryKind::Grid {
                rows: self.config.grid_rows,
                cols: self.config.grid_cols,
                spacing: self.config.grid_spacing,
            },
            GeometryClass::Circle => GeometryKind::Circle {
                radius: self.config.circle_radius,
                count: voice_count,
            },
            GeometryClass::FibonacciSphere => GeometryKind::FibonacciSphere { count: voice_count },
        }
    }
}
