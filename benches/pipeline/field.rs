//! Geometry generation for each class at a full pool.

use std::{hint::black_box, time::Instant};

use criterion::{BenchmarkId, Criterion};
use embody::{FieldConfig, SpatialFieldMapper, MAX_VOICES};

pub fn bench_field(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/field");

    for (name, coherence) in [("grid", 10.0f32), ("circle", 50.0), ("sphere", 90.0)] {
        let mut mapper = SpatialFieldMapper::new(FieldConfig::default()).expect("valid field");
        // Settle past the kind debounce
        let now = Instant::now();
        for _ in 0..4 {
            mapper.compute_geometry_at(MAX_VOICES, coherence, now);
        }

        let mut count = MAX_VOICES;
        group.bench_with_input(BenchmarkId::new(name, MAX_VOICES), &coherence, |b, &coherence| {
            b.iter(|| {
                // Alternate counts so the points are regenerated each pass
                count = if count == MAX_VOICES { MAX_VOICES - 1 } else { MAX_VOICES };
                black_box(mapper.compute_geometry_at(count, coherence, now).points().len())
            })
        });
    }

    group.finish();
}
