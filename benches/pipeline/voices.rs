//! Voice allocation with a full pool, so every allocation steals.

use std::hint::black_box;

use criterion::Criterion;
use embody::{voice::voice::Expression, VoiceAllocator, MAX_VOICES};

pub fn bench_voices(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/voices");

    let mut pool = VoiceAllocator::new(MAX_VOICES).expect("valid pool size");
    for note in 0..MAX_VOICES as u8 {
        pool.allocate(40 + note, 100);
    }
    pool.drain_events().for_each(drop);

    let mut note = 0u8;
    group.bench_function("steal", |b| {
        b.iter(|| {
            note = (note + 1) % 128;
            let voice = pool.allocate(black_box(note), 100);
            pool.drain_events().for_each(drop);
            black_box(voice.channel())
        })
    });

    group.bench_function("set_all", |b| {
        let mut value = 0.0f32;
        b.iter(|| {
            value = (value + 0.01) % 1.0;
            pool.set_all(Expression::Brightness, black_box(value));
            pool.flush_dirty(|voice, dirty| {
                black_box((voice.channel(), dirty));
            });
        })
    });

    group.finish();
}
