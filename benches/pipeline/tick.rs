//! One engine tick with a fresh touch winner and a batch sink attached.

use std::{hint::black_box, time::Instant};

use criterion::{BenchmarkId, Criterion};
use embody::{
    engine::sink::{ExpressionBatch, ExpressionFn},
    voice::message::NoteMessage,
    Engine, EngineConfig, NormalizedInputEvent,
};
use rtrb::RingBuffer;

use crate::FILL_LEVELS;

pub fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline/tick");

    for &fill in FILL_LEVELS {
        let (mut notes_tx, notes_rx) = RingBuffer::<NoteMessage>::new(32);
        let mut engine = Engine::new(EngineConfig::default())
            .expect("default config is valid")
            .with_note_receiver(notes_rx)
            .with_expression_sink(ExpressionFn(|batch: &ExpressionBatch| {
                black_box(batch.len());
            }));

        for note in 0..fill as u8 {
            notes_tx
                .push(NoteMessage::NoteOn {
                    note: 48 + note,
                    velocity: 100,
                })
                .expect("ring has room");
        }
        engine.tick();

        let port = engine.input_port();
        let mut x = 0.0f32;
        group.bench_with_input(BenchmarkId::new("touch", fill), &fill, |b, _| {
            b.iter(|| {
                // Moving touch keeps every voice's expression dirty
                x = (x + 0.01) % 1.0;
                let now = Instant::now();
                port.ingest(NormalizedInputEvent::touch(now, x, 1.0 - x, 0.5));
                black_box(engine.tick_at(black_box(now)));
            })
        });
    }

    group.finish();
}
