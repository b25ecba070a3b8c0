//! Pipeline benchmarks

mod field;
mod tick;
mod voices;

pub use field::bench_field;
pub use tick::bench_tick;
pub use voices::bench_voices;
