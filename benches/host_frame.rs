//! Benchmarks for the CPU reference kernels.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sparkfield::compute::host;
use sparkfield::compute::EmitterUniform;
use sparkfield::config::EmitterParams;
use sparkfield::schema::ParticleState;

fn populated(capacity: usize, emitter: &EmitterUniform) -> Vec<ParticleState> {
    let mut particles = vec![ParticleState::default(); capacity];
    host::spawn(&mut particles, emitter, capacity as u32 / 2, 1, 0.0);
    particles
}

fn bench_stages(c: &mut Criterion) {
    let emitter = EmitterUniform::from(&EmitterParams::default());
    let mut group = c.benchmark_group("host_stages");

    for capacity in [10_000usize, 100_000, 1_000_000] {
        group.bench_with_input(BenchmarkId::new("update", capacity), &capacity, |b, &n| {
            let mut particles = populated(n, &emitter);
            b.iter(|| host::update(black_box(&mut particles), &emitter, 7, 1.0 / 60.0))
        });

        group.bench_with_input(BenchmarkId::new("death_check", capacity), &capacity, |b, &n| {
            let mut particles = populated(n, &emitter);
            b.iter(|| host::check_death(black_box(&mut particles), 0.5))
        });

        group.bench_with_input(BenchmarkId::new("spawn", capacity), &capacity, |b, &n| {
            let mut seed = 0u32;
            b.iter_batched_ref(
                || vec![ParticleState::default(); n],
                |particles| {
                    seed = seed.wrapping_add(1);
                    black_box(host::spawn(particles, &emitter, 1_000, seed, 0.0))
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_hash(c: &mut Criterion) {
    c.bench_function("pcg_hash", |b| {
        let mut x = 0u32;
        b.iter(|| {
            x = host::pcg_hash(black_box(x));
            host::rand01(x)
        })
    });
}

criterion_group!(benches, bench_stages, bench_hash);
criterion_main!(benches);
