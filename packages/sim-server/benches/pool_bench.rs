// packages/sim-server/benches/pool_bench.rs
//! Engine pool acquire/release throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sim_server::runtime::{Engine, EnginePool};
use sim_server::utils::errors::EngineError;
use std::sync::Arc;

struct Noop;

impl Engine for Noop {
    fn command(&mut self, _command: &str) -> Result<(), EngineError> {
        Ok(())
    }

    fn report_bool(&mut self, _report: &str) -> Result<bool, EngineError> {
        Ok(false)
    }

    fn report_number(&mut self, _report: &str) -> Result<f64, EngineError> {
        Ok(0.0)
    }
}

fn filled_pool(size: usize) -> Arc<EnginePool<Noop>> {
    let pool = Arc::new(EnginePool::new());
    for _ in 0..size {
        let handle = pool.register(Noop);
        pool.release(handle);
    }
    pool
}

fn bench_acquire_release(c: &mut Criterion) {
    let pool = filled_pool(8);

    c.bench_function("acquire_release", |b| {
        b.iter(|| {
            let handle = pool.acquire().unwrap();
            pool.release(black_box(handle));
        })
    });
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_acquire_release");

    for threads in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let pool = filled_pool(threads);
            b.iter(|| {
                std::thread::scope(|scope| {
                    for _ in 0..threads {
                        let pool = Arc::clone(&pool);
                        scope.spawn(move || {
                            for _ in 0..100 {
                                if let Some(handle) = pool.acquire() {
                                    pool.release(handle);
                                }
                            }
                        });
                    }
                });
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_acquire_release, bench_contended);
criterion_main!(benches);
