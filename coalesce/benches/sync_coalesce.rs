use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc, Barrier,
};
use std::thread;
use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fibre_coalesce::{Coalescer, Context, MemoryStore, TtlStore};

type BenchCoalescer = Coalescer<u64, u64, std::convert::Infallible, MemoryStore<u64, u64>>;

fn new_coalescer() -> BenchCoalescer {
  Coalescer::builder(MemoryStore::new()).build().unwrap()
}

// --- Hit Path ---
fn bench_hit(c: &mut Criterion) {
  let coalescer = new_coalescer();
  for i in 0..1024u64 {
    coalescer.store().set(&Context::background(), &i, i).unwrap();
  }
  let ctx = Context::background();

  let mut group = c.benchmark_group("Hit");
  group.throughput(Throughput::Elements(1));
  group.bench_function("get_with", |b| {
    let mut i = 0u64;
    b.iter(|| {
      i = (i + 1) & 1023;
      black_box(coalescer.get_with(&ctx, &i, || Ok(0)).unwrap())
    })
  });
  group.finish();
}

// --- Coalesced Miss ---
// Every thread misses the same fresh key at once; one of them computes.
fn bench_coalesced_miss(c: &mut Criterion) {
  let mut group = c.benchmark_group("CoalescedMiss");
  for concurrency in [2usize, 8, 32] {
    group.throughput(Throughput::Elements(concurrency as u64));
    group.bench_with_input(
      BenchmarkId::from_parameter(concurrency),
      &concurrency,
      |b, &concurrency| {
        b.iter_custom(|iters| {
          let coalescer = new_coalescer();
          let fetches = Arc::new(AtomicUsize::new(0));
          let mut total = Duration::ZERO;

          for key in 0..iters {
            let barrier = Arc::new(Barrier::new(concurrency));
            let start = Instant::now();
            thread::scope(|s| {
              for _ in 0..concurrency {
                let barrier = barrier.clone();
                let coalescer = &coalescer;
                let fetches = &fetches;
                s.spawn(move || {
                  barrier.wait();
                  coalescer
                    .get_with(&Context::background(), &key, || {
                      fetches.fetch_add(1, Ordering::Relaxed);
                      thread::sleep(Duration::from_micros(50));
                      Ok(key)
                    })
                    .unwrap()
                });
              }
            });
            total += start.elapsed();
          }

          black_box(fetches.load(Ordering::Relaxed));
          total
        })
      },
    );
  }
  group.finish();
}

criterion_group!(benches, bench_hit, bench_coalesced_miss);
criterion_main!(benches);
