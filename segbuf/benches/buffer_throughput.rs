//! Write/read throughput benchmarks

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use segbuf::{AccessLevel, BufferConfig, Dispatcher, Participant};
use std::hint::black_box;

const ITEMS: u64 = 10_000;

fn quiet_config() -> BufferConfig {
    BufferConfig {
        prune_interval_ms: 3_600_000,
        ..BufferConfig::default()
    }
}

/// Cost of one full produce-then-consume cycle over a fresh dispatcher.
fn bench_pipeline(c: &mut Criterion) {
    c.bench_function("write_read_10k", |b| {
        b.iter_batched(
            || {
                let dispatcher = Dispatcher::with_config(quiet_config()).unwrap();
                let pair = Participant::make_pair("sink", "source");
                (dispatcher, pair)
            },
            |(dispatcher, (reader, writer))| {
                for value in 0..ITEMS {
                    dispatcher.write(value, &writer).unwrap();
                }
                let mut sum = 0u64;
                for _ in 0..ITEMS {
                    sum += dispatcher.read(&reader).unwrap();
                }
                black_box(sum)
            },
            BatchSize::LargeInput,
        );
    });
}

/// Read cost over a pre-filled buffer, fresh reader per pass.
fn bench_read(c: &mut Criterion) {
    let dispatcher = Dispatcher::with_config(quiet_config()).unwrap();
    let writer = Participant::make(Some("source"), AccessLevel::WRITE);
    for value in 0..ITEMS {
        dispatcher.write(value, &writer).unwrap();
    }

    c.bench_function("read_10k_fresh_reader", |b| {
        b.iter_batched(
            || Participant::make(Some("sink"), AccessLevel::READ),
            |reader| {
                let mut sum = 0u64;
                for _ in 0..ITEMS {
                    sum += dispatcher.read(&reader).unwrap();
                }
                dispatcher.release(&reader).unwrap();
                black_box(sum)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Batched appends through a write hook versus item-by-item writes.
fn bench_hook(c: &mut Criterion) {
    c.bench_function("hook_fill_10k", |b| {
        b.iter_batched(
            || {
                let dispatcher = Dispatcher::with_config(quiet_config()).unwrap();
                let writer = Participant::make(Some("source"), AccessLevel::WRITE);
                (dispatcher, writer)
            },
            |(dispatcher, writer)| {
                let mut pushed = 0u64;
                while pushed < ITEMS {
                    let mut hook = dispatcher.write_hook(&writer).unwrap();
                    while hook.remaining() > 0 && pushed < ITEMS {
                        hook.try_push(pushed).unwrap();
                        pushed += 1;
                    }
                }
                black_box(pushed)
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_pipeline, bench_read, bench_hook);
criterion_main!(benches);
