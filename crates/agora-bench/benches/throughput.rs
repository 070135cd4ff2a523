//! Throughput benchmarks for Agora.
//!
//! These benchmarks measure how fast the hub registers connections and
//! fans events out to outbound queues.

use agora_bench::{bench_config, chat, post, runtime};
use agora_core::Hub;
use agora_protocol::UserId;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Instant;

/// Benchmark register + unregister of one connection.
fn bench_registration(c: &mut Criterion) {
    let rt = runtime();
    let hub = rt.block_on(async { Hub::start(bench_config()).unwrap() });

    let mut group = c.benchmark_group("registration");

    group.bench_function("anonymous", |b| {
        b.iter(|| {
            let (conn, _rx) = hub.register(None).unwrap();
            hub.evict(black_box(conn.id()))
        });
    });

    group.bench_function("with_presence", |b| {
        let mut user = 0u64;
        b.iter(|| {
            user += 1;
            let (conn, _rx) = hub.register(Some(UserId(user))).unwrap();
            hub.evict(black_box(conn.id()))
        });
    });

    group.finish();
    rt.block_on(hub.shutdown());
}

/// Benchmark broadcast fan-out, from publish until every queue has a copy.
fn bench_fanout(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("fanout");

    for size in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let hub = rt.block_on(async { Hub::start(bench_config()).unwrap() });
            let mut queues: Vec<_> = (0..size).map(|_| hub.register(None).unwrap().1).collect();

            b.iter_custom(|iters| {
                rt.block_on(async {
                    let start = Instant::now();
                    for i in 0..iters {
                        hub.publish(post(i)).unwrap();
                        for queue in &mut queues {
                            black_box(queue.recv().await);
                        }
                    }
                    start.elapsed()
                })
            });

            rt.block_on(hub.shutdown());
        });
    }

    group.finish();
}

/// Benchmark direct delivery to a user with several connections.
fn bench_direct(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("direct");

    for devices in [1usize, 4].iter() {
        group.throughput(Throughput::Elements(*devices as u64));
        group.bench_with_input(BenchmarkId::new("devices", devices), devices, |b, &devices| {
            let hub = rt.block_on(async { Hub::start(bench_config()).unwrap() });
            let mut queues: Vec<_> = (0..devices)
                .map(|_| hub.register(Some(UserId(2))).unwrap().1)
                .collect();
            for queue in &mut queues {
                // Presence notices from registration.
                while queue.try_recv().is_ok() {}
            }
            let message = chat(1, 2, 256);

            b.iter_custom(|iters| {
                rt.block_on(async {
                    let start = Instant::now();
                    for _ in 0..iters {
                        hub.send_to_user(UserId(2), message.clone()).unwrap();
                        for queue in &mut queues {
                            black_box(queue.recv().await);
                        }
                    }
                    start.elapsed()
                })
            });

            rt.block_on(hub.shutdown());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_registration, bench_fanout, bench_direct);
criterion_main!(benches);
