//! Latency benchmarks for Agora.
//!
//! These benchmarks drive whole connections through the in-memory
//! transport, so both pumps and the dispatcher are on the measured path.

use agora_bench::{bench_config, chat, runtime};
use agora_core::Hub;
use agora_protocol::{codec, Envelope, EventKind, UserId};
use agora_transport::memory;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Instant;

/// Benchmark client → hub → client chat delivery.
fn bench_chat_round_trip(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("chat_latency");

    for len in [32usize, 1024] {
        group.bench_function(format!("{}B", len), |b| {
            let hub = rt.block_on(async { Hub::start(bench_config()).unwrap() });
            let (alice, mut bob) = rt.block_on(async {
                let (r1, w1, alice) = memory::pair(1024);
                let (r2, w2, mut bob) = memory::pair(1024);
                hub.attach(r1, w1, Some(UserId(1))).unwrap();
                hub.attach(r2, w2, Some(UserId(2))).unwrap();
                // Bob's own online notice.
                bob.recv_frame().await;
                (alice, bob)
            });
            let frame = codec::encode(&chat(1, 2, len)).unwrap();

            b.iter_custom(|iters| {
                rt.block_on(async {
                    let start = Instant::now();
                    for _ in 0..iters {
                        alice.send(frame.clone()).await;
                        black_box(bob.recv_frame().await);
                    }
                    start.elapsed()
                })
            });

            rt.block_on(hub.shutdown());
        });
    }

    group.finish();
}

/// Benchmark the application-level ping → pong exchange.
fn bench_ping(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("ping_latency");

    group.bench_function("anonymous", |b| {
        let hub = rt.block_on(async { Hub::start(bench_config()).unwrap() });
        let mut peer = rt.block_on(async {
            let (reader, writer, peer) = memory::pair(1024);
            hub.attach(reader, writer, None).unwrap();
            peer
        });
        let ping = codec::encode(&Envelope::bare(EventKind::Ping)).unwrap();

        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = Instant::now();
                for _ in 0..iters {
                    peer.send(ping.clone()).await;
                    black_box(peer.recv_frame().await);
                }
                start.elapsed()
            })
        });

        rt.block_on(hub.shutdown());
    });

    group.finish();
}

criterion_group!(benches, bench_chat_round_trip, bench_ping);
criterion_main!(benches);
