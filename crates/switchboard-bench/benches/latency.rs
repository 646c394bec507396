//! Latency benchmarks for Switchboard.
//!
//! End-to-end routing latency through the hub and the signaling relay,
//! excluding socket I/O.

use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Instant;
use switchboard_core::{BroadcastHub, Registry, SignalRelay};

fn bench_broadcast_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_latency");

    group.bench_function("single_receiver", |b| {
        b.iter_custom(|iters| {
            let registry = Arc::new(Registry::new());
            let sender = registry.register().unwrap();
            let mut receiver = registry.register().unwrap();
            let hub = BroadcastHub::new(Arc::clone(&registry));

            let start = Instant::now();
            for _ in 0..iters {
                hub.publish(sender.id, vec![0u8; 64]).unwrap();
                let _ = receiver.outbox_rx.try_recv();
            }
            start.elapsed()
        });
    });

    group.bench_function("ten_receivers", |b| {
        b.iter_custom(|iters| {
            let registry = Arc::new(Registry::new());
            let sender = registry.register().unwrap();
            let mut receivers: Vec<_> = (0..10).map(|_| registry.register().unwrap()).collect();
            let hub = BroadcastHub::new(Arc::clone(&registry));

            let start = Instant::now();
            for _ in 0..iters {
                hub.publish(sender.id, vec![0u8; 64]).unwrap();
                for receiver in &mut receivers {
                    let _ = receiver.outbox_rx.try_recv();
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

fn bench_signal_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal_latency");

    group.bench_function("relay", |b| {
        b.iter_custom(|iters| {
            let registry = Arc::new(Registry::new());
            let mut target = registry.register().unwrap();
            registry.bind_peer(target.id, "callee").unwrap();
            let relay = SignalRelay::new(Arc::clone(&registry));

            let start = Instant::now();
            for _ in 0..iters {
                relay.relay("caller", "callee", vec![0u8; 256]).unwrap();
                let _ = target.outbox_rx.try_recv();
            }
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_broadcast_latency, bench_signal_latency);
criterion_main!(benches);
