//! Throughput benchmarks for Switchboard.
//!
//! These benchmarks measure raw registry operation rates and broadcast
//! fan-out across growing recipient counts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use switchboard_core::{BroadcastHub, Registry};

fn bench_registry_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    group.bench_function("register_unregister", |b| {
        let registry = Registry::new();
        b.iter(|| {
            let reg = registry.register().unwrap();
            registry.unregister(black_box(reg.id));
        });
    });

    group.bench_function("bind_peer", |b| {
        let registry = Registry::new();
        let reg = registry.register().unwrap();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            registry.bind_peer(reg.id, &format!("peer-{}", i)).unwrap();
        });
    });

    group.bench_function("lookup", |b| {
        let registry = Registry::new();
        let reg = registry.register().unwrap();
        registry.bind_peer(reg.id, "peer-0").unwrap();
        b.iter(|| registry.lookup(black_box("peer-0")));
    });

    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");

    for recipients in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(recipients as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(recipients),
            &recipients,
            |b, &n| {
                let registry = Arc::new(Registry::new());
                let sender = registry.register().unwrap();
                let mut receivers: Vec<_> =
                    (0..n).map(|_| registry.register().unwrap()).collect();
                let hub = BroadcastHub::new(Arc::clone(&registry));
                let payload = vec![0u8; 64];

                b.iter(|| {
                    let fanout = hub.publish(sender.id, black_box(payload.clone())).unwrap();
                    // Drain the outboxes so they never back up.
                    for receiver in &mut receivers {
                        let _ = receiver.outbox_rx.try_recv();
                    }
                    fanout.delivered
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_registry_ops, bench_fanout);
criterion_main!(benches);
