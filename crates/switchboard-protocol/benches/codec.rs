//! Codec benchmarks for switchboard-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use switchboard_protocol::{codec, Frame};

fn bench_encode_broadcast(c: &mut Criterion) {
    let frame = Frame::broadcast(vec![0u8; 256]);

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(256));
    group.bench_function("broadcast_256B", |b| {
        b.iter(|| codec::encode(black_box(&frame)))
    });
    group.finish();
}

fn bench_encode_signal(c: &mut Criterion) {
    // Typical SDP offer size.
    let frame = Frame::signal_from("conn_2a", "peer-7", vec![0u8; 2048]);

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(2048));
    group.bench_function("signal_2KB", |b| {
        b.iter(|| codec::encode(black_box(&frame)))
    });
    group.finish();
}

fn bench_decode_signal(c: &mut Criterion) {
    let frame = Frame::signal_from("conn_2a", "peer-7", vec![0u8; 2048]);
    let encoded = codec::encode(&frame).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("signal_2KB", |b| {
        b.iter(|| codec::decode(black_box(&encoded)))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_encode_broadcast,
    bench_encode_signal,
    bench_decode_signal
);
criterion_main!(benches);
