//! Benchmarks for the per-datagram hot path
//!
//! Covers header and car telemetry decoding plus the full ingestion decision
//! (sampling, bounds check, decode) on full-grid car telemetry datagrams.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use paddock::packet::{decode_header, decode_telemetry_at};
use paddock::test_utils::full_grid_datagram;
use paddock::{BroadcastHub, Ingestor, SampleInterval};
use std::hint::black_box;

fn bench_decode(c: &mut Criterion) {
    let datagram = full_grid_datagram(120, 19);

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(datagram.len() as u64));

    group.bench_function("header", |b| b.iter(|| decode_header(black_box(&datagram))));

    group.bench_function("player_car_telemetry", |b| {
        b.iter(|| decode_telemetry_at(black_box(&datagram), black_box(19)))
    });

    group.finish();
}

fn bench_ingest_process(c: &mut Criterion) {
    let datagrams: Vec<Vec<u8>> = (0..1000).map(|frame| full_grid_datagram(frame, 0)).collect();

    let mut group = c.benchmark_group("ingest");
    group.throughput(Throughput::Elements(datagrams.len() as u64));

    group.bench_function("process_1000_frames_every_2nd", |b| {
        b.iter(|| {
            let mut ingestor = Ingestor::new(BroadcastHub::new(), SampleInterval::default());
            for datagram in &datagrams {
                black_box(ingestor.process(black_box(datagram)));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_ingest_process);
criterion_main!(benches);
