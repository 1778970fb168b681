//! Pipeline benchmark suite
//!
//! Decoder throughput across read sizes, plus the full decode/enrich/publish
//! path into a null sink.
//!
//! Run with: `cargo bench -p sluice-pipeline`

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use sluice_pipeline::{
    EnrichmentDb, GrowthPolicy, Pipeline, PipelineConfig, Session, SessionIdentity,
    SharedEnrichment, feed, flush,
};
use sluice_sinks::NullSink;

/// Concatenated records, each roughly 80 bytes
fn create_stream(records: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(records * 96);
    for i in 0..records {
        let line = format!(
            r#"{{"id":{},"client_mac":"00:1a:2b:3c:4d:{:02x}","values":[1,2,3],"ok":true}}"#,
            i,
            i % 256
        );
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
    }
    out
}

fn create_pipeline() -> Pipeline {
    let db: EnrichmentDb = r#"{
        "uuids": {"10.0.0.1": {"site": "lab", "rack": 4}},
        "topics": {"sluice": {"partition_key": "client_mac", "partition_algo": "mac"}}
    }"#
    .parse()
    .unwrap();
    Pipeline::new(
        PipelineConfig::default(),
        SharedEnrichment::new(db),
        Arc::new(NullSink::new()),
    )
}

/// Benchmark decoding with the stream split into fixed-size reads
fn bench_decode_chunked(c: &mut Criterion) {
    let stream = create_stream(1000);

    let mut group = c.benchmark_group("decode_chunked");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for chunk in [64, 512, 4096, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut session =
                    Session::new(SessionIdentity::client("bench"), GrowthPolicy::default());
                let mut values = 0;
                for piece in stream.chunks(chunk) {
                    values += feed(&mut session, piece).unwrap().values.len();
                }
                values += flush(&mut session).0.values.len();
                black_box(values)
            });
        });
    }

    group.finish();
}

/// Benchmark a value delivered one byte at a time
fn bench_decode_bytewise(c: &mut Criterion) {
    let stream = create_stream(10);

    let mut group = c.benchmark_group("decode_bytewise");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("10_records", |b| {
        b.iter(|| {
            let mut session =
                Session::new(SessionIdentity::client("bench"), GrowthPolicy::default());
            let mut values = 0;
            for byte in stream.chunks(1) {
                values += feed(&mut session, byte).unwrap().values.len();
            }
            black_box(values)
        });
    });

    group.finish();
}

/// Benchmark the full path: decode, enrich, serialize, publish
fn bench_pipeline_process(c: &mut Criterion) {
    let pipeline = create_pipeline();

    let mut group = c.benchmark_group("pipeline_process");

    for records in [1, 10, 100, 1000] {
        let stream = create_stream(records);
        group.throughput(Throughput::Elements(records as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(records),
            &stream,
            |b, stream| {
                b.iter(|| {
                    let mut session = pipeline.open_session(SessionIdentity::client("10.0.0.1"));
                    pipeline.process(&mut session, stream);
                    pipeline.finish(&mut session);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark enrichment lookups, hit and miss
fn bench_enrich(c: &mut Criterion) {
    let db: EnrichmentDb = r#"{"uuids": {"10.0.0.1": {"site": "lab", "rack": 4}}}"#
        .parse()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(r#"{"id":1,"ok":true}"#).unwrap();

    let mut group = c.benchmark_group("enrich");

    group.bench_function("hit", |b| {
        b.iter(|| {
            let mut v = value.clone();
            black_box(db.enrich(&mut v, "10.0.0.1"))
        });
    });

    group.bench_function("miss", |b| {
        b.iter(|| {
            let mut v = value.clone();
            black_box(db.enrich(&mut v, "10.0.0.2"))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_decode_chunked,
    bench_decode_bytewise,
    bench_pipeline_process,
    bench_enrich,
);

criterion_main!(benches);
