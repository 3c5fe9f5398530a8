//! Performance benchmarks for the mediator core.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tempfile::TempDir;
use xds_mediator::{
    ChannelNotifier, DecodedMessage, MimeConfig, PullPointRegistry, SubscriptionService,
    SubscriptionStore,
};

const BOUNDARY: &str = "MIMEBoundary_bench";

fn content_type() -> String {
    format!("multipart/related; type=\"application/xop+xml\"; boundary=\"{BOUNDARY}\"")
}

fn build_message(attachments: usize, attachment_size: usize) -> Vec<u8> {
    let mut out = format!(
        "--{BOUNDARY}\r\nContent-Type: application/xop+xml; type=\"application/soap+xml\"\r\n\r\n\
         <Envelope><Body/></Envelope>"
    )
    .into_bytes();
    let payload = vec![b'x'; attachment_size];
    for i in 0..attachments {
        out.extend_from_slice(
            format!("\r\n--{BOUNDARY}\r\nContent-ID: <doc{i}>\r\n\r\n").as_bytes(),
        );
        out.extend_from_slice(&payload);
    }
    out.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    out
}

/// Benchmark decode with varying attachment counts
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let config = MimeConfig::default();

    for attachments in [1, 10, 50] {
        let raw = build_message(attachments, 16 * 1024);
        group.bench_with_input(
            BenchmarkId::new("attachments", attachments),
            &raw,
            |b, raw| {
                b.iter(|| {
                    black_box(DecodedMessage::decode(raw, &content_type(), &config).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark enrich of a decoded message
fn bench_enrich(c: &mut Criterion) {
    let raw = build_message(10, 64 * 1024);
    let decoded = DecodedMessage::decode(&raw, &content_type(), &MimeConfig::default()).unwrap();
    let enriched_soap = "<Envelope><Body><PatientId>ECID1</PatientId></Body></Envelope>";

    c.bench_function("enrich", |b| {
        b.iter(|| {
            black_box(decoded.enrich(enriched_soap).unwrap());
        });
    });
}

/// Benchmark fan-out with varying subscriber counts
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for subscribers in [10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let dir = TempDir::new().unwrap();
                let (notifier, handle) = ChannelNotifier::new(count * 2);
                let service = SubscriptionService::new(
                    Arc::new(SubscriptionStore::open(dir.path().join("subs.journal")).unwrap()),
                    Arc::new(PullPointRegistry::in_memory(None)),
                    Arc::new(notifier),
                );
                for i in 0..count {
                    service
                        .create_subscription(&format!("http://s{i}.example/notify"), None, None)
                        .unwrap();
                }

                b.iter(|| {
                    black_box(service.notify_new_document("doc1", "facilityA"));
                    handle.drain();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_enrich, bench_fan_out);

criterion_main!(benches);
