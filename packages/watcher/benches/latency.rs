//! Latency benchmarks for the per-operation hot path
//!
//! Every `custom_json` on the chain passes the id filter; authorized pings are
//! also decoded. Both should stay far below the 3 second block interval.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Benchmark operation id filtering
fn bench_filter_operation_id(c: &mut Criterion) {
    use podping_watcher::OperationFilter;

    let filter = OperationFilter::default();

    c.bench_function("filter_watched_id", |b| {
        b.iter(|| black_box(filter.is_watched(black_box("pp_podcast_update"))))
    });

    c.bench_function("filter_unwatched_id", |b| {
        b.iter(|| black_box(filter.is_watched(black_box("sm_market_rental"))))
    });
}

/// Benchmark publisher authorization lookup
fn bench_authorization(c: &mut Criterion) {
    use podping_watcher::AuthorizationSet;

    let allowed = AuthorizationSet::new((0..500).map(|i| format!("podping.server{:03}", i)));
    let publishers = vec!["podping.server250".to_string()];

    c.bench_function("authorization_intersects", |b| {
        b.iter(|| black_box(allowed.intersects(black_box(publishers.as_slice()))))
    });
}

/// Benchmark payload decoding
fn bench_decode_ping(c: &mut Criterion) {
    use podping_watcher::decode;

    let iris = concat!(
        r#"{"version":"1.0","medium":"podcast","reason":"update","sessionId":5,"timestampNs":1,"#,
        r#""iris":["https://feeds.example.com/a.xml","https://feeds.example.com/b.xml","#,
        r#""https://feeds.example.com/c.xml"]}"#
    );
    let legacy = concat!(
        r#"{"version":"0.3","num_urls":1,"reason":"feed_update","#,
        r#""urls":["https://feeds.example.com/a.xml"]}"#
    );

    c.bench_function("decode_iris_ping", |b| {
        b.iter(|| black_box(decode(black_box(iris)).unwrap()))
    });

    c.bench_function("decode_legacy_ping", |b| {
        b.iter(|| black_box(decode(black_box(legacy)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_filter_operation_id,
    bench_authorization,
    bench_decode_ping
);

criterion_main!(benches);
