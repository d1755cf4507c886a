//! Performance benchmarks for the read broker.
//!
//! These benchmarks measure the cost of the broker's critical section under
//! the two hot paths: a read arriving with no waiter (pool insert) and a
//! wait arriving with a read already pending (immediate claim).
//!
//! # Key Metrics
//!
//! - **Throughput**: submit/claim operations per second
//! - **Latency**: time spent inside one broker operation
//!
//! # Run Benchmarks
//!
//! ```sh
//! # Run all broker benchmarks
//! cargo bench --bench broker_bench
//!
//! # Compare against a saved baseline
//! cargo bench --bench broker_bench -- --save-baseline before
//! # ... edit code ...
//! cargo bench --bench broker_bench -- --baseline before
//! ```

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use tapgate_broker::{BrokerConfig, ReadBroker};
use tapgate_core::{CardId, SessionId};

/// Benchmark submit followed by explicit consume (no waiter involved).
fn bench_submit_consume(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");

    let mut group = c.benchmark_group("broker_submit_consume");
    group.throughput(Throughput::Elements(1));

    group.bench_function("submit_then_consume", |b| {
        let broker = ReadBroker::new(BrokerConfig::default());
        let card = CardId::new("BENCH-CARD-0001").expect("card id");
        b.iter(|| {
            runtime.block_on(async {
                broker.submit_read(black_box(card.clone()), None).await;
                black_box(broker.consume_card(&card).await)
            })
        });
    });

    group.finish();
}

/// Benchmark the immediate-claim path of `wait_for_card`.
fn bench_immediate_claim(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");

    let mut group = c.benchmark_group("broker_immediate_claim");
    group.throughput(Throughput::Elements(1));

    group.bench_function("submit_then_wait", |b| {
        let broker = ReadBroker::new(BrokerConfig::default());
        let card = CardId::new("BENCH-CARD-0001").expect("card id");
        let session = SessionId::new("bench-session").expect("session id");
        b.iter(|| {
            runtime.block_on(async {
                broker.submit_read(black_box(card.clone()), None).await;
                black_box(
                    broker
                        .wait_for_card(&session, Duration::from_secs(1))
                        .await
                        .expect("wait"),
                )
            })
        });
    });

    group.finish();
}

/// Benchmark the stats snapshot with a populated pool.
fn bench_stats(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");

    let mut group = c.benchmark_group("broker_stats");
    group.throughput(Throughput::Elements(1));

    group.bench_function("stats_100_pending", |b| {
        let broker = ReadBroker::new(BrokerConfig::default());
        runtime.block_on(async {
            for i in 0..100 {
                let card = CardId::new(&format!("BENCH-CARD-{i:04}")).expect("card id");
                broker.submit_read(card, None).await;
            }
        });
        b.iter(|| runtime.block_on(async { black_box(broker.stats().await) }));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_submit_consume,
    bench_immediate_claim,
    bench_stats
);
criterion_main!(benches);
