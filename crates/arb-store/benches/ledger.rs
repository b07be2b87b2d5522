//! Ledger write and startup-load cost.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use arb_core::{Pose, Timestamp};
use arb_store::{HostedAnchor, Store};

fn fill(store: &Store, n: usize) {
    for i in 0..n {
        let anchor = HostedAnchor::new(
            &format!("anchor-{i}"),
            &format!("ua-{i:016x}"),
            Some(3600),
            Pose::from_position([i as f64, 0.0, -1.0]),
            Timestamp(1_000 + i as u64),
        );
        store.record_hosted(&anchor).unwrap();
    }
}

fn bench_record(c: &mut Criterion) {
    c.bench_function("record_hosted", |b| {
        let store = Store::open_in_memory().unwrap();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let anchor = HostedAnchor::new(
                &format!("a{}", i % 512),
                "ua-bench",
                None,
                Pose::identity(),
                Timestamp(i),
            );
            store.record_hosted(black_box(&anchor)).unwrap();
        });
    });
}

fn bench_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_hosted");
    for n in [10, 1000] {
        let store = Store::open_in_memory().unwrap();
        fill(&store, n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &store, |b, store| {
            b.iter(|| black_box(store.list_hosted(Timestamp(1_500)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_record, bench_list);
criterion_main!(benches);
