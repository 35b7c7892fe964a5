//! Bazaar pricing benchmarks
//!
//! - Full engine pass over catalogs of increasing size
//! - Price book publication (snapshot swap) under a read

use bazaar_common::ItemId;
use bazaar_pricing::domain::{Catalog, CycleInputs, EngineParams, Item, PriceBook, PricingEngine};
use bazaar_pricing::service::PublishedBook;
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

fn catalog(size: usize) -> Arc<Catalog> {
    let items = (0..size)
        .map(|i| Item::new(format!("item_{}", i), 1.0 + (i % 500) as f64, 0.5, 2.0))
        .collect::<Result<Vec<_>, _>>()
        .expect("valid bench catalog");
    Arc::new(Catalog::new(items).expect("valid bench catalog"))
}

fn inputs(catalog: &Catalog) -> CycleInputs {
    CycleInputs {
        total_injection: 25_000.0,
        online_population: 120,
        sinks: catalog
            .items()
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 3 != 0)
            .map(|(i, item)| (ItemId::from(item.id().as_str()), (i % 40) as f64))
            .collect(),
    }
}

// ============ ENGINE BENCHMARKS ============

fn bench_engine_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    group.measurement_time(Duration::from_secs(10));

    let engine = PricingEngine::new(EngineParams::default());

    for size in [100usize, 1_000, 10_000].iter() {
        let catalog = catalog(*size);
        let book = PriceBook::cold(catalog.clone());
        let inputs = inputs(&catalog);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("evaluate", size), size, |b, _| {
            b.iter(|| engine.evaluate(black_box(&book), black_box(&inputs)))
        });
    }

    group.finish();
}

// ============ PUBLICATION BENCHMARKS ============

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");

    let catalog = catalog(1_000);
    let published = PublishedBook::new(PriceBook::cold(catalog.clone()));

    group.bench_function("advance_and_swap", |b| {
        b.iter(|| {
            let current = published.load();
            let next = current
                .advance(current.states().to_vec(), Utc::now())
                .expect("same catalog");
            published.publish(black_box(next))
        })
    });

    group.bench_function("read_price", |b| {
        b.iter(|| published.load().price(black_box("item_500")))
    });

    group.finish();
}

criterion_group!(benches, bench_engine_pass, bench_publish);
criterion_main!(benches);
