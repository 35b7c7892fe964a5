//! End-to-end pricing cycle tests

use async_trait::async_trait;
use bazaar_common::{
    BazaarError, EmaRecord, ItemId, LedgerError, LedgerQuery, StateStore, StoreError,
};
use bazaar_pricing::domain::{Catalog, EngineParams, Item, SkipReason};
use bazaar_pricing::infra::{
    InMemoryLedger, InMemoryStateStore, SqliteLedger, SqliteStateStore, StrategyPreference,
};
use bazaar_pricing::{CycleOutcome, PricingService};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

const EPS: f64 = 1e-9;

fn catalog() -> Catalog {
    Catalog::new(vec![
        Item::new("iron_sword", 20.0, 0.5, 1.5).unwrap(),
        Item::new("bread", 2.0, 0.5, 2.0).unwrap(),
        Item::new("arrow", 0.5, 0.5, 2.0).unwrap(),
    ])
    .unwrap()
}

fn params() -> EngineParams {
    EngineParams {
        alpha: 0.3,
        k_hyper: 0.5,
        max_change_per_cycle: 0.1,
        expected_injection: 1_000.0,
        min_population_threshold: 5,
        ..EngineParams::default()
    }
}

/// Ledger that fails on demand
#[derive(Default)]
struct FlakyLedger {
    inner: InMemoryLedger,
    down: AtomicBool,
    queries: AtomicU32,
}

#[async_trait]
impl LedgerQuery for FlakyLedger {
    async fn total_injection(&self, since: DateTime<Utc>) -> Result<f64, LedgerError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("connection refused".to_string()));
        }
        self.inner.total_injection(since).await
    }

    async fn sinks_by_item(&self, since: DateTime<Utc>) -> Result<HashMap<ItemId, f64>, LedgerError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("connection refused".to_string()));
        }
        self.inner.sinks_by_item(since).await
    }
}

/// Store whose writes fail on demand
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStateStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    /// Writes fail with a permanent error instead of a transient one
    broken: AtomicBool,
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn load_all(&self) -> Result<Vec<EmaRecord>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk gone".to_string()));
        }
        self.inner.load_all().await
    }

    async fn save_all(&self, records: &[EmaRecord]) -> Result<(), StoreError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(StoreError::Capability("table is read-only".to_string()));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Query("database is full".to_string()));
        }
        self.inner.save_all(records).await
    }
}

async fn start(ledger: Arc<dyn LedgerQuery>, store: Arc<dyn StateStore>) -> PricingService {
    PricingService::builder(catalog(), params())
        .ledger(ledger)
        .store(store)
        .start()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_cold_start_first_cycle_matches_worked_example() {
    let store = Arc::new(InMemoryStateStore::new());
    let svc = start(Arc::new(InMemoryLedger::new()), store.clone()).await;

    assert_eq!(svc.price("iron_sword"), Some(20.0));

    let outcome = svc.run_cycle(10).await;
    assert!(outcome.is_completed());

    assert!((svc.price("iron_sword").unwrap() - 18.0).abs() < EPS);
    assert!((svc.ema_multiplier("iron_sword") - 0.9).abs() < EPS);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_cold_start_moves_ema_toward_response() {
    let svc = start(Arc::new(InMemoryLedger::new()), Arc::new(InMemoryStateStore::new())).await;
    let target = 1.0 / (1.0 + params().k_hyper);

    let mut previous = 1.0;
    for _ in 0..5 {
        svc.run_cycle(10).await;
        let ema = svc.ema_multiplier("bread");
        assert!(ema < previous);
        assert!(ema > target);
        previous = ema;
    }
}

#[tokio::test]
async fn test_demand_from_ledger_drives_prices() {
    let ledger = Arc::new(InMemoryLedger::new());
    let now = Utc::now();
    ledger.record_injection(800.0, now);
    // bread expects 1.0 of sinks per window; 5.0 saturates the sales rate
    ledger.record_sink("bread", 5.0, now);
    // iron_sword expects 10.0; exactly at equilibrium
    ledger.record_sink("iron_sword", 10.0, now);

    let svc = start(ledger, Arc::new(InMemoryStateStore::new())).await;
    let report = match svc.run_cycle(20).await {
        CycleOutcome::Completed(report) => report,
        other => panic!("unexpected outcome: {:?}", other),
    };

    assert!((svc.price("iron_sword").unwrap() - 20.0).abs() < EPS);
    assert!((svc.price("bread").unwrap() - 2.2).abs() < EPS);
    assert!(svc.price("arrow").unwrap() < 0.5);
    assert_eq!(report.summary.total_sinks, 15.0);
    assert_eq!(report.summary.injection.per_player, 40.0);
}

#[tokio::test]
async fn test_skip_cycle_leaves_everything_untouched() {
    let ledger = Arc::new(FlakyLedger::default());
    let store = Arc::new(InMemoryStateStore::new());
    let svc = start(ledger.clone(), store.clone()).await;

    let before = svc.snapshot();
    let outcome = svc.run_cycle(4).await;

    assert!(matches!(
        outcome,
        CycleOutcome::Skipped(SkipReason::BelowPopulationThreshold { population: 4, threshold: 5 })
    ));
    assert_eq!(ledger.queries.load(Ordering::SeqCst), 0);
    assert_eq!(store.write_count(), 0);
    assert!(Arc::ptr_eq(&before, &svc.snapshot()));
}

#[tokio::test]
async fn test_ledger_outage_skips_without_mutation() {
    let ledger = Arc::new(FlakyLedger::default());
    let store = Arc::new(InMemoryStateStore::new());
    let svc = start(ledger.clone(), store.clone()).await;

    svc.run_cycle(10).await;
    let committed = svc.price("iron_sword");

    ledger.down.store(true, Ordering::SeqCst);
    let outcome = svc.run_cycle(10).await;
    assert!(matches!(outcome, CycleOutcome::Failed(BazaarError::Ledger(_))));
    assert_eq!(svc.price("iron_sword"), committed);
    assert_eq!(store.write_count(), 1);
    assert_eq!(svc.metrics().cycles_failed.get(), 1);

    // recovers on the next cycle
    ledger.down.store(false, Ordering::SeqCst);
    assert!(svc.run_cycle(10).await.is_completed());
    assert_eq!(svc.snapshot().cycle(), 2);
}

#[tokio::test]
async fn test_non_finite_ledger_total_abandons_cycle() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.record_injection(f64::NAN, Utc::now());
    let store = Arc::new(InMemoryStateStore::new());
    let svc = start(ledger, store.clone()).await;
    let before = svc.snapshot();

    let outcome = svc.run_cycle(10).await;

    assert!(matches!(outcome, CycleOutcome::Failed(BazaarError::Pricing(_))));
    assert_eq!(store.write_count(), 0);
    assert_eq!(svc.snapshot().cycle(), 0);
    assert!(Arc::ptr_eq(&before, &svc.snapshot()));
    assert_eq!(svc.price("iron_sword"), Some(20.0));
    assert_eq!(svc.metrics().cycles_failed.get(), 1);
    assert_eq!(svc.metrics().cycles_completed.get(), 0);
}

#[tokio::test]
async fn test_persist_failure_keeps_prices_live() {
    let store = Arc::new(FlakyStore::default());
    store.fail_writes.store(true, Ordering::SeqCst);
    let svc = start(Arc::new(InMemoryLedger::new()), store.clone()).await;

    let outcome = svc.run_cycle(10).await;
    let report = outcome.report().unwrap();

    assert!(!report.persisted);
    assert!((svc.price("iron_sword").unwrap() - 18.0).abs() < EPS);
    assert!(store.inner.is_empty());
    assert_eq!(svc.metrics().persist_failures.get(), 1);
}

#[tokio::test]
async fn test_permanent_persist_failure_still_publishes() {
    let store = Arc::new(FlakyStore::default());
    store.broken.store(true, Ordering::SeqCst);
    let svc = start(Arc::new(InMemoryLedger::new()), store.clone()).await;

    for cycle in 1..=2 {
        let outcome = svc.run_cycle(10).await;
        let report = outcome.report().unwrap();
        assert!(!report.persisted);
        assert_eq!(report.cycle, cycle);
    }
    assert!(store.inner.is_empty());
    assert_eq!(svc.metrics().persist_failures.get(), 2);
    assert_eq!(svc.metrics().cycles_failed.get(), 0);
}

#[tokio::test]
async fn test_store_read_failure_fails_startup() {
    let store = Arc::new(FlakyStore::default());
    store.fail_reads.store(true, Ordering::SeqCst);

    let result = PricingService::builder(catalog(), params())
        .ledger(Arc::new(InMemoryLedger::new()))
        .store(store)
        .start()
        .await;

    assert!(matches!(result, Err(BazaarError::Store(StoreError::Unavailable(_)))));
}

#[tokio::test]
async fn test_warm_start_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bazaar.db");
    let path = path.to_str().unwrap();

    {
        let store = Arc::new(SqliteStateStore::open(path, StrategyPreference::Auto).unwrap());
        let ledger = Arc::new(SqliteLedger::open(path).unwrap());
        let svc = start(ledger, store).await;
        svc.run_cycle(10).await;
        svc.run_cycle(10).await;
    }

    let store = Arc::new(SqliteStateStore::open(path, StrategyPreference::DeleteInsert).unwrap());
    let ledger = Arc::new(SqliteLedger::open(path).unwrap());
    let svc = start(ledger, store).await;

    // 0.3 * 2/3 + 0.7 * 0.9
    let expected_ema = 0.2 + 0.63;
    assert!((svc.ema_multiplier("iron_sword") - expected_ema).abs() < 1e-9);
    assert!((svc.price("iron_sword").unwrap() - expected_ema * 20.0).abs() < 1e-9);
    assert!(svc.last_update().is_some());
}

#[tokio::test]
async fn test_orphaned_rows_are_ignored() {
    let now = Utc::now();
    let store = Arc::new(InMemoryStateStore::with_records(vec![
        EmaRecord::new("retired_helmet", 1.4, now),
        EmaRecord::new("arrow", 1.2, now),
    ]));
    let svc = start(Arc::new(InMemoryLedger::new()), store).await;

    assert!(svc.price("retired_helmet").is_none());
    assert!((svc.price("arrow").unwrap() - 0.6).abs() < EPS);
    assert!(!svc.item_ids().contains("retired_helmet"));
}

#[tokio::test]
async fn test_sqlite_ledger_end_to_end() {
    let ledger = Arc::new(SqliteLedger::in_memory().unwrap());
    let store = Arc::new(SqliteStateStore::in_memory(StrategyPreference::Auto).unwrap());
    let now = Utc::now();
    ledger.record_injection("quest", 500.0, now).unwrap();
    ledger.record_sink("iron_sword", 10.0, now).unwrap();

    let svc = start(ledger, store.clone()).await;
    assert!(svc.run_cycle(10).await.is_completed());

    assert!((svc.price("iron_sword").unwrap() - 20.0).abs() < EPS);
    let rows = store.load_all().await.unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_readers_see_consistent_books_during_cycles() {
    let svc = start(Arc::new(InMemoryLedger::new()), Arc::new(InMemoryStateStore::new())).await;

    let mut readers = Vec::new();
    for _ in 0..4 {
        let svc = svc.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..200 {
                let book = svc.snapshot();
                // every item in one book comes from the same cycle
                let emas: Vec<f64> = book.states().iter().map(|s| s.ema_multiplier).collect();
                assert!(emas.windows(2).all(|w| (w[0] - w[1]).abs() < EPS));
                tokio::task::yield_now().await;
            }
        }));
    }

    for _ in 0..20 {
        svc.run_cycle(10).await;
        tokio::task::yield_now().await;
    }
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(svc.snapshot().cycle(), 20);
}

#[tokio::test]
async fn test_triggers_never_overlap() {
    let svc = start(Arc::new(InMemoryLedger::new()), Arc::new(InMemoryStateStore::new())).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = svc.clone();
            tokio::spawn(async move { svc.run_cycle(10).await })
        })
        .collect();

    let mut completed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            CycleOutcome::Completed(_) => completed += 1,
            CycleOutcome::Skipped(SkipReason::AlreadyRunning) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert!(completed >= 1);
    assert_eq!(svc.snapshot().cycle(), completed);
}
