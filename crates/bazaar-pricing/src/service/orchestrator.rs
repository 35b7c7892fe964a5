//! Cycle orchestrator
//!
//! Owns the live price book and drives one pricing cycle per trigger:
//! sample population → query ledger → run engine → publish → persist.
//!
//! Readers go through [`PricingService`]'s read API and always see the last
//! committed book, whatever state the running cycle is in.

use bazaar_common::{
    BazaarError, ItemId, LedgerError, LedgerQuery, PopulationSource, Result, StateStore,
    COLD_START_EMA,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::metrics::PricingMetrics;
use super::published::PublishedBook;
use crate::domain::{
    Catalog, CycleInputs, CycleSummary, EngineDecision, EngineParams, PriceBook, PriceChange,
    PricingEngine, SkipReason,
};

/// Result of one trigger
#[derive(Debug)]
pub enum CycleOutcome {
    /// Prices were recomputed and published
    Completed(CycleReport),
    /// Nothing was read, computed, or written
    Skipped(SkipReason),
    /// Abandoned before any state changed
    Failed(BazaarError),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed(_))
    }

    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// What a committed cycle did
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub committed_at: DateTime<Utc>,
    pub summary: CycleSummary,
    pub notable_changes: Vec<PriceChange>,
    /// False when the store rejected the write; prices are live but not durable
    pub persisted: bool,
    pub duration_ms: u64,
}

/// Read-only diagnostics for operator tooling
#[derive(Debug, Clone, Serialize)]
pub struct EconomyReport {
    pub average_ema: f64,
    pub last_update: Option<DateTime<Utc>>,
    pub cycle: u64,
    pub items: Vec<ItemDiagnostics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemDiagnostics {
    pub item_id: ItemId,
    pub base_price: f64,
    pub ema_multiplier: f64,
    pub current_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Builder wiring the orchestrator to its ports
pub struct PricingServiceBuilder {
    catalog: Catalog,
    params: EngineParams,
    window: Duration,
    ledger: Option<Arc<dyn LedgerQuery>>,
    store: Option<Arc<dyn StateStore>>,
    metrics: Option<Arc<PricingMetrics>>,
}

impl PricingServiceBuilder {
    pub fn ledger(mut self, ledger: Arc<dyn LedgerQuery>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Ledger lookback window (default 15 minutes)
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn metrics(mut self, metrics: Arc<PricingMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate, load persisted state, and reconcile it against the catalog
    #[instrument(skip(self), fields(items = self.catalog.len()))]
    pub async fn start(self) -> Result<PricingService> {
        self.params.validate()?;

        let ledger = self
            .ledger
            .ok_or_else(|| BazaarError::Config("no ledger configured".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| BazaarError::Config("no state store configured".to_string()))?;
        let window = chrono::Duration::from_std(self.window)
            .map_err(|e| BazaarError::Config(format!("invalid ledger window: {}", e)))?;
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(
                PricingMetrics::new().map_err(|e| BazaarError::Internal(e.to_string()))?,
            ),
        };

        let persisted = store.load_all().await?;
        let (book, report) = PriceBook::reconcile(Arc::new(self.catalog), &persisted);

        if !report.orphaned.is_empty() {
            warn!(
                orphaned = ?report.orphaned,
                "Ignoring persisted state for items not in the catalog"
            );
        }
        info!(
            warm = report.warm,
            cold = report.cold,
            rejected = report.rejected.len(),
            "Reconciled pricing state"
        );
        metrics.average_ema.set(book.average_ema());

        Ok(PricingService {
            inner: Arc::new(ServiceInner {
                engine: PricingEngine::new(self.params),
                ledger,
                store,
                published: PublishedBook::new(book),
                window,
                metrics,
                cycle_lock: Mutex::new(()),
            }),
        })
    }
}

struct ServiceInner {
    engine: PricingEngine,
    ledger: Arc<dyn LedgerQuery>,
    store: Arc<dyn StateStore>,
    published: PublishedBook,
    window: chrono::Duration,
    metrics: Arc<PricingMetrics>,
    cycle_lock: Mutex<()>,
}

/// The pricing orchestrator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PricingService {
    inner: Arc<ServiceInner>,
}

impl PricingService {
    pub fn builder(catalog: Catalog, params: EngineParams) -> PricingServiceBuilder {
        PricingServiceBuilder {
            catalog,
            params,
            window: Duration::from_secs(15 * 60),
            ledger: None,
            store: None,
            metrics: None,
        }
    }

    /// Sample the population now, then run the cycle on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, population: &dyn PopulationSource) -> JoinHandle<CycleOutcome> {
        let online = population.online_players();
        let service = self.clone();
        tokio::spawn(async move { service.run_cycle(online).await })
    }

    /// Run one pricing cycle for an already-sampled population
    #[instrument(skip(self))]
    pub async fn run_cycle(&self, online_population: u32) -> CycleOutcome {
        let inner = &self.inner;

        let Ok(_guard) = inner.cycle_lock.try_lock() else {
            debug!("Pricing cycle already in flight, ignoring trigger");
            inner.metrics.cycles_skipped.inc();
            return CycleOutcome::Skipped(SkipReason::AlreadyRunning);
        };

        if let Some(reason) = inner.engine.admit(online_population) {
            info!(%reason, "Skipping pricing cycle");
            inner.metrics.cycles_skipped.inc();
            return CycleOutcome::Skipped(reason);
        }

        let started = Instant::now();
        let now = Utc::now();

        let inputs = match self.gather_inputs(online_population, now - inner.window).await {
            Ok(inputs) => inputs,
            Err(err) => {
                let err = BazaarError::from(err);
                if err.is_transient() {
                    warn!(error = %err, "Ledger unavailable, skipping pricing cycle");
                } else {
                    error!(error = %err, "Ledger query failed, skipping pricing cycle");
                }
                inner.metrics.cycles_failed.inc();
                return CycleOutcome::Failed(err);
            }
        };

        let book = inner.published.load();
        let computation = match inner.engine.evaluate(&book, &inputs) {
            Ok(EngineDecision::Computed(computation)) => computation,
            Ok(EngineDecision::Skipped(reason)) => {
                inner.metrics.cycles_skipped.inc();
                return CycleOutcome::Skipped(reason);
            }
            Err(err) => {
                error!(
                    error = %err,
                    population = online_population,
                    injection = inputs.total_injection,
                    sink_items = inputs.sinks.len(),
                    cycle = book.cycle(),
                    "Pricing computation failed, cycle abandoned"
                );
                inner.metrics.cycles_failed.inc();
                return CycleOutcome::Failed(err.into());
            }
        };

        let next = match book.advance(computation.states, now) {
            Ok(next) => next,
            Err(err) => {
                error!(error = %err, "Computed states do not fit the price book");
                inner.metrics.cycles_failed.inc();
                return CycleOutcome::Failed(err.into());
            }
        };
        let records = next.to_records(now);
        let committed = inner.published.publish(next);

        log_cycle(committed.cycle(), &computation.summary, &computation.notable_changes);

        let persisted = match inner.store.save_all(&records).await {
            Ok(()) => true,
            Err(err) => {
                let err = BazaarError::from(err);
                // prices are live but not durable either way
                if err.is_transient() {
                    warn!(error = %err, cycle = committed.cycle(), "Failed to persist pricing state, retrying next cycle");
                } else {
                    error!(error = %err, cycle = committed.cycle(), "Pricing state cannot be persisted");
                }
                inner.metrics.persist_failures.inc();
                false
            }
        };

        let elapsed = started.elapsed();
        inner.metrics.cycles_completed.inc();
        inner.metrics.cycle_duration_seconds.observe(elapsed.as_secs_f64());
        inner.metrics.average_ema.set(computation.summary.average_ema);
        inner
            .metrics
            .notable_changes
            .inc_by(computation.notable_changes.len() as u64);

        CycleOutcome::Completed(CycleReport {
            cycle: committed.cycle(),
            committed_at: now,
            summary: computation.summary,
            notable_changes: computation.notable_changes,
            persisted,
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    async fn gather_inputs(
        &self,
        online_population: u32,
        since: DateTime<Utc>,
    ) -> std::result::Result<CycleInputs, LedgerError> {
        let ledger = &self.inner.ledger;
        let (total_injection, sinks) =
            tokio::try_join!(ledger.total_injection(since), ledger.sinks_by_item(since))?;

        Ok(CycleInputs {
            total_injection,
            online_population,
            sinks,
        })
    }

    /// Current price of an item, `None` if it is not in the catalog
    pub fn price(&self, item: &str) -> Option<f64> {
        self.inner.published.load().price(item)
    }

    pub fn base_price(&self, item: &str) -> Option<f64> {
        self.inner
            .published
            .load()
            .catalog()
            .get(item)
            .map(|i| i.base_price())
    }

    /// Current EMA multiplier, 1.0 for unknown items
    pub fn ema_multiplier(&self, item: &str) -> f64 {
        self.inner
            .published
            .load()
            .ema_multiplier(item)
            .unwrap_or(COLD_START_EMA)
    }

    pub fn item_ids(&self) -> BTreeSet<ItemId> {
        self.inner.published.load().catalog().ids()
    }

    /// When prices last changed, `None` before any committed or persisted cycle
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.inner.published.load().updated_at()
    }

    /// The whole live book, consistent across items
    pub fn snapshot(&self) -> Arc<PriceBook> {
        self.inner.published.load()
    }

    pub fn economy_report(&self) -> EconomyReport {
        let book = self.inner.published.load();
        EconomyReport {
            average_ema: book.average_ema(),
            last_update: book.updated_at(),
            cycle: book.cycle(),
            items: book
                .entries()
                .map(|(item, state)| ItemDiagnostics {
                    item_id: item.id().clone(),
                    base_price: item.base_price(),
                    ema_multiplier: state.ema_multiplier,
                    current_price: state.current_price,
                    min_price: item.floor_price(),
                    max_price: item.ceiling_price(),
                })
                .collect(),
        }
    }

    pub fn metrics(&self) -> &Arc<PricingMetrics> {
        &self.inner.metrics
    }
}

fn log_cycle(cycle: u64, summary: &CycleSummary, changes: &[PriceChange]) {
    let injection = &summary.injection;
    if injection.capped {
        warn!(
            raw = injection.raw,
            used = injection.used,
            "Injection above outlier ceiling, capped for this cycle"
        );
    }

    info!(
        cycle,
        population = summary.online_population,
        injection = injection.used,
        injection_per_player = injection.per_player,
        total_sinks = summary.total_sinks,
        items = summary.items,
        average_ema = summary.average_ema,
        "Pricing cycle committed"
    );

    for change in changes {
        info!(
            item = %change.item_id,
            old_price = change.old_price,
            new_price = change.new_price,
            change_pct = change.change * 100.0,
            base_price = change.base_price,
            "Significant price change"
        );
    }
}
