//! Prometheus metrics for the pricing loop

use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, Registry};

pub struct PricingMetrics {
    pub cycles_completed: IntCounter,
    pub cycles_skipped: IntCounter,
    pub cycles_failed: IntCounter,
    pub persist_failures: IntCounter,
    pub cycle_duration_seconds: Histogram,
    pub average_ema: Gauge,
    pub notable_changes: IntCounter,
}

impl PricingMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            cycles_completed: IntCounter::new(
                "bazaar_pricing_cycles_completed_total",
                "Pricing cycles committed",
            )?,
            cycles_skipped: IntCounter::new(
                "bazaar_pricing_cycles_skipped_total",
                "Pricing cycles skipped by the population guard or re-entry",
            )?,
            cycles_failed: IntCounter::new(
                "bazaar_pricing_cycles_failed_total",
                "Pricing cycles abandoned on ledger or computation errors",
            )?,
            persist_failures: IntCounter::new(
                "bazaar_pricing_persist_failures_total",
                "Committed cycles whose state could not be persisted",
            )?,
            cycle_duration_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "bazaar_pricing_cycle_duration_seconds",
                    "Wall time from trigger to commit",
                )
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            )?,
            average_ema: Gauge::new(
                "bazaar_pricing_average_ema",
                "Mean EMA multiplier across the catalog",
            )?,
            notable_changes: IntCounter::new(
                "bazaar_pricing_notable_changes_total",
                "Per-item price moves above the notice threshold",
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.cycles_completed.clone()))?;
        registry.register(Box::new(self.cycles_skipped.clone()))?;
        registry.register(Box::new(self.cycles_failed.clone()))?;
        registry.register(Box::new(self.persist_failures.clone()))?;
        registry.register(Box::new(self.cycle_duration_seconds.clone()))?;
        registry.register(Box::new(self.average_ema.clone()))?;
        registry.register(Box::new(self.notable_changes.clone()))?;
        Ok(())
    }
}
