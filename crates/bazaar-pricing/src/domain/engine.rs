//! Pricing engine
//!
//! Turns one window of economy activity into new item prices:
//!
//! ```text
//! salesRate  = sinks / (basePrice × expectedSinkFactor)
//! hyperMult  = 1 / (1 + k × (1 − salesRate))
//! ema'       = α × hyperMult + (1 − α) × ema
//! price'     = clamp(step(ema' × basePrice, oldPrice), basePrice × [minMult, maxMult])
//! ```
//!
//! The engine is pure: it reads a [`PriceBook`] and returns the states of the
//! next one. Persistence and publication belong to the orchestrator.

use bazaar_common::{BazaarError, ItemId, PricingError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::catalog::Item;
use super::state::{ItemState, PriceBook};

/// Tunable constants of the control loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    /// EMA smoothing factor, in (0, 1)
    pub alpha: f64,
    /// Hyperbolic responsiveness constant
    pub k_hyper: f64,
    /// Largest fractional price move allowed per cycle (0.1 = 10%)
    pub max_change_per_cycle: f64,
    /// Baseline injection per window, used for outlier containment
    pub expected_injection: f64,
    /// Injection above `expected_injection × outlier_factor` is capped
    pub outlier_factor: f64,
    /// Expected sinks per item per window, as a fraction of base price
    pub expected_sink_factor: f64,
    /// Ceiling on the sales rate fed to the hyperbolic response
    pub max_sales_rate: f64,
    /// Relative move that triggers a per-item change notice
    pub notable_change_threshold: f64,
    /// Cycles with fewer players online are skipped
    pub min_population_threshold: u32,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            k_hyper: 0.5,
            max_change_per_cycle: 0.10,
            expected_injection: 10_000.0,
            outlier_factor: crate::DEFAULT_OUTLIER_FACTOR,
            expected_sink_factor: crate::DEFAULT_EXPECTED_SINK_FACTOR,
            max_sales_rate: 2.0,
            notable_change_threshold: crate::NOTABLE_CHANGE_THRESHOLD,
            min_population_threshold: 5,
        }
    }
}

impl EngineParams {
    /// Reject parameter sets the control loop cannot run with
    pub fn validate(&self) -> Result<(), BazaarError> {
        let fail = |msg: String| Err(BazaarError::Config(msg));

        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return fail(format!("alpha must be in (0, 1), got {}", self.alpha));
        }
        if !self.k_hyper.is_finite() || self.k_hyper < 0.0 {
            return fail(format!("k_hyper must be >= 0, got {}", self.k_hyper));
        }
        if !(self.max_change_per_cycle > 0.0 && self.max_change_per_cycle < 1.0) {
            return fail(format!(
                "max_change_per_cycle must be in (0, 1), got {}",
                self.max_change_per_cycle
            ));
        }
        if !self.expected_injection.is_finite() || self.expected_injection <= 0.0 {
            return fail(format!(
                "expected_injection must be positive, got {}",
                self.expected_injection
            ));
        }
        if !self.outlier_factor.is_finite() || self.outlier_factor < 1.0 {
            return fail(format!("outlier_factor must be >= 1, got {}", self.outlier_factor));
        }
        if !self.expected_sink_factor.is_finite() || self.expected_sink_factor <= 0.0 {
            return fail(format!(
                "expected_sink_factor must be positive, got {}",
                self.expected_sink_factor
            ));
        }
        if !self.max_sales_rate.is_finite() || self.max_sales_rate < 1.0 {
            return fail(format!("max_sales_rate must be >= 1, got {}", self.max_sales_rate));
        }
        // Keeps 1 + k(1 - salesRate) positive across the whole sales-rate range
        if self.k_hyper * (self.max_sales_rate - 1.0) >= 1.0 {
            return fail(format!(
                "k_hyper * (max_sales_rate - 1) must be < 1, got {}",
                self.k_hyper * (self.max_sales_rate - 1.0)
            ));
        }
        if !self.notable_change_threshold.is_finite() || self.notable_change_threshold <= 0.0 {
            return fail(format!(
                "notable_change_threshold must be positive, got {}",
                self.notable_change_threshold
            ));
        }
        Ok(())
    }
}

/// Economy activity observed over one window
#[derive(Debug, Clone, Default)]
pub struct CycleInputs {
    pub total_injection: f64,
    pub online_population: u32,
    /// Missing items count as zero sinks
    pub sinks: HashMap<ItemId, f64>,
}

/// Why a cycle did not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BelowPopulationThreshold { population: u32, threshold: u32 },
    AlreadyRunning,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::BelowPopulationThreshold {
                population,
                threshold,
            } => write!(f, "population {} below threshold {}", population, threshold),
            SkipReason::AlreadyRunning => f.write_str("a cycle is already in flight"),
        }
    }
}

/// Normalized injection figures for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InjectionReading {
    /// Injection as reported by the ledger
    pub raw: f64,
    /// Injection after outlier containment
    pub used: f64,
    pub capped: bool,
    pub per_player: f64,
}

/// Aggregates describing a computed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub online_population: u32,
    pub injection: InjectionReading,
    pub total_sinks: f64,
    pub items: usize,
    pub average_ema: f64,
}

/// A price move large enough to report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceChange {
    pub item_id: ItemId,
    pub old_price: f64,
    pub new_price: f64,
    /// Signed relative move, 0.12 = +12%
    pub change: f64,
    pub base_price: f64,
}

/// States for the next price book plus what to report about them
#[derive(Debug, Clone)]
pub struct CycleComputation {
    /// Aligned with the catalog order of the input book
    pub states: Vec<ItemState>,
    pub summary: CycleSummary,
    pub notable_changes: Vec<PriceChange>,
}

/// What the engine decided for one cycle
#[derive(Debug, Clone)]
pub enum EngineDecision {
    Skipped(SkipReason),
    Computed(CycleComputation),
}

/// The control loop
#[derive(Debug, Clone)]
pub struct PricingEngine {
    params: EngineParams,
}

impl PricingEngine {
    pub fn new(params: EngineParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Population guard. Returns the skip reason when the cycle must not run.
    pub fn admit(&self, online_population: u32) -> Option<SkipReason> {
        let threshold = self.params.min_population_threshold;
        (online_population < threshold).then_some(SkipReason::BelowPopulationThreshold {
            population: online_population,
            threshold,
        })
    }

    /// Cap injection at `expected × outlier_factor` and normalize per online player
    pub fn normalize_injection(&self, total_injection: f64, online_population: u32) -> InjectionReading {
        let raw = total_injection.max(0.0);
        let ceiling = self.params.expected_injection * self.params.outlier_factor;
        let capped = raw > ceiling;
        let used = if capped { ceiling } else { raw };
        let online = online_population.max(1) as f64;

        InjectionReading {
            raw,
            used,
            capped,
            per_player: used / online,
        }
    }

    /// Demand relative to expectation, in `[0, max_sales_rate]`
    pub fn sales_rate(&self, item: &Item, sinks: f64) -> f64 {
        let expected = item.base_price() * self.params.expected_sink_factor;
        if expected <= 0.0 {
            return 0.0;
        }
        (sinks.max(0.0) / expected).min(self.params.max_sales_rate)
    }

    /// `1 / (1 + k(1 - salesRate))`: 1 at equilibrium, below 1 under weak demand
    pub fn hyperbolic_multiplier(&self, sales_rate: f64) -> f64 {
        1.0 / (1.0 + self.params.k_hyper * (1.0 - sales_rate))
    }

    /// Limit the move from `old_price` to `max_change_per_cycle`
    pub fn bound_step(&self, old_price: f64, new_price: f64) -> f64 {
        if old_price <= 0.0 {
            return new_price;
        }
        let max_step = self.params.max_change_per_cycle;
        let delta = new_price - old_price;
        if delta.abs() / old_price > max_step {
            old_price * (1.0 + max_step.copysign(delta))
        } else {
            new_price
        }
    }

    /// Run one cycle against `book`.
    ///
    /// Every item is computed from the same pre-cycle book, so item order never
    /// affects the result.
    pub fn evaluate(
        &self,
        book: &PriceBook,
        inputs: &CycleInputs,
    ) -> Result<EngineDecision, PricingError> {
        if let Some(reason) = self.admit(inputs.online_population) {
            return Ok(EngineDecision::Skipped(reason));
        }

        if !inputs.total_injection.is_finite() {
            return Err(PricingError::InvalidInput(format!(
                "total injection is {}",
                inputs.total_injection
            )));
        }
        let injection = self.normalize_injection(inputs.total_injection, inputs.online_population);

        let mut states = Vec::with_capacity(book.states().len());
        let mut notable_changes = Vec::new();
        let mut total_sinks = 0.0;

        for (item, state) in book.entries() {
            let sinks = inputs.sinks.get(item.id().as_str()).copied().unwrap_or(0.0);
            if !sinks.is_finite() {
                return Err(PricingError::NonFinite {
                    item: item.id().to_string(),
                    field: "sinks",
                    value: sinks,
                });
            }
            total_sinks += sinks.max(0.0);

            let next = self.step_item(item, state, sinks)?;

            let change = (next.current_price - state.current_price) / state.current_price;
            if change.abs() > self.params.notable_change_threshold {
                notable_changes.push(PriceChange {
                    item_id: item.id().clone(),
                    old_price: state.current_price,
                    new_price: next.current_price,
                    change,
                    base_price: item.base_price(),
                });
            }

            states.push(next);
        }

        let average_ema = if states.is_empty() {
            bazaar_common::COLD_START_EMA
        } else {
            states.iter().map(|s| s.ema_multiplier).sum::<f64>() / states.len() as f64
        };

        Ok(EngineDecision::Computed(CycleComputation {
            summary: CycleSummary {
                online_population: inputs.online_population,
                injection,
                total_sinks,
                items: states.len(),
                average_ema,
            },
            states,
            notable_changes,
        }))
    }

    fn step_item(&self, item: &Item, state: &ItemState, sinks: f64) -> Result<ItemState, PricingError> {
        let old_price = state.current_price;

        let sales_rate = self.sales_rate(item, sinks);
        let hyper = self.hyperbolic_multiplier(sales_rate);
        let alpha = self.params.alpha;
        let ema = alpha * hyper + (1.0 - alpha) * state.ema_multiplier;
        if !ema.is_finite() {
            return Err(PricingError::NonFinite {
                item: item.id().to_string(),
                field: "ema_multiplier",
                value: ema,
            });
        }

        let candidate = self.bound_step(old_price, ema * item.base_price());
        let price = item.clamp_price(candidate);
        if !price.is_finite() {
            return Err(PricingError::NonFinite {
                item: item.id().to_string(),
                field: "current_price",
                value: price,
            });
        }

        Ok(ItemState {
            ema_multiplier: ema,
            current_price: price,
            previous_price: old_price,
        })
    }
}
