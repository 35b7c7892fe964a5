//! Bazaar - adaptive shop pricing
//!
//! Recomputes shop prices once per cycle from the currency that entered the
//! economy (injection) and the currency players spent on each item (sinks).
//!
//! ## Control loop
//!
//! For every catalog item, each cycle:
//!
//! ```text
//! salesRate  = min(sinks / (basePrice × expectedSinkFactor), maxSalesRate)
//! hyperMult  = 1 / (1 + k × (1 − salesRate))
//! ema        = α × hyperMult + (1 − α) × ema
//! price      = clamp(step(ema × basePrice), basePrice × minMult, basePrice × maxMult)
//! ```
//!
//! where `step` limits the move from the previous price to `maxChangePerCycle`.
//! Cycles are skipped while fewer than `minPopulationThreshold` players are online.
//!
//! ## Components
//!
//! - [`domain`]: catalog, price book, and the pure engine
//! - [`service`]: orchestrator, scheduler, metrics
//! - [`infra`]: in-memory and SQLite ledger/state adapters
//! - [`http`]: read-only admin API

pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod service;

pub use domain::{Catalog, EngineParams, Item, PriceBook, PricingEngine, SkipReason};
pub use service::{CycleOutcome, CycleReport, PricingMetrics, PricingService, Scheduler};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Injection above `expected_injection × DEFAULT_OUTLIER_FACTOR` is capped
pub const DEFAULT_OUTLIER_FACTOR: f64 = 3.0;

/// Expected sinks per item per window, as a fraction of its base price
pub const DEFAULT_EXPECTED_SINK_FACTOR: f64 = 0.5;

/// Relative price move reported as a notable change
pub const NOTABLE_CHANGE_THRESHOLD: f64 = 0.10;
