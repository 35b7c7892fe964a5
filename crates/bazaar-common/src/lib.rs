//! # Bazaar Common
//!
//! Shared types, errors, and port traits for the Bazaar shop pricing engine.
//!
//! ## Core Types
//!
//! - [`ItemId`]: identifier of a priced shop item
//! - [`EmaRecord`]: persisted smoothing state for one item
//!
//! ## Ports
//!
//! The pricing core talks to the outside world through three narrow traits:
//!
//! - [`LedgerQuery`]: aggregate currency injection and per-item sinks over a time window
//! - [`StateStore`]: load and upsert persisted EMA multipliers
//! - [`PopulationSource`]: the host's current online player count

pub mod error;
pub mod ports;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{BazaarError, CatalogError, LedgerError, PricingError, Result, StoreError};
pub use ports::{
    ledger::LedgerQuery,
    population::{PopulationSource, SharedPopulation},
    store::{StateStore, UpsertStrategy},
};
pub use types::{item::ItemId, record::EmaRecord};

/// Bazaar version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// EMA multiplier assigned to items with no persisted history
pub const COLD_START_EMA: f64 = 1.0;
