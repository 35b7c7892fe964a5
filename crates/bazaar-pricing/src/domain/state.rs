//! Per-item engine state and the price book
//!
//! A [`PriceBook`] is an immutable snapshot of every item's [`ItemState`]. Each
//! pricing cycle produces a whole new book; nothing is edited in place, so a
//! reader holding a book always sees one consistent cycle.

use bazaar_common::{EmaRecord, ItemId, PricingError, COLD_START_EMA};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::catalog::{Catalog, Item};

/// Mutable pricing state of one item
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ItemState {
    /// Raw smoothed multiplier; only exposed as a price after clamping
    pub ema_multiplier: f64,
    /// Price shoppers pay, always inside the item's bounds
    pub current_price: f64,
    /// Price at the start of the cycle that produced this state
    pub previous_price: f64,
}

impl ItemState {
    /// State for an item with no persisted history
    pub fn cold(item: &Item) -> Self {
        Self {
            ema_multiplier: COLD_START_EMA,
            current_price: item.base_price(),
            previous_price: item.base_price(),
        }
    }

    /// State restored from a persisted multiplier
    pub fn warm(item: &Item, ema_multiplier: f64) -> Self {
        let price = item.clamp_price(ema_multiplier * item.base_price());
        Self {
            ema_multiplier,
            current_price: price,
            previous_price: price,
        }
    }
}

/// Outcome of reconciling persisted rows against the catalog at startup
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub warm: usize,
    pub cold: usize,
    /// Persisted rows for items no longer in the catalog
    pub orphaned: Vec<ItemId>,
    /// Catalog items whose persisted value was unusable
    pub rejected: Vec<ItemId>,
}

/// Snapshot of every item's state after a cycle
#[derive(Debug, Clone)]
pub struct PriceBook {
    catalog: Arc<Catalog>,
    states: Vec<ItemState>,
    cycle: u64,
    updated_at: Option<DateTime<Utc>>,
}

impl PriceBook {
    /// Every item cold-started
    pub fn cold(catalog: Arc<Catalog>) -> Self {
        let states = catalog.items().iter().map(ItemState::cold).collect();
        Self {
            catalog,
            states,
            cycle: 0,
            updated_at: None,
        }
    }

    /// Build the startup book: warm-start items with a persisted row, cold-start the rest.
    ///
    /// Duplicate rows for one item resolve to the last one seen.
    pub fn reconcile(catalog: Arc<Catalog>, persisted: &[EmaRecord]) -> (Self, ReconcileReport) {
        let mut report = ReconcileReport::default();
        let mut by_item: HashMap<&str, &EmaRecord> = HashMap::with_capacity(persisted.len());

        for record in persisted {
            if catalog.contains(record.item_id.as_str()) {
                by_item.insert(record.item_id.as_str(), record);
            } else if !report.orphaned.contains(&record.item_id) {
                report.orphaned.push(record.item_id.clone());
            }
        }

        let mut updated_at: Option<DateTime<Utc>> = None;
        let states = catalog
            .items()
            .iter()
            .map(|item| match by_item.get(item.id().as_str()) {
                Some(record) if record.ema_multiplier.is_finite() => {
                    report.warm += 1;
                    updated_at = updated_at.max(Some(record.updated_at));
                    ItemState::warm(item, record.ema_multiplier)
                }
                Some(record) => {
                    warn!(
                        item = %item.id(),
                        ema = record.ema_multiplier,
                        "Persisted EMA is not finite, cold-starting item"
                    );
                    report.rejected.push(item.id().clone());
                    report.cold += 1;
                    ItemState::cold(item)
                }
                None => {
                    debug!(item = %item.id(), "No persisted EMA, cold-starting item");
                    report.cold += 1;
                    ItemState::cold(item)
                }
            })
            .collect();

        let book = Self {
            catalog,
            states,
            cycle: 0,
            updated_at,
        };
        (book, report)
    }

    /// The next book in sequence, carrying new states for every item
    pub fn advance(&self, states: Vec<ItemState>, at: DateTime<Utc>) -> Result<Self, PricingError> {
        if states.len() != self.catalog.len() {
            return Err(PricingError::BookMismatch {
                expected: self.catalog.len(),
                actual: states.len(),
            });
        }

        Ok(Self {
            catalog: Arc::clone(&self.catalog),
            states,
            cycle: self.cycle + 1,
            updated_at: Some(at),
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// States aligned with `catalog().items()`
    pub fn states(&self) -> &[ItemState] {
        &self.states
    }

    pub fn state(&self, id: &str) -> Option<&ItemState> {
        self.catalog.position(id).map(|pos| &self.states[pos])
    }

    pub fn price(&self, id: &str) -> Option<f64> {
        self.state(id).map(|s| s.current_price)
    }

    pub fn ema_multiplier(&self, id: &str) -> Option<f64> {
        self.state(id).map(|s| s.ema_multiplier)
    }

    /// Items paired with their state, in catalog order
    pub fn entries(&self) -> impl Iterator<Item = (&Item, &ItemState)> {
        self.catalog.items().iter().zip(self.states.iter())
    }

    /// Number of completed cycles since startup
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn average_ema(&self) -> f64 {
        if self.states.is_empty() {
            return COLD_START_EMA;
        }
        self.states.iter().map(|s| s.ema_multiplier).sum::<f64>() / self.states.len() as f64
    }

    /// Rows to hand to the state store
    pub fn to_records(&self, at: DateTime<Utc>) -> Vec<EmaRecord> {
        self.entries()
            .map(|(item, state)| EmaRecord::new(item.id().clone(), state.ema_multiplier, at))
            .collect()
    }
}
