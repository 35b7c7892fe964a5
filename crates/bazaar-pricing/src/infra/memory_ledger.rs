//! In-memory currency ledger
//!
//! Append-only log of injection and sink events, queried by time window.

use async_trait::async_trait;
use bazaar_common::{ItemId, LedgerError, LedgerQuery};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// What a ledger entry records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntryKind {
    /// Currency created (kill rewards, farming, event payouts)
    Injection,
    /// Currency spent buying an item
    Sink(ItemId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub kind: LedgerEntryKind,
    /// Amount in price units
    pub amount: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_injection(&self, amount: f64, at: DateTime<Utc>) {
        self.entries.write().push(LedgerEntry {
            kind: LedgerEntryKind::Injection,
            amount,
            at,
        });
    }

    pub fn record_sink(&self, item: impl Into<ItemId>, amount: f64, at: DateTime<Utc>) {
        self.entries.write().push(LedgerEntry {
            kind: LedgerEntryKind::Sink(item.into()),
            amount,
            at,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl LedgerQuery for InMemoryLedger {
    async fn total_injection(&self, since: DateTime<Utc>) -> Result<f64, LedgerError> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| e.at >= since && e.kind == LedgerEntryKind::Injection)
            .map(|e| e.amount)
            .sum())
    }

    async fn sinks_by_item(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashMap<ItemId, f64>, LedgerError> {
        let mut sinks = HashMap::new();
        for entry in self.entries.read().iter().filter(|e| e.at >= since) {
            if let LedgerEntryKind::Sink(item) = &entry.kind {
                *sinks.entry(item.clone()).or_insert(0.0) += entry.amount;
            }
        }
        Ok(sinks)
    }
}
