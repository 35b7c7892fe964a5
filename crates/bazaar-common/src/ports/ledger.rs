//! Ledger query port
//!
//! The currency ledger is an append-only log of economy transactions owned by
//! the host. The pricing core only needs two aggregates over a time window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::LedgerError;
use crate::types::item::ItemId;

/// Read-only aggregate queries against the currency ledger.
///
/// A window with no rows is a valid zero result, never an error.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Sum of all currency-creating transactions since `since`, in price units
    async fn total_injection(&self, since: DateTime<Utc>) -> Result<f64, LedgerError>;

    /// Currency spent purchasing each item since `since`
    async fn sinks_by_item(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashMap<ItemId, f64>, LedgerError>;
}
