//! State store port

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::record::EmaRecord;

/// Persistence for per-item EMA multipliers
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load every persisted row. Items absent from the result have no history.
    async fn load_all(&self) -> Result<Vec<EmaRecord>, StoreError>;

    /// Upsert rows. Writing the same item twice leaves only the latest value.
    async fn save_all(&self, records: &[EmaRecord]) -> Result<(), StoreError>;
}

/// How a store realizes upsert on its backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertStrategy {
    /// The backend has an atomic insert-or-update primitive
    Native,
    /// Delete the batch's keys, then insert, inside one transaction
    DeleteThenInsert,
}

impl std::fmt::Display for UpsertStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpsertStrategy::Native => f.write_str("native"),
            UpsertStrategy::DeleteThenInsert => f.write_str("delete_then_insert"),
        }
    }
}
