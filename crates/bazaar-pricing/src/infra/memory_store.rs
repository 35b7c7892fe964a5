//! In-memory state store
//!
//! Uses DashMap for concurrent access. Inserts replace by key, so upsert is native.

use async_trait::async_trait;
use bazaar_common::types::record::last_write_wins;
use bazaar_common::{EmaRecord, ItemId, StateStore, StoreError};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    rows: DashMap<ItemId, EmaRecord>,
    writes: AtomicU64,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with rows, as if persisted by an earlier run
    pub fn with_records(records: Vec<EmaRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.rows.insert(record.item_id.clone(), record);
        }
        store
    }

    pub fn get(&self, id: &str) -> Option<EmaRecord> {
        self.rows.get(id).map(|r| r.clone())
    }

    /// Number of `save_all` calls served
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load_all(&self) -> Result<Vec<EmaRecord>, StoreError> {
        Ok(self.rows.iter().map(|r| r.value().clone()).collect())
    }

    async fn save_all(&self, records: &[EmaRecord]) -> Result<(), StoreError> {
        for record in last_write_wins(records) {
            self.rows.insert(record.item_id.clone(), record);
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
