//! SQLite state store
//!
//! Persists one row per item in `shop_price_state`. The upsert strategy is fixed
//! when the store is opened: SQLite gained `ON CONFLICT ... DO UPDATE` in 3.24,
//! older engines get delete-then-insert per batch inside the write transaction.

use async_trait::async_trait;
use bazaar_common::types::record::last_write_wins;
use bazaar_common::{EmaRecord, StateStore, StoreError, UpsertStrategy};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// First SQLite release with native upsert
const UPSERT_MIN_VERSION: (u32, u32, u32) = (3, 24, 0);

/// Default rows per write batch, below SQLite's historic 999-parameter limit
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Which upsert strategy to use, as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPreference {
    /// Probe the engine version at open time
    #[default]
    Auto,
    /// Require native upsert; opening fails if the engine lacks it
    Native,
    /// Always delete-then-insert
    DeleteInsert,
}

pub struct SqliteStateStore {
    conn: Arc<Mutex<Connection>>,
    strategy: UpsertStrategy,
    batch_size: usize,
}

impl SqliteStateStore {
    /// Open (creating if needed) a store at `path`
    pub fn open(path: &str, preference: StrategyPreference) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("failed to open {}: {}", path, e)))?;
        Self::from_connection(conn, preference)
    }

    /// Store backed by a private in-memory database
    pub fn in_memory(preference: StrategyPreference) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("failed to open in-memory db: {}", e)))?;
        Self::from_connection(conn, preference)
    }

    fn from_connection(conn: Connection, preference: StrategyPreference) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(store_err)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS shop_price_state (
                item_id TEXT PRIMARY KEY,
                ema_multiplier REAL NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .map_err(store_err)?;

        let version: String = conn
            .query_row("SELECT sqlite_version()", [], |row| row.get(0))
            .map_err(store_err)?;
        let supports_upsert = parse_version(&version)
            .map(|v| v >= UPSERT_MIN_VERSION)
            .unwrap_or(false);

        let strategy = match preference {
            StrategyPreference::Auto if supports_upsert => UpsertStrategy::Native,
            StrategyPreference::Auto => UpsertStrategy::DeleteThenInsert,
            StrategyPreference::Native if !supports_upsert => {
                return Err(StoreError::Capability(format!(
                    "SQLite {} has no native upsert (needs 3.24.0)",
                    version
                )));
            }
            StrategyPreference::Native => UpsertStrategy::Native,
            StrategyPreference::DeleteInsert => UpsertStrategy::DeleteThenInsert,
        };

        info!(sqlite_version = %version, %strategy, "Opened SQLite state store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            strategy,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn strategy(&self) -> UpsertStrategy {
        self.strategy
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    #[instrument(skip(self))]
    async fn load_all(&self) -> Result<Vec<EmaRecord>, StoreError> {
        let conn = Arc::clone(&self.conn);

        let records = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let mut stmt = conn
                .prepare("SELECT item_id, ema_multiplier, updated_at FROM shop_price_state")
                .map_err(store_err)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(store_err)?;

            let mut records = Vec::new();
            for row in rows {
                let (item_id, ema, millis) = row.map_err(store_err)?;
                let updated_at =
                    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| StoreError::Corrupt {
                        item: item_id.clone(),
                        reason: format!("updated_at {} out of range", millis),
                    })?;
                records.push(EmaRecord::new(item_id, ema, updated_at));
            }
            Ok::<_, StoreError>(records)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))??;

        debug!(rows = records.len(), "Loaded persisted EMA rows");
        Ok(records)
    }

    #[instrument(skip(self, records), fields(rows = records.len(), strategy = %self.strategy))]
    async fn save_all(&self, records: &[EmaRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let rows = last_write_wins(records);
        let conn = Arc::clone(&self.conn);
        let strategy = self.strategy;
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            let tx = conn.transaction().map_err(store_err)?;
            for batch in rows.chunks(batch_size) {
                match strategy {
                    UpsertStrategy::Native => upsert_native(&tx, batch),
                    UpsertStrategy::DeleteThenInsert => delete_then_insert(&tx, batch),
                }
                .map_err(store_err)?;
            }
            tx.commit().map_err(store_err)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))??;

        debug!("Persisted EMA rows");
        Ok(())
    }
}

fn upsert_native(tx: &Transaction<'_>, batch: &[EmaRecord]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO shop_price_state (item_id, ema_multiplier, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(item_id) DO UPDATE SET
             ema_multiplier = excluded.ema_multiplier,
             updated_at = excluded.updated_at",
    )?;
    for record in batch {
        stmt.execute(params![
            record.item_id.as_str(),
            record.ema_multiplier,
            record.updated_at.timestamp_millis()
        ])?;
    }
    Ok(())
}

fn delete_then_insert(tx: &Transaction<'_>, batch: &[EmaRecord]) -> rusqlite::Result<()> {
    let placeholders = vec!["?"; batch.len()].join(", ");
    tx.execute(
        &format!("DELETE FROM shop_price_state WHERE item_id IN ({})", placeholders),
        params_from_iter(batch.iter().map(|r| r.item_id.as_str())),
    )?;

    let mut stmt = tx.prepare_cached(
        "INSERT INTO shop_price_state (item_id, ema_multiplier, updated_at) VALUES (?1, ?2, ?3)",
    )?;
    for record in batch {
        stmt.execute(params![
            record.item_id.as_str(),
            record.ema_multiplier,
            record.updated_at.timestamp_millis()
        ])?;
    }
    Ok(())
}

fn store_err(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) | Some(ErrorCode::CannotOpen) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Query(err.to_string()),
    }
}

/// Parse `"3.45.1"` into `(3, 45, 1)`
fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.trim().split('.').map(|p| p.parse::<u32>().ok());
    let major = parts.next()??;
    let minor = parts.next().flatten().unwrap_or(0);
    let patch = parts.next().flatten().unwrap_or(0);
    Some((major, minor, patch))
}
