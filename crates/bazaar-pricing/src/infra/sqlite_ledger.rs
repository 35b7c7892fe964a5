//! SQLite currency ledger
//!
//! Reads the host's `economy_transactions` log. Writers are included so a
//! standalone deployment (and the tests) can feed the log directly.

use async_trait::async_trait;
use bazaar_common::{ItemId, LedgerError, LedgerQuery};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS economy_transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL CHECK (kind IN ('injection', 'sink')),
    source TEXT,
    item_id TEXT,
    amount REAL NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_economy_transactions_created_at
    ON economy_transactions (created_at);
";

pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    pub fn open(path: &str) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)
            .map_err(|e| LedgerError::Unavailable(format!("failed to open {}: {}", path, e)))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LedgerError::Unavailable(format!("failed to open in-memory db: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(ledger_err)?;
        conn.execute_batch(SCHEMA).map_err(ledger_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Append a currency-creating transaction (`source` e.g. "kill", "farming")
    pub fn record_injection(&self, source: &str, amount: f64, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO economy_transactions (kind, source, amount, created_at)
                 VALUES ('injection', ?1, ?2, ?3)",
                params![source, amount, at.timestamp_millis()],
            )
            .map_err(ledger_err)?;
        Ok(())
    }

    /// Append a shop purchase of `item`
    pub fn record_sink(&self, item: &str, amount: f64, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO economy_transactions (kind, item_id, amount, created_at)
                 VALUES ('sink', ?1, ?2, ?3)",
                params![item, amount, at.timestamp_millis()],
            )
            .map_err(ledger_err)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerQuery for SqliteLedger {
    #[instrument(skip(self))]
    async fn total_injection(&self, since: DateTime<Utc>) -> Result<f64, LedgerError> {
        let conn = Arc::clone(&self.conn);
        let since = since.timestamp_millis();

        tokio::task::spawn_blocking(move || {
            let total: Option<f64> = conn
                .lock()
                .query_row(
                    "SELECT SUM(amount) FROM economy_transactions
                     WHERE kind = 'injection' AND created_at >= ?1",
                    params![since],
                    |row| row.get(0),
                )
                .optional()
                .map_err(ledger_err)?
                .flatten();
            Ok::<_, LedgerError>(total.unwrap_or(0.0))
        })
        .await
        .map_err(|e| LedgerError::Unavailable(format!("ledger task failed: {}", e)))?
    }

    #[instrument(skip(self))]
    async fn sinks_by_item(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashMap<ItemId, f64>, LedgerError> {
        let conn = Arc::clone(&self.conn);
        let since = since.timestamp_millis();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let mut stmt = conn
                .prepare(
                    "SELECT item_id, SUM(amount) FROM economy_transactions
                     WHERE kind = 'sink' AND item_id IS NOT NULL AND created_at >= ?1
                     GROUP BY item_id",
                )
                .map_err(ledger_err)?;
            let rows = stmt
                .query_map(params![since], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })
                .map_err(ledger_err)?;

            let mut sinks = HashMap::new();
            for row in rows {
                let (item, amount) = row.map_err(ledger_err)?;
                sinks.insert(ItemId::from(item), amount);
            }
            Ok::<_, LedgerError>(sinks)
        })
        .await
        .map_err(|e| LedgerError::Unavailable(format!("ledger task failed: {}", e)))?
    }
}

fn ledger_err(err: rusqlite::Error) -> LedgerError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) | Some(ErrorCode::CannotOpen) => {
            LedgerError::Unavailable(err.to_string())
        }
        _ => LedgerError::Query(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_aggregates_over_window() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let now = Utc::now();
        let old = now - ChronoDuration::hours(1);

        ledger.record_injection("kill", 500.0, old).unwrap();
        ledger.record_injection("kill", 120.0, now).unwrap();
        ledger.record_injection("farming", 30.0, now).unwrap();
        ledger.record_sink("bread", 4.0, old).unwrap();
        ledger.record_sink("bread", 6.0, now).unwrap();
        ledger.record_sink("bread", 2.0, now).unwrap();
        ledger.record_sink("arrow", 1.5, now).unwrap();

        let since = now - ChronoDuration::minutes(10);
        assert_eq!(ledger.total_injection(since).await.unwrap(), 150.0);

        let sinks = ledger.sinks_by_item(since).await.unwrap();
        assert_eq!(sinks.len(), 2);
        assert_eq!(sinks.get("bread"), Some(&8.0));
        assert_eq!(sinks.get("arrow"), Some(&1.5));
    }

    #[tokio::test]
    async fn test_no_rows_is_zero() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let since = Utc::now();
        assert_eq!(ledger.total_injection(since).await.unwrap(), 0.0);
        assert!(ledger.sinks_by_item(since).await.unwrap().is_empty());
    }
}
