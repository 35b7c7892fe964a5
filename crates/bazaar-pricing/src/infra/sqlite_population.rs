//! SQLite online-population source
//!
//! The host keeps one row per connected player in `online_sessions`. The count
//! is refreshed in the background so `online_players()` stays a plain atomic
//! read when a cycle is triggered.

use bazaar_common::{LedgerError, PopulationSource, SharedPopulation};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS online_sessions (
    player_id TEXT PRIMARY KEY,
    connected_at INTEGER NOT NULL
);
";

pub struct SqlitePopulation {
    conn: Arc<Mutex<Connection>>,
    online: SharedPopulation,
}

impl SqlitePopulation {
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
        conn.busy_timeout(Duration::from_secs(5)).map_err(session_err)?;
        conn.execute_batch(SCHEMA).map_err(session_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            online: SharedPopulation::default(),
        })
    }

    pub fn session_started(&self, player_id: &str, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO online_sessions (player_id, connected_at) VALUES (?1, ?2)",
                params![player_id, at.timestamp_millis()],
            )
            .map_err(session_err)?;
        Ok(())
    }

    pub fn session_ended(&self, player_id: &str) -> Result<(), LedgerError> {
        self.conn
            .lock()
            .execute(
                "DELETE FROM online_sessions WHERE player_id = ?1",
                params![player_id],
            )
            .map_err(session_err)?;
        Ok(())
    }

    /// Re-count online sessions and cache the result
    pub async fn refresh(&self) -> Result<u32, LedgerError> {
        let conn = Arc::clone(&self.conn);

        let count = tokio::task::spawn_blocking(move || {
            conn.lock()
                .query_row("SELECT COUNT(*) FROM online_sessions", [], |row| row.get::<_, i64>(0))
                .map_err(session_err)
        })
        .await
        .map_err(|e| LedgerError::Unavailable(format!("session task failed: {}", e)))??;

        let online = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
        self.online.set(online);
        Ok(online)
    }

    /// Refresh every `every` until the handle is aborted. A failed refresh keeps the last count.
    pub fn spawn_refresh(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                match self.refresh().await {
                    Ok(online) => debug!(online, "Refreshed online population"),
                    Err(e) => warn!(error = %e, "Failed to refresh online population, keeping last count"),
                }
            }
        })
    }
}

impl PopulationSource for SqlitePopulation {
    fn online_players(&self) -> u32 {
        self.online.online_players()
    }
}

fn session_err(err: rusqlite::Error) -> LedgerError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) | Some(ErrorCode::CannotOpen) => {
            LedgerError::Unavailable(err.to_string())
        }
        _ => LedgerError::Query(err.to_string()),
    }
}
