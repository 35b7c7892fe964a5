//! Storage and ledger adapters
//!
//! In-memory implementations back tests and embedded hosts; the SQLite
//! implementations back the standalone service.

pub mod memory_ledger;
pub mod memory_store;
pub mod sqlite_ledger;
pub mod sqlite_population;
pub mod sqlite_store;

pub use memory_ledger::{InMemoryLedger, LedgerEntry, LedgerEntryKind};
pub use memory_store::InMemoryStateStore;
pub use sqlite_ledger::SqliteLedger;
pub use sqlite_population::SqlitePopulation;
pub use sqlite_store::{SqliteStateStore, StrategyPreference};
