//! Error types for the Bazaar pricing engine
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

/// Result type alias using BazaarError
pub type Result<T> = std::result::Result<T, BazaarError>;

/// Unified error type for Bazaar operations
#[derive(Debug, Error)]
pub enum BazaarError {
    // Catalog errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    // Ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    // State store errors
    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    // Pricing errors
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BazaarError {
    /// Whether the failure came from an external data source and clears up on its own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BazaarError::Ledger(_)
                | BazaarError::Store(StoreError::Unavailable(_))
                | BazaarError::Store(StoreError::Query(_))
        )
    }
}

/// Price catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog has no items")]
    Empty,

    #[error("Duplicate item id: {0}")]
    DuplicateItem(String),

    #[error("Invalid base price for {item}: {base_price} (must be positive and finite)")]
    InvalidBasePrice { item: String, base_price: f64 },

    #[error("Invalid multiplier bounds for {item}: min {min_mult}, max {max_mult} (need 0 < min < 1 <= max)")]
    InvalidBounds {
        item: String,
        min_mult: f64,
        max_mult: f64,
    },
}

/// Ledger query errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Ledger query failed: {0}")]
    Query(String),
}

/// State store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store query failed: {0}")]
    Query(String),

    /// The backend lacks a write primitive the configured strategy needs
    #[error("Store capability missing: {0}")]
    Capability(String),

    #[error("Corrupt stored row for {item}: {reason}")]
    Corrupt { item: String, reason: String },
}

/// Pricing computation errors
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("Non-finite {field} for item {item}: {value}")]
    NonFinite {
        item: String,
        field: &'static str,
        value: f64,
    },

    #[error("Invalid cycle input: {0}")]
    InvalidInput(String),

    #[error("Price book does not match catalog: {expected} items expected, {actual} present")]
    BookMismatch { expected: usize, actual: usize },
}

// Implement From for common external error types
impl From<serde_json::Error> for BazaarError {
    fn from(err: serde_json::Error) -> Self {
        BazaarError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for BazaarError {
    fn from(err: std::io::Error) -> Self {
        BazaarError::Internal(err.to_string())
    }
}

impl From<anyhow::Error> for BazaarError {
    fn from(err: anyhow::Error) -> Self {
        BazaarError::Internal(err.to_string())
    }
}
