//! Bazaar pricing configuration
//!
//! Layered: built-in defaults, then an optional TOML file (`bazaar.toml`, or
//! the path in `BAZAAR_CONFIG`), then `BAZAAR_*` environment variables with
//! `__` between nested keys, e.g. `BAZAAR_ENGINE__ALPHA=0.25`.

use anyhow::{Context, Result};
use bazaar_common::{BazaarError, CatalogError, LedgerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Catalog, EngineParams, Item};
use crate::infra::{SqlitePopulation, StrategyPreference};
use crate::service::PopulationFeed;

/// Default config file name, resolved relative to the working directory
const DEFAULT_CONFIG_FILE: &str = "bazaar.toml";

/// Pricing service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub engine: EngineSettings,
    pub schedule: ScheduleSettings,
    pub storage: StorageSettings,
    pub http: HttpSettings,
    pub population: PopulationSettings,
    /// Shop catalog
    pub items: Vec<ItemSettings>,
}

impl PricingConfig {
    /// Load from `.env`, the config file, and the environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let explicit = std::env::var("BAZAAR_CONFIG").ok().map(PathBuf::from);
        Self::load_layered(explicit.as_deref(), None)
    }

    /// Load from a TOML file without consulting the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::load_layered(Some(path), Some(config::Map::new()))
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .context("failed to parse configuration")?;
        settings
            .try_deserialize()
            .context("invalid configuration")
    }

    /// `env` replaces the process environment when given
    fn load_layered(path: Option<&Path>, env: Option<config::Map<String, String>>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path.to_path_buf()).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("BAZAAR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("failed to load configuration")?;

        settings
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Reject settings the service cannot start with
    pub fn validate(&self) -> std::result::Result<(), BazaarError> {
        self.engine.params.validate()?;

        let (min, max) = (self.engine.min_mult, self.engine.max_mult);
        if !(min > 0.0 && min < 1.0) || !(max >= 1.0 && max.is_finite()) {
            return Err(BazaarError::Config(format!(
                "default bounds must satisfy 0 < min_mult < 1 <= max_mult, got [{}, {}]",
                min, max
            )));
        }
        if self.schedule.interval_seconds == 0 {
            return Err(BazaarError::Config("schedule.interval_seconds must be > 0".to_string()));
        }
        if self.schedule.window_minutes == 0 {
            return Err(BazaarError::Config("schedule.window_minutes must be > 0".to_string()));
        }
        if self.storage.batch_size == 0 {
            return Err(BazaarError::Config("storage.batch_size must be > 0".to_string()));
        }
        match self.population.source {
            PopulationMode::Sqlite if self.population.refresh_seconds == 0 => {
                return Err(BazaarError::Config(
                    "population.refresh_seconds must be > 0".to_string(),
                ));
            }
            PopulationMode::Fixed
                if self.population.fixed_online < self.engine.params.min_population_threshold =>
            {
                return Err(BazaarError::Config(format!(
                    "population.fixed_online {} is below min_population_threshold {}, no cycle would ever run",
                    self.population.fixed_online, self.engine.params.min_population_threshold
                )));
            }
            _ => {}
        }

        self.build_catalog()?;
        Ok(())
    }

    /// Catalog from `items`, filling per-item bounds from the engine defaults
    pub fn build_catalog(&self) -> std::result::Result<Catalog, CatalogError> {
        let items = self
            .items
            .iter()
            .map(|item| {
                Item::new(
                    item.id.as_str(),
                    item.base_price,
                    item.min_mult.unwrap_or(self.engine.min_mult),
                    item.max_mult.unwrap_or(self.engine.max_mult),
                )
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Catalog::new(items)
    }

    pub fn engine_params(&self) -> EngineParams {
        self.engine.params.clone()
    }

    /// Population source for the scheduler. SQLite mode counts once before returning.
    pub async fn population_feed(&self) -> std::result::Result<PopulationFeed, LedgerError> {
        match self.population.source {
            PopulationMode::Fixed => Ok(PopulationFeed::fixed(self.population.fixed_online)),
            PopulationMode::Sqlite => {
                let sessions = SqlitePopulation::open(&self.storage.sqlite_path)?;
                PopulationFeed::refreshing(Arc::new(sessions), self.population.refresh_interval()).await
            }
        }
    }
}

/// Control-loop settings plus catalog-wide default bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(flatten)]
    pub params: EngineParams,
    /// Lower bound for items that don't set their own
    #[serde(default = "default_min_mult")]
    pub min_mult: f64,
    /// Upper bound for items that don't set their own
    #[serde(default = "default_max_mult")]
    pub max_mult: f64,
}

fn default_min_mult() -> f64 {
    0.5
}

fn default_max_mult() -> f64 {
    2.0
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            params: EngineParams::default(),
            min_mult: default_min_mult(),
            max_mult: default_max_mult(),
        }
    }
}

/// Cycle timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub interval_seconds: u64,
    /// Ledger lookback per cycle
    pub window_minutes: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 900,
            window_minutes: 15,
        }
    }
}

impl ScheduleSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes * 60)
    }
}

/// Where the online player count comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationMode {
    /// Count rows the host keeps in `online_sessions`
    #[default]
    Sqlite,
    /// A constant, for single-tenant or test deployments
    Fixed,
}

/// Online population settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationSettings {
    pub source: PopulationMode,
    /// Used when `source = "fixed"`
    pub fixed_online: u32,
    pub refresh_seconds: u64,
}

impl Default for PopulationSettings {
    fn default() -> Self {
        Self {
            source: PopulationMode::Sqlite,
            fixed_online: 0,
            refresh_seconds: 30,
        }
    }
}

impl PopulationSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_seconds)
    }
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Database holding both the price state and the transaction ledger
    pub sqlite_path: String,
    pub upsert_strategy: StrategyPreference,
    /// Rows per write batch
    pub batch_size: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "bazaar.db".to_string(),
            upsert_strategy: StrategyPreference::Auto,
            batch_size: crate::infra::sqlite_store::DEFAULT_BATCH_SIZE,
        }
    }
}

/// Admin HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

/// One catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSettings {
    pub id: String,
    pub base_price: f64,
    #[serde(default)]
    pub min_mult: Option<f64>,
    #[serde(default)]
    pub max_mult: Option<f64>,
}
