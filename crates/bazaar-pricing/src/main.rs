//! Bazaar pricing service binary
//!
//! Runs the pricing loop against a local SQLite database and serves the
//! read-only admin API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use prometheus::Registry;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bazaar_pricing::{
    config::PricingConfig,
    http::{self, AppState},
    infra::{SqliteLedger, SqliteStateStore},
    PricingMetrics, PricingService, Scheduler, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Bazaar pricing service v{}", VERSION);

    let config = PricingConfig::load()?;
    config.validate()?;
    let catalog = config.build_catalog()?;
    info!(
        items = catalog.len(),
        interval_secs = config.schedule.interval_seconds,
        window_minutes = config.schedule.window_minutes,
        "Loaded configuration"
    );

    let store = SqliteStateStore::open(&config.storage.sqlite_path, config.storage.upsert_strategy)?
        .with_batch_size(config.storage.batch_size);
    let ledger = SqliteLedger::open(&config.storage.sqlite_path)?;

    let registry = Registry::new();
    let metrics = Arc::new(PricingMetrics::new()?);
    metrics.register(&registry)?;

    let service = PricingService::builder(catalog, config.engine_params())
        .ledger(Arc::new(ledger))
        .store(Arc::new(store))
        .window(config.schedule.window())
        .metrics(metrics)
        .start()
        .await?;

    let population = config.population_feed().await?;
    let scheduler = Scheduler::spawn(service.clone(), population.source(), config.schedule.interval());

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
    let app = http::router(AppState { service, registry });
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Admin API listening on {}", addr);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    scheduler.shutdown().await;
    population.stop();
    info!("Shutting down Bazaar pricing service");
    Ok(())
}
