//! Periodic cycle trigger

use bazaar_common::{LedgerError, PopulationSource, SharedPopulation};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::orchestrator::{CycleOutcome, PricingService};
use crate::infra::SqlitePopulation;

/// Population source handed to the scheduler, plus its background refresher if any
pub struct PopulationFeed {
    source: Arc<dyn PopulationSource>,
    refresher: Option<JoinHandle<()>>,
}

impl PopulationFeed {
    pub fn fixed(online: u32) -> Self {
        Self {
            source: Arc::new(SharedPopulation::new(online)),
            refresher: None,
        }
    }

    /// Count sessions once, then keep the count fresh every `every`
    pub async fn refreshing(
        sessions: Arc<SqlitePopulation>,
        every: Duration,
    ) -> Result<Self, LedgerError> {
        let online = sessions.refresh().await?;
        info!(online, refresh_secs = every.as_secs(), "Tracking online population from sessions");

        let refresher = Arc::clone(&sessions).spawn_refresh(every);
        Ok(Self {
            source: sessions,
            refresher: Some(refresher),
        })
    }

    pub fn source(&self) -> Arc<dyn PopulationSource> {
        Arc::clone(&self.source)
    }

    pub fn stop(self) {
        if let Some(refresher) = self.refresher {
            refresher.abort();
        }
    }
}

/// Fires a pricing cycle every `interval` until shut down
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Start the timer loop. The first cycle runs one full interval after spawn.
    pub fn spawn(
        service: PricingService,
        population: Arc<dyn PopulationSource>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval() completes its first tick immediately
            timer.tick().await;

            info!(interval_secs = interval.as_secs(), "Pricing scheduler started");

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        match service.trigger(population.as_ref()).await {
                            Ok(CycleOutcome::Completed(report)) => {
                                debug!(cycle = report.cycle, persisted = report.persisted, "Scheduled cycle completed");
                            }
                            Ok(CycleOutcome::Skipped(reason)) => {
                                debug!(%reason, "Scheduled cycle skipped");
                            }
                            Ok(CycleOutcome::Failed(err)) => {
                                debug!(error = %err, "Scheduled cycle failed");
                            }
                            Err(e) => {
                                error!("Pricing cycle task aborted: {}", e);
                            }
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Pricing scheduler stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the timer and wait for an in-flight cycle to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!("Pricing scheduler task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Catalog, EngineParams, Item};
    use crate::infra::{InMemoryLedger, InMemoryStateStore};

    async fn service(store: Arc<InMemoryStateStore>) -> PricingService {
        let catalog = Catalog::new(vec![Item::new("sword", 20.0, 0.5, 1.5).unwrap()]).unwrap();
        PricingService::builder(
            catalog,
            EngineParams {
                min_population_threshold: 1,
                ..EngineParams::default()
            },
        )
        .ledger(Arc::new(InMemoryLedger::new()))
        .store(store)
        .start()
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_cycles_on_interval() {
        let store = Arc::new(InMemoryStateStore::new());
        let svc = service(store.clone()).await;
        let population = Arc::new(SharedPopulation::new(10));

        let scheduler = Scheduler::spawn(svc.clone(), population, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(svc.snapshot().cycle(), 0);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(svc.snapshot().cycle(), 2);
        assert_eq!(store.write_count(), 2);

        scheduler.shutdown().await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(svc.snapshot().cycle(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_server_never_reprices() {
        let store = Arc::new(InMemoryStateStore::new());
        let svc = service(store.clone()).await;
        let population = Arc::new(SharedPopulation::new(0));

        let scheduler = Scheduler::spawn(svc.clone(), population, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(300)).await;
        scheduler.shutdown().await;

        assert_eq!(svc.snapshot().cycle(), 0);
        assert_eq!(store.write_count(), 0);
        assert_eq!(svc.price("sword"), Some(20.0));
    }

    #[tokio::test]
    async fn test_refreshing_feed_counts_sessions_up_front() {
        let sessions = Arc::new(SqlitePopulation::in_memory().unwrap());
        sessions.session_started("alice", chrono::Utc::now()).unwrap();
        sessions.session_started("bob", chrono::Utc::now()).unwrap();

        let feed = PopulationFeed::refreshing(sessions, Duration::from_secs(30)).await.unwrap();
        assert_eq!(feed.source().online_players(), 2);
        feed.stop();

        assert_eq!(PopulationFeed::fixed(7).source().online_players(), 7);
    }
}
