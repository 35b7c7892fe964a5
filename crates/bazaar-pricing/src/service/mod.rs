//! Cycle orchestration: publishing, scheduling, and metrics

pub mod metrics;
pub mod orchestrator;
pub mod published;
pub mod scheduler;

pub use metrics::PricingMetrics;
pub use orchestrator::{
    CycleOutcome, CycleReport, EconomyReport, ItemDiagnostics, PricingService, PricingServiceBuilder,
};
pub use published::PublishedBook;
pub use scheduler::{PopulationFeed, Scheduler};
