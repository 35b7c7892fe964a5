//! Pricing domain: catalog, per-item state, and the control loop

pub mod catalog;
pub mod engine;
pub mod state;

pub use catalog::{Catalog, Item};
pub use engine::{
    CycleComputation, CycleInputs, CycleSummary, EngineDecision, EngineParams, InjectionReading,
    PriceChange, PricingEngine, SkipReason,
};
pub use state::{ItemState, PriceBook, ReconcileReport};
