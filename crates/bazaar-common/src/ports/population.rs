//! Online population port

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Source of the current online player count.
///
/// Sampled synchronously when a pricing cycle is triggered, so implementations
/// must be cheap and non-blocking.
pub trait PopulationSource: Send + Sync {
    fn online_players(&self) -> u32;
}

/// Population counter the host updates as sessions come and go
#[derive(Debug, Clone, Default)]
pub struct SharedPopulation(Arc<AtomicU32>);

impl SharedPopulation {
    pub fn new(initial: u32) -> Self {
        Self(Arc::new(AtomicU32::new(initial)))
    }

    pub fn set(&self, online: u32) {
        self.0.store(online, Ordering::Relaxed);
    }

    pub fn player_joined(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn player_left(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
    }
}

impl PopulationSource for SharedPopulation {
    fn online_players(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}
