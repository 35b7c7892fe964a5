//! Core types shared across Bazaar crates

pub mod item;
pub mod record;
