//! Port traits implemented by the host and by storage adapters

pub mod ledger;
pub mod population;
pub mod store;
