//! Infrastructure layer: shared store, broker, scheduler, workers, config.

pub mod admission;
pub mod bootstrap;
pub mod broker;
pub mod config;
pub mod delivery;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod submit;
pub mod worker;
