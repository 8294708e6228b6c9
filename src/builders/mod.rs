//! Builders wiring pools, the manager and the scheduler from configuration.

pub mod pool_builder;

pub use pool_builder::{build_pool, build_pool_manager, build_scheduler};
