//! Runtime glue: the isolated task entry point and pool observability.

pub mod isolation;
pub mod observability;

pub use isolation::{run_isolated, IsolatedInvocation};
pub use observability::UtilizationTracker;
