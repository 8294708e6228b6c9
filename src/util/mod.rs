//! Clock and telemetry helpers shared by the scheduler components.

pub mod clock;
pub mod telemetry;

pub use clock::*;
pub use telemetry::*;
