//! Lock backends.

pub mod memory;

pub use memory::InMemoryLock;
