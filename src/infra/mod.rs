//! Infrastructure adapters: resource store, distributed lock and draft
//! overlay backends.

pub mod draft;
pub mod lock;
pub mod store;

pub use draft::DraftOverlay;
pub use lock::InMemoryLock;
pub use store::InMemoryResourceStore;
