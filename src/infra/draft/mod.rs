//! Draft merge backends.

pub mod overlay;

pub use overlay::DraftOverlay;
