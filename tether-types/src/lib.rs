//! Core type definitions for tether.
//!
//! This crate defines the building blocks every other tether
//! crate depends on:
//! - Model and observer identifiers (UUID v7)
//! - Model lifecycle events
//! - [`EntityValues`] and the pure value algebra used for dirty tracking:
//!   deep merge, structural diff, path addressing, partial matching
//!
//! Nothing in here performs I/O. The request lifecycle lives in `tether`,
//! the HTTP contract in `tether-http`.

mod event;
mod ids;
pub mod values;

pub use event::ModelEvent;
pub use ids::{ModelId, ObserverId};
pub use values::{EntityValues, Path, PathSegment};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid property path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
}
