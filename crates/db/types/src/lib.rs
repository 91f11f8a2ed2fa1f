//! Storage port definitions for the Tidemark engine.
//!
//! The engine itself has zero dependency on any particular backing service;
//! it talks to a content-addressed blob store and a single-record control
//! store with conditional writes, both defined here.

mod errors;
#[cfg(feature = "stubs")]
pub mod stubs;
mod traits;

pub use errors::{DbError, DbResult};
pub use traits::{BlobObject, BlobStore, ControlStore, Version};
