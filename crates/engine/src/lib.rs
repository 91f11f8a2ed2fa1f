//! Tidemark batching/compaction engine.
//!
//! Ingests content-identifying links as numbered micro-batches and, on each
//! scheduling tick, merges every micro-batch that has waited out the safety
//! window into one finalized batch suitable for external ledger anchoring.
//! All state lives in a single versioned control record plus append-only
//! blob storage, so the engine is stateless between invocations, idempotent
//! under re-invocation, and safe under concurrent producers.

pub mod codec;
mod compactor;
mod config;
mod engine;
mod errors;
pub mod keys;

pub use config::{EngineConfig, DEFAULT_MAX_OCC_RETRIES, MIN_SAFETY_BUFFER};
pub use engine::{BatchEngine, CreatedMicroBatch};
pub use errors::{EngineError, EngineResult};
