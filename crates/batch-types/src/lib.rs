//! Record types for the Tidemark batching/compaction engine.

mod batch;
mod control;

pub use batch::{FinalizedBatch, MicroBatch, MicroBatchHandle, PendingItem, RoundOutcome};
pub use control::{ControlRecord, PendingPartition};
