//! Trait definitions for the two narrow storage interfaces the engine needs.

use borsh::{BorshDeserialize, BorshSerialize};
use tidemark_batch_types::ControlRecord;

use crate::DbResult;

/// Version tag of the durable control record, for optimistic concurrency.
pub type Version = u64;

/// A stored blob along with its content type.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BlobObject {
    data: Vec<u8>,
    content_type: String,
}

impl BlobObject {
    pub fn new(data: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            data,
            content_type: content_type.into(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}

/// Content-addressed blob storage. Append-only in practice: micro-batch
/// records are never mutated after creation, so `put` under an existing key
/// with identical content is a harmless no-op for correctness.
pub trait BlobStore: Send + Sync + 'static {
    fn put(&self, key: &str, data: &[u8], content_type: &str) -> DbResult<()>;

    fn get(&self, key: &str) -> DbResult<Option<BlobObject>>;
}

/// Holder of the single durable [`ControlRecord`].
///
/// Writes are conditional on the version previously read, rejecting with
/// [`DbError::VersionConflict`](crate::DbError::VersionConflict) on mismatch.
/// This is what makes concurrent producers and even concurrent schedulers
/// safe: the loser of a race re-reads and recomputes.
pub trait ControlStore: Send + Sync + 'static {
    /// Reads the current record with its version. `None` is the expected
    /// cold-start state, not an error.
    fn get(&self) -> DbResult<Option<(Version, ControlRecord)>>;

    /// Writes the record iff the stored version still matches `expected`
    /// (`None` = create only if absent). Returns the new version.
    fn put_conditional(
        &self,
        expected: Option<Version>,
        record: &ControlRecord,
    ) -> DbResult<Version>;
}
