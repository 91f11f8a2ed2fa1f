use thiserror::Error;
use tidemark_db_types::DbError;

use crate::config::MIN_SAFETY_BUFFER;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Constructor rejected a safety buffer below the minimum.
    #[error("safety buffer {0} below minimum {MIN_SAFETY_BUFFER}")]
    SafetyBufferTooSmall(u64),

    /// `create_micro_batch` was called with no items.
    #[error("micro-batch item list is empty")]
    EmptyItems,

    /// `create_micro_batch` items were not sorted ascending by time.
    #[error("micro-batch items not sorted ascending by time")]
    UnsortedItems,

    /// Storage failure, propagated unmodified. Retrying on the next tick is
    /// safe because every state transition derives from persisted data.
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("blob codec: {0}")]
    Codec(String),
}

impl EngineError {
    /// Whether this is a non-retryable caller mistake rather than a
    /// transient storage condition.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::SafetyBufferTooSmall(_) | Self::EmptyItems | Self::UnsortedItems
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
