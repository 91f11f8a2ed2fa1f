use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DbError {
    /// A conditional write lost the race against a concurrent writer; the
    /// caller should re-read and recompute.
    #[error("control record version conflict")]
    VersionConflict,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("storage backend: {0}")]
    Backend(String),

    #[error("{0}")]
    Other(String),
}

pub type DbResult<T> = Result<T, DbError>;
