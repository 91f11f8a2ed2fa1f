use tidemark_db_types::DbError;

pub(crate) fn backend_err(e: sled::Error) -> DbError {
    DbError::Backend(e.to_string())
}

pub(crate) fn codec_err(e: borsh::io::Error) -> DbError {
    DbError::Codec(e.to_string())
}
