//! Sled-backed implementations of the Tidemark storage ports.

mod blob;
mod control;
mod utils;

use std::{path::Path, sync::Arc};

// Only the integration tests exercise the engine on top of this backend.
#[cfg(test)]
use tidemark_engine as _;

pub use blob::BlobDBSled;
pub use control::ControlDBSled;
use tidemark_db_types::DbResult;

use crate::utils::backend_err;

pub const SLED_NAME: &str = "tidemark";

/// Opens (or creates) the sled database under `datadir`.
pub fn open_sled_database(datadir: &Path) -> DbResult<sled::Db> {
    let path = datadir.join(SLED_NAME);
    sled::open(path).map_err(backend_err)
}

/// Both storage ports over one sled database.
#[derive(Debug)]
pub struct SledBackend {
    blob_db: Arc<BlobDBSled>,
    control_db: Arc<ControlDBSled>,
}

impl SledBackend {
    pub fn new(db: &sled::Db) -> DbResult<Self> {
        Ok(Self {
            blob_db: Arc::new(BlobDBSled::new(db)?),
            control_db: Arc::new(ControlDBSled::new(db)?),
        })
    }

    pub fn blobs(&self) -> &Arc<BlobDBSled> {
        &self.blob_db
    }

    pub fn control(&self) -> &Arc<ControlDBSled> {
        &self.control_db
    }
}
