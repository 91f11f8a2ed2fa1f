use borsh::{BorshDeserialize, BorshSerialize};
use tidemark_batch_types::ControlRecord;
use tidemark_db_types::{ControlStore, DbError, DbResult, Version};

use crate::utils::{backend_err, codec_err};

const CONTROL_TREE: &str = "control";
const CONTROL_KEY: &[u8] = b"control";

/// On-disk shape of the versioned control record.
#[derive(Debug, BorshDeserialize, BorshSerialize)]
struct StoredControl {
    version: Version,
    record: ControlRecord,
}

/// Control store over a sled tree holding a single key, with the conditional
/// write implemented as a byte-level compare-and-swap.
#[derive(Debug)]
pub struct ControlDBSled {
    tree: sled::Tree,
}

impl ControlDBSled {
    pub fn new(db: &sled::Db) -> DbResult<Self> {
        let tree = db.open_tree(CONTROL_TREE).map_err(backend_err)?;
        Ok(Self { tree })
    }

    fn read_raw(&self) -> DbResult<Option<sled::IVec>> {
        self.tree.get(CONTROL_KEY).map_err(backend_err)
    }
}

impl ControlStore for ControlDBSled {
    fn get(&self) -> DbResult<Option<(Version, ControlRecord)>> {
        let Some(raw) = self.read_raw()? else {
            return Ok(None);
        };
        let stored: StoredControl = borsh::from_slice(&raw).map_err(codec_err)?;
        Ok(Some((stored.version, stored.record)))
    }

    fn put_conditional(
        &self,
        expected: Option<Version>,
        record: &ControlRecord,
    ) -> DbResult<Version> {
        let current = self.read_raw()?;

        // Validate the caller's expectation against the decoded version, then
        // swap on the exact bytes read so a racing writer can't slip between.
        let current_version = current
            .as_deref()
            .map(|raw| borsh::from_slice::<StoredControl>(raw).map_err(codec_err))
            .transpose()?
            .map(|s| s.version);
        if current_version != expected {
            return Err(DbError::VersionConflict);
        }

        let next = expected.map(|v| v + 1).unwrap_or(0);
        let stored = StoredControl {
            version: next,
            record: record.clone(),
        };
        let raw = borsh::to_vec(&stored).map_err(codec_err)?;

        self.tree
            .compare_and_swap(CONTROL_KEY, current, Some(raw))
            .map_err(backend_err)?
            .map_err(|_| DbError::VersionConflict)?;
        self.tree.flush().map_err(backend_err)?;
        Ok(next)
    }
}
