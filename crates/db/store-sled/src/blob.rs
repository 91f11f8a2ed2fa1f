use tidemark_db_types::{BlobObject, BlobStore, DbResult};

use crate::utils::{backend_err, codec_err};

const BLOB_TREE: &str = "blobs";

/// Blob store over a sled tree, one entry per micro-batch record.
#[derive(Debug)]
pub struct BlobDBSled {
    tree: sled::Tree,
}

impl BlobDBSled {
    pub fn new(db: &sled::Db) -> DbResult<Self> {
        let tree = db.open_tree(BLOB_TREE).map_err(backend_err)?;
        Ok(Self { tree })
    }
}

impl BlobStore for BlobDBSled {
    fn put(&self, key: &str, data: &[u8], content_type: &str) -> DbResult<()> {
        let obj = BlobObject::new(data.to_vec(), content_type);
        let raw = borsh::to_vec(&obj).map_err(codec_err)?;
        self.tree.insert(key, raw).map_err(backend_err)?;
        Ok(())
    }

    fn get(&self, key: &str) -> DbResult<Option<BlobObject>> {
        let Some(raw) = self.tree.get(key).map_err(backend_err)? else {
            return Ok(None);
        };
        let obj = borsh::from_slice(&raw).map_err(codec_err)?;
        Ok(Some(obj))
    }
}
