//! RocksDB storage backend for the Splitter node.

use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use splitter_store::{BlobStore, StoreError};
use std::path::Path;

/// Column family holding the persisted replica state.
const CF_STATE: &str = "state";

/// RocksDB-backed [`BlobStore`].
pub struct RocksBlobStore {
    db: DB,
}

impl RocksBlobStore {
    /// Open or create a RocksDB database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path).map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(CF_STATE, Options::default())];
        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors).map_err(backend)?;

        tracing::info!(path = %path.display(), "storage opened");
        Ok(Self { db })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(CF_STATE)
            .ok_or_else(|| StoreError::Backend(format!("column family '{}' not found", CF_STATE)))
    }
}

impl BlobStore for RocksBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.get_cf(self.cf()?, key.as_bytes()).map_err(backend)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.db.put_cf(self.cf()?, key.as_bytes(), value).map_err(backend)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.db.delete_cf(self.cf()?, key.as_bytes()).map_err(backend)
    }
}

fn backend(err: rocksdb::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}
