//! Persisted replica state and the blob store it lives in.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use splitter_core::{Group, GroupId};

use crate::error::StoreError;

/// Key holding the JSON array of every group replica.
pub const GROUPS_KEY: &str = "expense_groups";
/// Key holding the JSON id of the active group, or `null`.
pub const ACTIVE_GROUP_KEY: &str = "active_group_id";

/// Durable key/value storage for opaque byte blobs.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Blob store backed by a concurrent in-memory map.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Everything that survives a restart: the replicas and the active group.
///
/// Stored under two independent keys with no schema version. A missing key
/// reads as its empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub groups: Vec<Group>,
    pub active_group_id: Option<GroupId>,
}

impl PersistedState {
    pub fn load(store: &dyn BlobStore) -> Result<Self, StoreError> {
        let groups = match store.get(GROUPS_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };
        let active_group_id = match store.get(ACTIVE_GROUP_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => None,
        };
        tracing::debug!(groups = groups.len(), "persisted state loaded");
        Ok(Self {
            groups,
            active_group_id,
        })
    }

    pub fn save(&self, store: &dyn BlobStore) -> Result<(), StoreError> {
        store.put(GROUPS_KEY, &serde_json::to_vec(&self.groups)?)?;
        store.put(ACTIVE_GROUP_KEY, &serde_json::to_vec(&self.active_group_id)?)?;
        tracing::trace!(groups = self.groups.len(), "persisted state saved");
        Ok(())
    }

    /// Delete both keys.
    pub fn reset(store: &dyn BlobStore) -> Result<(), StoreError> {
        store.delete(GROUPS_KEY)?;
        store.delete(ACTIVE_GROUP_KEY)?;
        tracing::info!("persisted state reset");
        Ok(())
    }
}
