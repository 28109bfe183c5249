//! Splitter Replica Store
//!
//! Holds this process's copies of every group it knows about and applies
//! local edits and inbound merge messages to them. Persistence goes through
//! the small [`BlobStore`] interface; the store itself never performs I/O.

pub mod error;
pub mod replica;
pub mod persist;

pub use error::StoreError;
pub use persist::{BlobStore, MemoryBlobStore, PersistedState, ACTIVE_GROUP_KEY, GROUPS_KEY};
pub use replica::{RemoteApply, ReplicaStore};
