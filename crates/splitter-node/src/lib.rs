//! Splitter Node
//!
//! Runs one replica: a single event loop owning the replica store and the
//! connection supervisor, a cloneable [`NodeHandle`] for whatever UI drives
//! it, RocksDB-backed persistence and TOML configuration.

pub mod config;
pub mod error;
pub mod storage;
pub mod commands;
pub mod node;
pub mod handle;

pub use commands::{JoinOutcome, NodeCommand, NodeEvent, NodeSnapshot};
pub use config::SplitterConfig;
pub use error::NodeError;
pub use handle::NodeHandle;
pub use node::{NodeSettings, SplitterNode};
pub use storage::RocksBlobStore;
