/// Replica store and persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("group not found: {0}")]
    UnknownGroup(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
