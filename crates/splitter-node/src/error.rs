use splitter_core::CoreError;
use splitter_network::{NetworkError, PeerId};
use splitter_settlement::SettlementError;
use splitter_store::StoreError;

/// Errors returned to callers of a [`NodeHandle`](crate::NodeHandle).
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("no active group")]
    NoActiveGroup,

    #[error("group not found: {0}")]
    UnknownGroup(String),

    /// The active group has no user this node can act as.
    #[error("no local user selected")]
    NoLocalUser,

    #[error("peer unavailable: {0}")]
    PeerUnavailable(PeerId),

    /// The link to the host went away before it answered the join request.
    #[error("disconnected from {0} before joining")]
    JoinAborted(PeerId),

    #[error("node stopped")]
    Stopped,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The group holds amounts settlement cannot represent.
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}
