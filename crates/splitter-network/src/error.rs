//! Network error types for the Splitter replication layer.

use splitter_store::StoreError;

use crate::peer::LinkId;
use crate::session::SessionState;

/// Failures reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The remote identity is unknown or offline.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    /// The network underneath the identity failed.
    #[error("network error: {0}")]
    Network(String),

    /// The identity or signaling service failed.
    #[error("server error: {0}")]
    Server(String),

    /// The transport itself is in a broken state.
    #[error("transport internal error: {0}")]
    Internal(String),

    /// The link or identity is gone.
    #[error("disconnected: {0}")]
    Disconnected(String),
}

impl TransportError {
    /// Whether the local identity is unusable and must be recreated.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Server(_) | Self::Internal(_)
        )
    }
}

/// Errors that can occur in the Splitter network layer.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("invalid session transition from {from} on {event}")]
    InvalidSessionTransition { from: SessionState, event: String },

    /// The local identity is not ready to open links.
    #[error("local identity not ready")]
    IdentityNotReady,

    #[error("refusing to connect to self")]
    SelfConnect,

    #[error("empty peer id")]
    EmptyPeerId,

    #[error("unknown link: {0}")]
    UnknownLink(LinkId),

    #[error("invalid invite: {0}")]
    InvalidInvite(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
