//! Events flowing out of the transport and notices surfaced to the UI.
//!
//! Transports never call into the supervisor. Everything they observe is
//! posted as a [`TransportEvent`] on the channel handed to
//! [`Transport::open_identity`](crate::transport::Transport::open_identity),
//! and the owner of the event loop feeds those events back in one at a time.

use crate::error::TransportError;
use crate::peer::{LinkId, PeerId};

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A remote peer opened a link to us. The link is usable immediately.
    Incoming { link: LinkId, remote: PeerId },
    /// An outbound link finished opening.
    Opened { link: LinkId },
    /// One frame arrived on a link.
    Frame { link: LinkId, data: String },
    /// The remote end closed the link.
    Closed { link: LinkId },
    /// The link failed.
    LinkError { link: LinkId, error: TransportError },
    /// The local identity failed.
    IdentityError {
        identity: PeerId,
        error: TransportError,
    },
}

impl TransportEvent {
    /// The link this event concerns, if any.
    pub fn link(&self) -> Option<LinkId> {
        match self {
            Self::Incoming { link, .. }
            | Self::Opened { link }
            | Self::Frame { link, .. }
            | Self::Closed { link }
            | Self::LinkError { link, .. } => Some(*link),
            Self::IdentityError { .. } => None,
        }
    }
}

/// User-facing notifications about connectivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The local identity is ready and can be shared in an invite.
    IdentityReady(PeerId),
    /// The local identity failed and will be recreated.
    IdentityLost { reason: String },
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    /// The peer we tried to reach is offline or the id is wrong.
    PeerUnavailable(PeerId),
}
