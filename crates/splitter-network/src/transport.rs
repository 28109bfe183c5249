//! The seam between the replication layer and whatever moves bytes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::events::TransportEvent;
use crate::peer::{LinkId, PeerId};

/// Where a transport posts what it observes for one identity.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// A point-to-point message transport with a pluggable identity service.
///
/// Links are reliable and ordered for as long as they stay open. Calls
/// return as soon as the request is accepted; outcomes such as a link
/// opening or failing arrive later as [`TransportEvent`]s.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Obtain a fresh local identity. All events for it and its links are
    /// posted to `events`.
    async fn open_identity(&self, events: EventSender) -> Result<PeerId, TransportError>;

    /// Tear down an identity and every link it owns.
    async fn destroy_identity(&self, identity: &PeerId);

    /// Start opening a link from `local` to `remote`.
    ///
    /// The returned link is not usable until an `Opened` event arrives for
    /// it. An unreachable remote is reported as a `LinkError` event.
    async fn connect(&self, local: &PeerId, remote: &PeerId) -> Result<LinkId, TransportError>;

    /// Send one frame. Frames must not contain newlines.
    async fn send(&self, link: LinkId, frame: String) -> Result<(), TransportError>;

    /// Close a link. The remote end observes a `Closed` event.
    async fn close(&self, link: LinkId);
}
