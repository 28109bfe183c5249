//! Owns the local peer identity and the registry of peer sessions.
//!
//! The supervisor is driven from a single event loop: the loop feeds it
//! every [`TransportEvent`] and calls [`ConnectionSupervisor::recover`] when
//! [`ConnectionSupervisor::retry_deadline`] passes. It never spawns tasks.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{NetworkError, TransportError};
use crate::events::{Notice, TransportEvent};
use crate::peer::{LinkId, PeerId};
use crate::protocol::Message;
use crate::session::{Direction, PeerSession, SessionEvent};
use crate::transport::{EventSender, Transport};

/// How long to wait before recreating a failed identity.
pub const DEFAULT_IDENTITY_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Lifecycle of the local identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    Initializing,
    Ready(PeerId),
    /// The identity failed and a new one is scheduled.
    Recovering,
}

/// Result of asking for a link to a remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new session was registered and is connecting.
    Connecting(LinkId),
    /// A session to that remote already exists; nothing was done.
    AlreadyConnected(LinkId),
}

impl ConnectOutcome {
    pub fn link(&self) -> LinkId {
        match self {
            Self::Connecting(link) | Self::AlreadyConnected(link) => *link,
        }
    }
}

/// What the event loop has to act on after a transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A decoded message arrived on an open session.
    Message {
        link: LinkId,
        remote: PeerId,
        message: Message,
    },
    Notice(Notice),
}

pub struct ConnectionSupervisor<T: Transport> {
    transport: Arc<T>,
    events: EventSender,
    identity: IdentityState,
    sessions: Vec<PeerSession>,
    retry_delay: Duration,
    retry_at: Option<Instant>,
}

impl<T: Transport> ConnectionSupervisor<T> {
    /// Create a supervisor. Transport events for every identity it opens are
    /// posted to `events`.
    pub fn new(transport: Arc<T>, events: EventSender, retry_delay: Duration) -> Self {
        Self {
            transport,
            events,
            identity: IdentityState::Initializing,
            sessions: Vec::new(),
            retry_delay,
            retry_at: None,
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn identity_state(&self) -> &IdentityState {
        &self.identity
    }

    /// The local identity, once ready.
    pub fn local_peer(&self) -> Option<&PeerId> {
        match &self.identity {
            IdentityState::Ready(id) => Some(id),
            _ => None,
        }
    }

    /// Registered sessions, oldest first.
    pub fn sessions(&self) -> &[PeerSession] {
        &self.sessions
    }

    /// Remotes with an open session, oldest first.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut seen = HashSet::new();
        self.sessions
            .iter()
            .filter(|s| s.is_open() && seen.insert(s.remote().clone()))
            .map(|s| s.remote().clone())
            .collect()
    }

    /// When the identity should be recreated, if a recovery is pending.
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Obtain the local identity from the transport.
    ///
    /// On a fatal failure a retry is scheduled after the configured delay
    /// and the error is still returned.
    pub async fn start(&mut self) -> Result<PeerId, NetworkError> {
        self.identity = IdentityState::Initializing;
        self.retry_at = None;

        match self.transport.open_identity(self.events.clone()).await {
            Ok(id) => {
                tracing::info!(peer_id = %id, "local identity ready");
                self.identity = IdentityState::Ready(id.clone());
                Ok(id)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to open local identity");
                if e.is_fatal() {
                    self.schedule_retry();
                }
                Err(e.into())
            }
        }
    }

    /// Recreate the identity after a fatal failure. Called by the event loop
    /// once [`retry_deadline`](Self::retry_deadline) has passed.
    pub async fn recover(&mut self) -> Result<PeerId, NetworkError> {
        tracing::info!("recreating local identity");
        self.start().await
    }

    /// Open a session to `remote` that will ask to join as `join_name`.
    pub async fn connect(
        &mut self,
        remote: &PeerId,
        join_name: &str,
    ) -> Result<ConnectOutcome, NetworkError> {
        let remote = PeerId::new(remote.as_str().trim());
        if remote.is_empty() {
            return Err(NetworkError::EmptyPeerId);
        }
        let local = self
            .local_peer()
            .cloned()
            .ok_or(NetworkError::IdentityNotReady)?;
        if remote == local {
            return Err(NetworkError::SelfConnect);
        }
        if let Some(existing) = self.sessions.iter().find(|s| s.remote() == &remote) {
            tracing::info!(%remote, link = %existing.link(), "already connected to peer");
            return Ok(ConnectOutcome::AlreadyConnected(existing.link()));
        }

        // Registered before the loop can observe the transport's open event.
        let link = self.transport.connect(&local, &remote).await?;
        self.sessions
            .push(PeerSession::outbound(link, remote.clone(), join_name));
        tracing::info!(%remote, %link, "connecting to peer");
        Ok(ConnectOutcome::Connecting(link))
    }

    /// Apply one transport event.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) -> Vec<SupervisorEvent> {
        match event {
            TransportEvent::Incoming { link, remote } => self.on_incoming(link, remote).await,
            TransportEvent::Opened { link } => self.on_opened(link).await,
            TransportEvent::Frame { link, data } => self.on_frame(link, &data),
            TransportEvent::Closed { link } => self
                .unregister(link, SessionEvent::Closed)
                .map(|remote| {
                    tracing::info!(%remote, %link, "peer disconnected");
                    vec![SupervisorEvent::Notice(Notice::PeerDisconnected(remote))]
                })
                .unwrap_or_default(),
            TransportEvent::LinkError { link, error } => self.on_link_error(link, error),
            TransportEvent::IdentityError { identity, error } => {
                self.on_identity_error(identity, error).await
            }
        }
    }

    /// Send one message on one link.
    pub async fn send_to(&self, link: LinkId, message: &Message) -> Result<(), NetworkError> {
        let session = self
            .sessions
            .iter()
            .find(|s| s.link() == link)
            .ok_or(NetworkError::UnknownLink(link))?;
        if !session.is_open() {
            return Err(NetworkError::UnknownLink(link));
        }
        let frame = message.encode()?;
        self.transport.send(link, frame).await?;
        tracing::debug!(remote = %session.remote(), %link, kind = message.kind(), "message sent");
        Ok(())
    }

    /// Send `message` to every open session except `except`.
    ///
    /// Works on a snapshot of the registry. A failed send is logged and does
    /// not affect the others. Returns how many sends succeeded.
    pub async fn broadcast(&self, message: &Message, except: Option<LinkId>) -> usize {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, kind = message.kind(), "failed to encode broadcast");
                return 0;
            }
        };

        // One copy per remote, and none to the remote behind `except`.
        let excluded = except.and_then(|link| {
            self.sessions
                .iter()
                .find(|s| s.link() == link)
                .map(|s| s.remote().clone())
        });
        let mut seen: HashSet<PeerId> = excluded.into_iter().collect();
        let targets: Vec<(LinkId, PeerId)> = self
            .sessions
            .iter()
            .filter(|s| s.is_open() && Some(s.link()) != except)
            .filter(|s| seen.insert(s.remote().clone()))
            .map(|s| (s.link(), s.remote().clone()))
            .collect();

        let mut delivered = 0;
        for (link, remote) in targets {
            match self.transport.send(link, frame.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(%remote, %link, error = %e, "broadcast send failed");
                }
            }
        }
        tracing::debug!(kind = message.kind(), delivered, "message broadcast");
        delivered
    }

    /// Close one session locally.
    pub async fn close(&mut self, link: LinkId) -> Option<PeerId> {
        let remote = self.unregister(link, SessionEvent::Closed)?;
        self.transport.close(link).await;
        Some(remote)
    }

    /// Close every session and give up the identity.
    pub async fn shutdown(&mut self) {
        for session in std::mem::take(&mut self.sessions) {
            self.transport.close(session.link()).await;
        }
        if let IdentityState::Ready(id) = &self.identity {
            self.transport.destroy_identity(id).await;
        }
        self.identity = IdentityState::Initializing;
        self.retry_at = None;
        tracing::info!("connection supervisor shut down");
    }

    /// Register a link the remote opened. An older inbound link from the
    /// same remote is stale and gets closed. An outbound session to it is
    /// kept, since the remote may be dialing us at the same moment.
    async fn on_incoming(&mut self, link: LinkId, remote: PeerId) -> Vec<SupervisorEvent> {
        let stale: Vec<LinkId> = self
            .sessions
            .iter()
            .filter(|s| s.remote() == &remote && s.direction() == Direction::Inbound)
            .map(|s| s.link())
            .collect();
        for old in stale {
            tracing::info!(%remote, %old, new = %link, "peer reconnected, replacing inbound link");
            self.unregister(old, SessionEvent::Closed);
            self.transport.close(old).await;
        }

        let known = self.sessions.iter().any(|s| s.remote() == &remote);
        self.sessions
            .push(PeerSession::inbound(link, remote.clone()));
        if known {
            tracing::debug!(%remote, %link, "additional link from connected peer");
            return Vec::new();
        }
        tracing::info!(%remote, %link, "peer connected to us");
        vec![SupervisorEvent::Notice(Notice::PeerConnected(remote))]
    }

    async fn on_opened(&mut self, link: LinkId) -> Vec<SupervisorEvent> {
        let Some(session) = self.sessions.iter_mut().find(|s| s.link() == link) else {
            tracing::debug!(%link, "open event for unknown link");
            return Vec::new();
        };
        let join = match session.apply(SessionEvent::Opened) {
            Ok(join) => join,
            Err(e) => {
                tracing::warn!(%link, error = %e, "ignoring open event");
                return Vec::new();
            }
        };
        let remote = session.remote().clone();
        tracing::info!(%remote, %link, "link to peer open");

        if let Some(join) = join {
            if let Err(e) = self.send_to(link, &join).await {
                tracing::warn!(%remote, %link, error = %e, "failed to send join request");
            }
        }
        vec![SupervisorEvent::Notice(Notice::PeerConnected(remote))]
    }

    fn on_frame(&self, link: LinkId, data: &str) -> Vec<SupervisorEvent> {
        let Some(session) = self.sessions.iter().find(|s| s.link() == link && s.is_open()) else {
            tracing::debug!(%link, "frame on unregistered link dropped");
            return Vec::new();
        };
        match Message::decode(data) {
            Ok(message) => {
                tracing::debug!(remote = %session.remote(), %link, kind = message.kind(), "message received");
                vec![SupervisorEvent::Message {
                    link,
                    remote: session.remote().clone(),
                    message,
                }]
            }
            Err(e) => {
                tracing::warn!(remote = %session.remote(), %link, error = %e, "dropping malformed frame");
                Vec::new()
            }
        }
    }

    fn on_link_error(&mut self, link: LinkId, error: TransportError) -> Vec<SupervisorEvent> {
        let Some(remote) = self.unregister(link, SessionEvent::Failed) else {
            return Vec::new();
        };
        match error {
            TransportError::PeerUnavailable(_) => {
                tracing::warn!(%remote, %link, "peer unavailable");
                vec![SupervisorEvent::Notice(Notice::PeerUnavailable(remote))]
            }
            error => {
                tracing::warn!(%remote, %link, %error, "link failed");
                vec![SupervisorEvent::Notice(Notice::PeerDisconnected(remote))]
            }
        }
    }

    async fn on_identity_error(
        &mut self,
        identity: PeerId,
        error: TransportError,
    ) -> Vec<SupervisorEvent> {
        if self.local_peer() != Some(&identity) {
            tracing::debug!(%identity, %error, "error for stale identity ignored");
            return Vec::new();
        }
        if !error.is_fatal() {
            tracing::warn!(%identity, %error, "identity error");
            return match error {
                TransportError::PeerUnavailable(ref target) => vec![SupervisorEvent::Notice(
                    Notice::PeerUnavailable(PeerId::new(target.clone())),
                )],
                _ => Vec::new(),
            };
        }

        tracing::error!(%identity, %error, "local identity failed, recreating");
        // Sessions are orphaned, not closed: the identity teardown below
        // takes their links with it.
        let orphaned = self.sessions.len();
        self.sessions.clear();
        self.transport.destroy_identity(&identity).await;
        self.schedule_retry();
        tracing::info!(orphaned, delay = ?self.retry_delay, "identity recovery scheduled");

        vec![SupervisorEvent::Notice(Notice::IdentityLost {
            reason: error.to_string(),
        })]
    }

    fn schedule_retry(&mut self) {
        self.identity = IdentityState::Recovering;
        self.retry_at = Some(Instant::now() + self.retry_delay);
    }

    /// Remove a session after driving it to `Closed`.
    fn unregister(&mut self, link: LinkId, event: SessionEvent) -> Option<PeerId> {
        let index = self.sessions.iter().position(|s| s.link() == link)?;
        let mut session = self.sessions.remove(index);
        if let Err(e) = session.apply(event) {
            tracing::debug!(%link, error = %e, "session already closed");
        }
        Some(session.remote().clone())
    }
}
