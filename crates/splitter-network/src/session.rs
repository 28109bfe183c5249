use std::fmt;

use crate::error::NetworkError;
use crate::peer::{LinkId, PeerId};
use crate::protocol::Message;

/// The lifecycle of one link to one remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Outbound link requested, not yet usable.
    Connecting,
    /// Messages may flow in both directions.
    Open,
    /// Terminal. The session is about to be unregistered.
    Closed,
}

impl SessionState {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Link events that move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transport reported the link open.
    Opened,
    /// Either side closed the link.
    Closed,
    /// The link failed.
    Failed,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which side initiated the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Valid transitions:
/// - Connecting → Open (Opened)
/// - Connecting → Closed (Closed, Failed)
/// - Open → Closed (Closed, Failed)
pub struct SessionStateMachine;

impl SessionStateMachine {
    pub fn transition(
        current: SessionState,
        event: SessionEvent,
    ) -> Result<SessionState, NetworkError> {
        let next = match (current, event) {
            (SessionState::Connecting, SessionEvent::Opened) => SessionState::Open,
            (SessionState::Connecting, SessionEvent::Closed | SessionEvent::Failed) => {
                SessionState::Closed
            }
            (SessionState::Open, SessionEvent::Closed | SessionEvent::Failed) => {
                SessionState::Closed
            }
            _ => {
                return Err(NetworkError::InvalidSessionTransition {
                    from: current,
                    event: event.to_string(),
                })
            }
        };

        tracing::trace!(from = %current, to = %next, %event, "session transition");
        Ok(next)
    }

    pub fn can_transition(current: SessionState, event: SessionEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}

/// One registered link to a remote peer.
#[derive(Debug, Clone)]
pub struct PeerSession {
    link: LinkId,
    remote: PeerId,
    direction: Direction,
    state: SessionState,
    /// The JOIN_REQUEST an outbound session sends once open.
    pending_join: Option<Message>,
}

impl PeerSession {
    /// A session we initiated. It starts `Connecting` and sends a join
    /// request as `join_name` once the link opens.
    pub fn outbound(link: LinkId, remote: PeerId, join_name: impl Into<String>) -> Self {
        Self {
            link,
            remote,
            direction: Direction::Outbound,
            state: SessionState::Connecting,
            pending_join: Some(Message::JoinRequest {
                name: join_name.into(),
            }),
        }
    }

    /// A session the remote initiated. The transport hands these over
    /// already open.
    pub fn inbound(link: LinkId, remote: PeerId) -> Self {
        Self {
            link,
            remote,
            direction: Direction::Inbound,
            state: SessionState::Open,
            pending_join: None,
        }
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    pub fn remote(&self) -> &PeerId {
        &self.remote
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Apply a link event. On `Connecting → Open` the pending join request
    /// is returned so the caller can send it.
    pub fn apply(&mut self, event: SessionEvent) -> Result<Option<Message>, NetworkError> {
        let next = SessionStateMachine::transition(self.state, event)?;
        let opened = self.state == SessionState::Connecting && next == SessionState::Open;
        self.state = next;
        if opened {
            Ok(self.pending_join.take())
        } else {
            Ok(None)
        }
    }
}
