//! Splitter Networking Crate
//!
//! Keeps independent replicas of a group converging by exchanging whole
//! groups and comments with directly connected peers. It provides:
//!
//! - **Message**: the four-message JSON wire protocol
//! - **PeerSession**: a per-link state machine
//! - **ConnectionSupervisor**: the local identity plus the session registry
//! - **dispatch**: applying inbound messages to a [`ReplicaStore`]
//! - **Transport**: the seam to the underlying link layer, with an
//!   in-process [`MemoryNetwork`] and a line-based [`TcpTransport`]
//! - **Invite**: handing a peer identity to someone who wants to join
//!
//! [`ReplicaStore`]: splitter_store::ReplicaStore

pub mod error;
pub mod peer;
pub mod protocol;
pub mod events;
pub mod session;
pub mod transport;
pub mod memory;
pub mod tcp;
pub mod supervisor;
pub mod dispatch;
pub mod invite;

// Re-exports for convenience.
pub use dispatch::{dispatch, publish_comment, publish_group, Dispatch, Effect};
pub use error::{NetworkError, TransportError};
pub use events::{Notice, TransportEvent};
pub use invite::{Invite, INVITE_QUERY_PARAM};
pub use memory::MemoryNetwork;
pub use peer::{LinkId, PeerId};
pub use protocol::Message;
pub use session::{Direction, PeerSession, SessionEvent, SessionState, SessionStateMachine};
pub use supervisor::{
    ConnectOutcome, ConnectionSupervisor, IdentityState, SupervisorEvent,
    DEFAULT_IDENTITY_RETRY_DELAY,
};
pub use tcp::{TcpTransport, DEFAULT_MAX_FRAME_LEN};
pub use transport::{EventSender, Transport};
