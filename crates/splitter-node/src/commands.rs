//! Commands dispatched from a [`NodeHandle`](crate::NodeHandle) to the node
//! event loop, and what the loop reports back.

use serde::Serialize;
use splitter_core::{ExpenseDraft, ExpenseId, Group, GroupId, User, UserId};
use splitter_network::{Notice, PeerId};
use splitter_settlement::SettlementPlan;
use tokio::sync::oneshot;

use crate::error::NodeError;

pub type Reply<T> = oneshot::Sender<Result<T, NodeError>>;

/// A command sent to the node's main event loop.
pub enum NodeCommand {
    /// Create a group and make it active.
    CreateGroup { name: String, reply: Reply<Group> },
    SelectGroup { group_id: GroupId, reply: Reply<()> },
    DeleteGroup { group_id: GroupId, reply: Reply<Group> },
    /// Add a user to the active group.
    AddUser { name: String, reply: Reply<User> },
    RemoveUser { user_id: UserId, reply: Reply<User> },
    /// Choose which user of the active group this node acts as.
    SelectUser { user_id: UserId, reply: Reply<User> },
    /// Add an expense to the active group, or replace `editing`.
    SaveExpense {
        draft: ExpenseDraft,
        editing: Option<ExpenseId>,
        reply: Reply<ExpenseId>,
    },
    DeleteExpense {
        expense_id: ExpenseId,
        reply: Reply<()>,
    },
    /// Comment on an expense of the active group as the local user.
    AddComment {
        expense_id: ExpenseId,
        text: String,
        reply: Reply<()>,
    },
    /// Connect to the host named by `invite` and ask to join as `name`.
    ///
    /// The reply is sent once the host answers or the attempt fails.
    Join {
        invite: String,
        name: String,
        reply: Reply<JoinOutcome>,
    },
    /// Balances and transfers for a group, the active one by default.
    Settlement {
        group_id: Option<GroupId>,
        reply: Reply<SettlementPlan>,
    },
    Snapshot { reply: Reply<NodeSnapshot> },
    /// The invite code, or a link when a base URL is given.
    Invite {
        base_url: Option<String>,
        reply: Reply<String>,
    },
    /// Forget every group and wipe persisted state.
    Reset { reply: Reply<()> },
    Shutdown { reply: Reply<()> },
}

/// How a join attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The host sent the group and assigned us a user.
    Joined { group_id: GroupId, user: User },
    /// A session to that host already exists; no new request was sent.
    AlreadyConnected,
    /// The host has not answered yet. The attempt keeps running and a late
    /// answer is still applied.
    TimedOut,
}

/// A read-only view of the node's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub groups: Vec<Group>,
    pub active_group_id: Option<GroupId>,
    pub local_user: Option<User>,
    pub peer_id: Option<PeerId>,
    pub connected_peers: Vec<PeerId>,
}

impl NodeSnapshot {
    pub fn active_group(&self) -> Option<&Group> {
        let id = self.active_group_id.as_deref()?;
        self.groups.iter().find(|g| g.id == id)
    }
}

/// Events published to every subscriber of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A connectivity notice from the supervisor.
    Network(Notice),
    /// Replicated state changed, locally or from a peer.
    StateChanged,
    /// A join completed, possibly after the caller stopped waiting.
    Joined { group_id: GroupId, user: User },
}
