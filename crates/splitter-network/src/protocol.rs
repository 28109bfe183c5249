//! The replication wire protocol.
//!
//! Every frame carries exactly one UTF-8 JSON object whose `"type"` field
//! selects one of four messages. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use splitter_core::{Comment, ExpenseId, Group, GroupId, User};

use crate::error::NetworkError;

/// A message exchanged between two connected peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// The full current state of a group. Receivers replace their copy.
    GroupUpdate { group: Group },

    /// Sent by a joiner right after its link opens.
    JoinRequest { name: String },

    /// The host's answer to a join request: the group plus the user the
    /// joiner should act as.
    GroupSync {
        group: Group,
        #[serde(rename = "assignedUser")]
        assigned_user: User,
    },

    /// A single comment appended to one expense.
    AddComment {
        #[serde(rename = "groupId")]
        group_id: GroupId,
        #[serde(rename = "expenseId")]
        expense_id: ExpenseId,
        comment: Comment,
    },
}

impl Message {
    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GroupUpdate { .. } => "GROUP_UPDATE",
            Self::JoinRequest { .. } => "JOIN_REQUEST",
            Self::GroupSync { .. } => "GROUP_SYNC",
            Self::AddComment { .. } => "ADD_COMMENT",
        }
    }

    pub fn encode(&self) -> Result<String, NetworkError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(frame: &str) -> Result<Self, NetworkError> {
        Ok(serde_json::from_str(frame)?)
    }
}
