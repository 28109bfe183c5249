use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

use splitter_core::{ExpenseDraft, ExpenseId, Group, User};
use splitter_settlement::SettlementPlan;

use crate::commands::{JoinOutcome, NodeCommand, NodeEvent, NodeSnapshot, Reply};
use crate::error::NodeError;

/// Cloneable handle to a running [`SplitterNode`](crate::SplitterNode).
#[derive(Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<NodeCommand>,
    events: broadcast::Sender<NodeEvent>,
}

impl NodeHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<NodeCommand>,
        events: broadcast::Sender<NodeEvent>,
    ) -> Self {
        Self { commands, events }
    }

    /// Receive node events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(Reply<R>) -> NodeCommand,
    ) -> Result<R, NodeError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| NodeError::Stopped)?;
        rx.await.map_err(|_| NodeError::Stopped)?
    }

    pub async fn create_group(&self, name: &str) -> Result<Group, NodeError> {
        let name = name.to_string();
        self.request(|reply| NodeCommand::CreateGroup { name, reply })
            .await
    }

    pub async fn select_group(&self, group_id: &str) -> Result<(), NodeError> {
        let group_id = group_id.to_string();
        self.request(|reply| NodeCommand::SelectGroup { group_id, reply })
            .await
    }

    pub async fn delete_group(&self, group_id: &str) -> Result<Group, NodeError> {
        let group_id = group_id.to_string();
        self.request(|reply| NodeCommand::DeleteGroup { group_id, reply })
            .await
    }

    pub async fn add_user(&self, name: &str) -> Result<User, NodeError> {
        let name = name.to_string();
        self.request(|reply| NodeCommand::AddUser { name, reply })
            .await
    }

    pub async fn remove_user(&self, user_id: &str) -> Result<User, NodeError> {
        let user_id = user_id.to_string();
        self.request(|reply| NodeCommand::RemoveUser { user_id, reply })
            .await
    }

    pub async fn select_user(&self, user_id: &str) -> Result<User, NodeError> {
        let user_id = user_id.to_string();
        self.request(|reply| NodeCommand::SelectUser { user_id, reply })
            .await
    }

    /// Add an expense, or replace the one with id `editing`.
    pub async fn save_expense(
        &self,
        draft: ExpenseDraft,
        editing: Option<&str>,
    ) -> Result<ExpenseId, NodeError> {
        let editing = editing.map(str::to_string);
        self.request(|reply| NodeCommand::SaveExpense {
            draft,
            editing,
            reply,
        })
        .await
    }

    pub async fn delete_expense(&self, expense_id: &str) -> Result<(), NodeError> {
        let expense_id = expense_id.to_string();
        self.request(|reply| NodeCommand::DeleteExpense { expense_id, reply })
            .await
    }

    pub async fn add_comment(&self, expense_id: &str, text: &str) -> Result<(), NodeError> {
        let expense_id = expense_id.to_string();
        let text = text.to_string();
        self.request(|reply| NodeCommand::AddComment {
            expense_id,
            text,
            reply,
        })
        .await
    }

    /// Join the group hosted by the peer named in `invite`.
    ///
    /// Gives up waiting after `soft_timeout` and returns
    /// [`JoinOutcome::TimedOut`]. The attempt itself is not cancelled: a late
    /// answer from the host is still applied and announced as
    /// [`NodeEvent::Joined`].
    pub async fn join(
        &self,
        invite: &str,
        name: &str,
        soft_timeout: Duration,
    ) -> Result<JoinOutcome, NodeError> {
        let invite = invite.to_string();
        let name = name.to_string();
        let request = self.request(|reply| NodeCommand::Join {
            invite,
            name,
            reply,
        });
        match tokio::time::timeout(soft_timeout, request).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?soft_timeout, "host has not answered the join request yet");
                Ok(JoinOutcome::TimedOut)
            }
        }
    }

    /// Settlement for `group_id`, or for the active group.
    pub async fn settlement(&self, group_id: Option<&str>) -> Result<SettlementPlan, NodeError> {
        let group_id = group_id.map(str::to_string);
        self.request(|reply| NodeCommand::Settlement { group_id, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<NodeSnapshot, NodeError> {
        self.request(|reply| NodeCommand::Snapshot { reply }).await
    }

    pub async fn invite_code(&self) -> Result<String, NodeError> {
        self.request(|reply| NodeCommand::Invite {
            base_url: None,
            reply,
        })
        .await
    }

    pub async fn invite_link(&self, base_url: &str) -> Result<String, NodeError> {
        let base_url = Some(base_url.to_string());
        self.request(|reply| NodeCommand::Invite { base_url, reply })
            .await
    }

    /// Forget every group and wipe persisted state.
    pub async fn reset(&self) -> Result<(), NodeError> {
        self.request(|reply| NodeCommand::Reset { reply }).await
    }

    /// Stop the node's event loop.
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        self.request(|reply| NodeCommand::Shutdown { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached() -> (NodeHandle, mpsc::Receiver<NodeCommand>) {
        let (commands, rx) = mpsc::channel(4);
        let (events, _) = broadcast::channel(4);
        (NodeHandle::new(commands, events), rx)
    }

    #[tokio::test]
    async fn test_join_times_out_when_host_never_answers() {
        let (handle, mut rx) = detached();
        // Holds each reply sender open without answering.
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Some(command) = rx.recv().await {
                held.push(command);
            }
        });

        let outcome = handle
            .join("mem-7", "Bob", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(outcome, JoinOutcome::TimedOut);
        silent.abort();
    }

    #[tokio::test]
    async fn test_join_forwards_invite_and_name() {
        let (handle, mut rx) = detached();
        let node = tokio::spawn(async move {
            match rx.recv().await {
                Some(NodeCommand::Join {
                    invite,
                    name,
                    reply,
                }) => {
                    assert_eq!((invite.as_str(), name.as_str()), ("mem-7", "Bob"));
                    let _ = reply.send(Ok(JoinOutcome::AlreadyConnected));
                }
                _ => panic!("expected a join command"),
            }
        });

        let outcome = handle
            .join("mem-7", "Bob", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome, JoinOutcome::AlreadyConnected);
        node.await.unwrap();
    }

    #[tokio::test]
    async fn test_requests_fail_once_node_is_gone() {
        let (handle, rx) = detached();
        drop(rx);
        assert!(matches!(handle.snapshot().await, Err(NodeError::Stopped)));
        assert!(matches!(
            handle.join("mem-7", "Bob", Duration::from_secs(5)).await,
            Err(NodeError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_dropped_reply_is_stopped() {
        let (handle, mut rx) = detached();
        tokio::spawn(async move {
            // Receive the command and drop it unanswered.
            let _ = rx.recv().await;
        });
        assert!(matches!(handle.reset().await, Err(NodeError::Stopped)));
    }
}
