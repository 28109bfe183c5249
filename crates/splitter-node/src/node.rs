//! The Splitter node orchestrator.
//!
//! One task owns the replica store, the local user and the connection
//! supervisor, and processes transport events and handle commands strictly
//! one at a time. Every mutation of replicated state is persisted right
//! after it is applied.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use splitter_core::{Comment, CoreError, Group, User};
use splitter_network::{
    dispatch, publish_comment, publish_group, ConnectOutcome, ConnectionSupervisor, Effect,
    Invite, Notice, PeerId, SupervisorEvent, Transport, TransportEvent,
    DEFAULT_IDENTITY_RETRY_DELAY,
};
use splitter_settlement::{settle, SettlementPlan};
use splitter_store::{BlobStore, PersistedState, ReplicaStore};

use crate::commands::{JoinOutcome, NodeCommand, NodeEvent, NodeSnapshot, Reply};
use crate::error::NodeError;
use crate::handle::NodeHandle;

/// Runtime knobs for a node.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub identity_retry_delay: Duration,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            identity_retry_delay: DEFAULT_IDENTITY_RETRY_DELAY,
            command_buffer: 256,
            event_buffer: 256,
        }
    }
}

/// A join request waiting for the host's GROUP_SYNC.
struct PendingJoin {
    remote: PeerId,
    link: splitter_network::LinkId,
    reply: Reply<JoinOutcome>,
}

pub struct SplitterNode<T: Transport> {
    supervisor: ConnectionSupervisor<T>,
    store: ReplicaStore,
    /// The user this node acts as, when one was assigned or selected.
    local_user: Option<User>,
    blobs: Arc<dyn BlobStore>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    command_rx: mpsc::Receiver<NodeCommand>,
    event_tx: broadcast::Sender<NodeEvent>,
    pending_joins: Vec<PendingJoin>,
}

impl<T: Transport> SplitterNode<T> {
    /// Create a node, restoring replicas from `blobs`.
    pub fn new(
        transport: Arc<T>,
        blobs: Arc<dyn BlobStore>,
        settings: NodeSettings,
    ) -> Result<(Self, NodeHandle), NodeError> {
        let state = PersistedState::load(blobs.as_ref())?;
        let store = ReplicaStore::restore(state);
        tracing::info!(
            groups = store.list_all().len(),
            active = ?store.active_group_id(),
            "replicas restored"
        );

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(settings.command_buffer);
        let (event_tx, _) = broadcast::channel(settings.event_buffer);
        let supervisor =
            ConnectionSupervisor::new(transport, transport_tx, settings.identity_retry_delay);

        let handle = NodeHandle::new(command_tx, event_tx.clone());
        let node = Self {
            supervisor,
            store,
            local_user: None,
            blobs,
            transport_rx,
            command_rx,
            event_tx,
            pending_joins: Vec::new(),
        };
        Ok((node, handle))
    }

    /// Obtain the local identity.
    ///
    /// A fatal identity failure is not an error here: recovery is already
    /// scheduled and the event loop will retry.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        match self.supervisor.start().await {
            Ok(id) => {
                self.emit(NodeEvent::Network(Notice::IdentityReady(id)));
                Ok(())
            }
            Err(e) if self.supervisor.retry_deadline().is_some() => {
                tracing::warn!(error = %e, "identity unavailable, will retry");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run the event loop until shut down or every handle is dropped.
    pub async fn run(mut self) -> Result<(), NodeError> {
        tracing::info!("entering main event loop");

        loop {
            let deadline = self.supervisor.retry_deadline();
            tokio::select! {
                Some(event) = self.transport_rx.recv() => {
                    self.handle_transport_event(event).await;
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(NodeCommand::Shutdown { reply }) => {
                            let _ = reply.send(Ok(()));
                            break;
                        }
                        Some(c) => self.handle_command(c).await,
                        None => {
                            tracing::info!("command channel closed");
                            break;
                        }
                    }
                }
                _ = wait_until(deadline) => {
                    self.recover_identity().await;
                }
            }
        }

        self.supervisor.shutdown().await;
        tracing::info!("node stopped");
        Ok(())
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        for output in self.supervisor.handle_transport_event(event).await {
            match output {
                SupervisorEvent::Message {
                    link,
                    remote,
                    message,
                } => {
                    tracing::debug!(%remote, %link, kind = message.kind(), "dispatching message");
                    let outcome = dispatch(&mut self.store, &mut self.local_user, link, message);
                    for effect in outcome.effects {
                        self.execute(effect).await;
                    }
                    if outcome.changed {
                        self.state_changed();
                    }
                    if let Some(user) = outcome.assigned_user {
                        self.complete_join(link, user);
                    }
                }
                SupervisorEvent::Notice(notice) => {
                    self.fail_pending_joins(&notice);
                    self.emit(NodeEvent::Network(notice));
                }
            }
        }
    }

    async fn recover_identity(&mut self) {
        match self.supervisor.recover().await {
            Ok(id) => self.emit(NodeEvent::Network(Notice::IdentityReady(id))),
            Err(e) => tracing::error!(error = %e, "identity recovery failed"),
        }
    }

    async fn handle_command(&mut self, cmd: NodeCommand) {
        match cmd {
            NodeCommand::CreateGroup { name, reply } => {
                let result = self.create_group(&name);
                let _ = reply.send(result);
            }
            NodeCommand::SelectGroup { group_id, reply } => {
                let result = self
                    .store
                    .set_active(&group_id)
                    .map_err(NodeError::from)
                    .map(|()| self.persist());
                let _ = reply.send(result);
            }
            NodeCommand::DeleteGroup { group_id, reply } => {
                let result = match self.store.remove(&group_id) {
                    Some(group) => {
                        tracing::info!(group_id = %group.id, "group deleted");
                        self.state_changed();
                        Ok(group)
                    }
                    None => Err(NodeError::UnknownGroup(group_id)),
                };
                let _ = reply.send(result);
            }
            NodeCommand::AddUser { name, reply } => {
                let result = self.edit_active(|group| group.add_user(&name)).await;
                let _ = reply.send(result);
            }
            NodeCommand::RemoveUser { user_id, reply } => {
                let result = self.edit_active(|group| group.remove_user(&user_id)).await;
                let _ = reply.send(result);
            }
            NodeCommand::SelectUser { user_id, reply } => {
                let result = self.select_user(&user_id);
                let _ = reply.send(result);
            }
            NodeCommand::SaveExpense {
                draft,
                editing,
                reply,
            } => {
                let result = self
                    .edit_active(|group| group.save_expense(draft, editing.as_deref()))
                    .await;
                let _ = reply.send(result);
            }
            NodeCommand::DeleteExpense { expense_id, reply } => {
                let result = self
                    .edit_active(|group| group.remove_expense(&expense_id).map(|_| ()))
                    .await;
                let _ = reply.send(result);
            }
            NodeCommand::AddComment {
                expense_id,
                text,
                reply,
            } => {
                let result = self.add_comment(&expense_id, &text).await;
                let _ = reply.send(result);
            }
            NodeCommand::Join {
                invite,
                name,
                reply,
            } => self.join(&invite, &name, reply).await,
            NodeCommand::Settlement { group_id, reply } => {
                let _ = reply.send(self.settlement(group_id.as_deref()));
            }
            NodeCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            NodeCommand::Invite { base_url, reply } => {
                let result = self.invite(base_url.as_deref());
                let _ = reply.send(result);
            }
            NodeCommand::Reset { reply } => {
                let _ = reply.send(self.reset());
            }
            // Handled by the run loop.
            NodeCommand::Shutdown { reply } => {
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn create_group(&mut self, name: &str) -> Result<Group, NodeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("group name is required".into()).into());
        }
        let group = Group::new(name);
        self.store.upsert_local(group.clone());
        self.store.set_active(&group.id)?;
        tracing::info!(group_id = %group.id, name, "group created");
        self.state_changed();
        Ok(group)
    }

    /// Apply a local edit to the active group, store it and broadcast it.
    async fn edit_active<R>(
        &mut self,
        edit: impl FnOnce(&mut Group) -> Result<R, CoreError>,
    ) -> Result<R, NodeError> {
        let mut group = self
            .store
            .active_group()
            .cloned()
            .ok_or(NodeError::NoActiveGroup)?;
        let result = edit(&mut group)?;
        let effect = publish_group(&mut self.store, group);
        self.execute(effect).await;
        self.state_changed();
        Ok(result)
    }

    fn select_user(&mut self, user_id: &str) -> Result<User, NodeError> {
        let group = self.store.active_group().ok_or(NodeError::NoActiveGroup)?;
        let user = group
            .user(user_id)
            .cloned()
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;
        tracing::info!(user_id = %user.id, name = %user.name, "local user selected");
        self.local_user = Some(user.clone());
        Ok(user)
    }

    /// The user this node acts as within the active group.
    ///
    /// Falls back to the group's first user when none was chosen or the
    /// chosen one is no longer a member.
    fn current_user(&self) -> Option<User> {
        let group = self.store.active_group()?;
        self.local_user
            .as_ref()
            .and_then(|u| group.user(&u.id))
            .or_else(|| group.users.first())
            .cloned()
    }

    async fn add_comment(&mut self, expense_id: &str, text: &str) -> Result<(), NodeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::Validation("comment text is required".into()).into());
        }
        let author = self.current_user().ok_or(NodeError::NoLocalUser)?;
        let group_id = self
            .store
            .active_group_id()
            .map(str::to_string)
            .ok_or(NodeError::NoActiveGroup)?;

        let comment = Comment::new(&author, text);
        let effect = publish_comment(&mut self.store, &group_id, expense_id, comment)
            .ok_or_else(|| CoreError::ExpenseNotFound(expense_id.to_string()))?;
        self.execute(effect).await;
        self.state_changed();
        Ok(())
    }

    async fn join(&mut self, invite: &str, name: &str, reply: Reply<JoinOutcome>) {
        let name = name.trim();
        if name.is_empty() {
            let _ = reply.send(Err(
                CoreError::Validation("a name is required to join".into()).into()
            ));
            return;
        }
        let remote = match Invite::parse(invite) {
            Ok(remote) => remote,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        match self.supervisor.connect(&remote, name).await {
            Ok(ConnectOutcome::Connecting(link)) => {
                tracing::info!(%remote, %link, name, "joining group");
                self.pending_joins.push(PendingJoin {
                    remote,
                    link,
                    reply,
                });
            }
            Ok(ConnectOutcome::AlreadyConnected(_)) => {
                let _ = reply.send(Ok(JoinOutcome::AlreadyConnected));
            }
            Err(e) => {
                tracing::warn!(%remote, error = %e, "join failed");
                let _ = reply.send(Err(e.into()));
            }
        }
    }

    fn complete_join(&mut self, link: splitter_network::LinkId, user: User) {
        let group_id = self
            .store
            .active_group_id()
            .map(str::to_string)
            .unwrap_or_default();
        self.emit(NodeEvent::Joined {
            group_id: group_id.clone(),
            user: user.clone(),
        });

        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_joins)
            .into_iter()
            .partition(|p| p.link == link);
        self.pending_joins = waiting;
        for pending in done {
            // The caller may have stopped waiting after its soft timeout.
            let _ = pending.reply.send(Ok(JoinOutcome::Joined {
                group_id: group_id.clone(),
                user: user.clone(),
            }));
        }
    }

    fn fail_pending_joins(&mut self, notice: &Notice) {
        let failed = |remote: &PeerId| -> Option<NodeError> {
            match notice {
                Notice::PeerUnavailable(peer) if peer == remote => {
                    Some(NodeError::PeerUnavailable(remote.clone()))
                }
                Notice::PeerDisconnected(peer) if peer == remote => {
                    Some(NodeError::JoinAborted(remote.clone()))
                }
                Notice::IdentityLost { .. } => Some(NodeError::JoinAborted(remote.clone())),
                _ => None,
            }
        };

        let mut waiting = Vec::new();
        for pending in std::mem::take(&mut self.pending_joins) {
            match failed(&pending.remote) {
                Some(err) => {
                    let _ = pending.reply.send(Err(err));
                }
                None => waiting.push(pending),
            }
        }
        self.pending_joins = waiting;
    }

    fn settlement(&self, group_id: Option<&str>) -> Result<SettlementPlan, NodeError> {
        let group = match group_id {
            Some(id) => self
                .store
                .get(id)
                .ok_or_else(|| NodeError::UnknownGroup(id.to_string()))?,
            None => self.store.active_group().ok_or(NodeError::NoActiveGroup)?,
        };
        Ok(settle(group)?)
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            groups: self.store.list_all().to_vec(),
            active_group_id: self.store.active_group_id().map(str::to_string),
            local_user: self.current_user(),
            peer_id: self.supervisor.local_peer().cloned(),
            connected_peers: self.supervisor.connected_peers(),
        }
    }

    fn invite(&self, base_url: Option<&str>) -> Result<String, NodeError> {
        let peer = self
            .supervisor
            .local_peer()
            .ok_or(splitter_network::NetworkError::IdentityNotReady)?;
        match base_url {
            Some(base) => Ok(Invite::link(base, peer)?),
            None => Ok(Invite::code(peer)),
        }
    }

    fn reset(&mut self) -> Result<(), NodeError> {
        self.store.clear();
        self.local_user = None;
        PersistedState::reset(self.blobs.as_ref())?;
        tracing::warn!("all local data reset");
        self.emit(NodeEvent::StateChanged);
        Ok(())
    }

    async fn execute(&self, effect: Effect) {
        match effect {
            Effect::Reply { link, message } => {
                if let Err(e) = self.supervisor.send_to(link, &message).await {
                    tracing::warn!(%link, kind = message.kind(), error = %e, "reply failed");
                }
            }
            Effect::Broadcast { message, except } => {
                self.supervisor.broadcast(&message, except).await;
            }
        }
    }

    fn state_changed(&self) {
        self.persist();
        self.emit(NodeEvent::StateChanged);
    }

    fn persist(&self) {
        if let Err(e) = self.store.snapshot().save(self.blobs.as_ref()) {
            tracing::error!(error = %e, "failed to persist replicas");
        }
    }

    fn emit(&self, event: NodeEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
