//! The in-memory set of group replicas.
//!
//! Consistency model: whole-group last-write-wins. A full group arriving from
//! anywhere replaces the stored copy outright with no field-level merge. The
//! only field-level operation is comment append, which is idempotent per
//! comment id.

use splitter_core::{Comment, Group, GroupId};

use crate::error::StoreError;
use crate::persist::PersistedState;

/// What happened when a remote full-group update was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteApply {
    /// The stored replica was replaced.
    Replaced,
    /// The payload was identical to the stored replica.
    Unchanged,
    /// No replica with that id is held here; the update was ignored.
    UnknownGroup,
}

/// Owns every group replica held by this process, plus which one is active.
#[derive(Debug, Clone, Default)]
pub struct ReplicaStore {
    groups: Vec<Group>,
    active: Option<GroupId>,
}

impl ReplicaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted state.
    pub fn restore(state: PersistedState) -> Self {
        let mut store = Self {
            groups: state.groups,
            active: state.active_group_id,
        };
        store.normalize_active();
        store
    }

    /// Capture the state that must survive a restart.
    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            groups: self.groups.clone(),
            active_group_id: self.active.clone(),
        }
    }

    /// Store a locally edited group, replacing any previous replica in full.
    ///
    /// Returns `true` when the group was not held before.
    pub fn upsert_local(&mut self, group: Group) -> bool {
        let inserted = self.insert_or_replace(group);
        self.normalize_active();
        inserted
    }

    /// Apply a full group received from a peer.
    ///
    /// Same replace semantics as [`upsert_local`](Self::upsert_local), but
    /// only for groups already held here: a peer broadcasting a group this
    /// replica never joined does not plant it in the local collection.
    pub fn apply_remote_update(&mut self, group: Group) -> RemoteApply {
        match self.groups.iter_mut().find(|g| g.id == group.id) {
            Some(existing) if *existing == group => RemoteApply::Unchanged,
            Some(existing) => {
                tracing::debug!(group_id = %group.id, "replica replaced by remote update");
                *existing = group;
                RemoteApply::Replaced
            }
            None => {
                tracing::debug!(group_id = %group.id, "remote update for unknown group ignored");
                RemoteApply::UnknownGroup
            }
        }
    }

    /// Insert or replace a group received as the answer to our join request,
    /// and make it the active group.
    pub fn accept_sync(&mut self, group: Group) {
        let id = group.id.clone();
        self.insert_or_replace(group);
        self.active = Some(id);
    }

    /// Append a comment to an expense.
    ///
    /// Redelivery is harmless: a comment whose id is already present is
    /// ignored, as is a comment for an unknown group or expense. Returns
    /// whether the replica changed.
    pub fn append_comment(&mut self, group_id: &str, expense_id: &str, comment: Comment) -> bool {
        let Some(group) = self.groups.iter_mut().find(|g| g.id == group_id) else {
            tracing::debug!(group_id, "comment for unknown group ignored");
            return false;
        };
        let Some(expense) = group.expense_mut(expense_id) else {
            tracing::debug!(group_id, expense_id, "comment for unknown expense ignored");
            return false;
        };
        if expense.has_comment(&comment.id) {
            tracing::trace!(comment_id = %comment.id, "duplicate comment ignored");
            return false;
        }
        expense.comments.push(comment);
        true
    }

    pub fn get(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    /// All replicas, in the order they were first stored.
    pub fn list_all(&self) -> &[Group] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Drop a replica. The active group moves to the first remaining one.
    pub fn remove(&mut self, group_id: &str) -> Option<Group> {
        let index = self.groups.iter().position(|g| g.id == group_id)?;
        let removed = self.groups.remove(index);
        self.normalize_active();
        Some(removed)
    }

    /// Drop every replica.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.active = None;
    }

    pub fn active_group_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_group(&self) -> Option<&Group> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    pub fn set_active(&mut self, group_id: &str) -> Result<(), StoreError> {
        if self.get(group_id).is_none() {
            return Err(StoreError::UnknownGroup(group_id.to_string()));
        }
        self.active = Some(group_id.to_string());
        Ok(())
    }

    fn insert_or_replace(&mut self, group: Group) -> bool {
        match self.groups.iter_mut().find(|g| g.id == group.id) {
            Some(existing) => {
                *existing = group;
                false
            }
            None => {
                self.groups.push(group);
                true
            }
        }
    }

    /// Keep the active pointer on a held group whenever any group is held.
    fn normalize_active(&mut self) {
        let dangling = match &self.active {
            Some(id) => !self.groups.iter().any(|g| &g.id == id),
            None => true,
        };
        if dangling {
            self.active = self.groups.first().map(|g| g.id.clone());
        }
    }
}
