//! Applying protocol messages to a replica store.
//!
//! Dispatch is pure with respect to the network: it mutates the store it is
//! handed and returns the sends the caller must perform.

use splitter_core::{Comment, Group, User};
use splitter_store::{RemoteApply, ReplicaStore};

use crate::peer::LinkId;
use crate::protocol::Message;

/// A send requested by dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Answer on the link the message came from.
    Reply { link: LinkId, message: Message },
    /// Send to every open session except `except`.
    Broadcast {
        message: Message,
        except: Option<LinkId>,
    },
}

/// The outcome of handling one inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub effects: Vec<Effect>,
    /// Whether state worth persisting changed.
    pub changed: bool,
    /// The identity a host assigned to us, from a GROUP_SYNC.
    pub assigned_user: Option<User>,
}

/// Handle one message received on `link`.
///
/// `local_user` is the identity this replica acts as; a GROUP_SYNC replaces
/// it with the user the host assigned.
pub fn dispatch(
    store: &mut ReplicaStore,
    local_user: &mut Option<User>,
    link: LinkId,
    message: Message,
) -> Dispatch {
    match message {
        Message::GroupUpdate { group } => {
            let changed = store.apply_remote_update(group) == RemoteApply::Replaced;
            Dispatch {
                changed,
                ..Dispatch::default()
            }
        }
        Message::JoinRequest { name } => handle_join_request(store, link, &name),
        Message::GroupSync {
            group,
            assigned_user,
        } => {
            tracing::info!(
                group_id = %group.id,
                user = %assigned_user.name,
                "joined group"
            );
            store.accept_sync(group);
            *local_user = Some(assigned_user.clone());
            Dispatch {
                changed: true,
                assigned_user: Some(assigned_user),
                ..Dispatch::default()
            }
        }
        Message::AddComment {
            group_id,
            expense_id,
            comment,
        } => Dispatch {
            changed: store.append_comment(&group_id, &expense_id, comment),
            ..Dispatch::default()
        },
    }
}

fn handle_join_request(store: &mut ReplicaStore, link: LinkId, name: &str) -> Dispatch {
    let Some(active) = store.active_group() else {
        tracing::warn!(%link, name, "join request without an active group dropped");
        return Dispatch::default();
    };
    let mut group = active.clone();
    let mut outcome = Dispatch::default();

    let user = match group.find_user_by_name(name) {
        Some(existing) => {
            tracing::info!(%link, group_id = %group.id, user_id = %existing.id, "peer rejoined as existing user");
            existing.clone()
        }
        None => match group.add_user(name) {
            Ok(user) => {
                tracing::info!(%link, group_id = %group.id, user_id = %user.id, "peer joined as new user");
                store.upsert_local(group.clone());
                outcome.changed = true;
                outcome.effects.push(Effect::Broadcast {
                    message: Message::GroupUpdate {
                        group: group.clone(),
                    },
                    except: Some(link),
                });
                user
            }
            Err(e) => {
                tracing::warn!(%link, name, error = %e, "join request rejected");
                return outcome;
            }
        },
    };

    outcome.effects.push(Effect::Reply {
        link,
        message: Message::GroupSync {
            group,
            assigned_user: user,
        },
    });
    outcome
}

/// Store a locally edited group and announce it to every peer.
pub fn publish_group(store: &mut ReplicaStore, group: Group) -> Effect {
    store.upsert_local(group.clone());
    Effect::Broadcast {
        message: Message::GroupUpdate { group },
        except: None,
    }
}

/// Append a locally authored comment and announce it to every peer.
///
/// Returns `None` when the target group or expense is unknown.
pub fn publish_comment(
    store: &mut ReplicaStore,
    group_id: &str,
    expense_id: &str,
    comment: Comment,
) -> Option<Effect> {
    if !store.append_comment(group_id, expense_id, comment.clone()) {
        return None;
    }
    Some(Effect::Broadcast {
        message: Message::AddComment {
            group_id: group_id.to_string(),
            expense_id: expense_id.to_string(),
            comment,
        },
        except: None,
    })
}
