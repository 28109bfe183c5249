//! In-process transport hub.
//!
//! Every clone of a [`MemoryNetwork`] shares one hub, so several supervisors
//! in the same process can open identities on it and link to each other.
//! Events are delivered over unbounded channels, which keeps per-link
//! ordering without any I/O tasks.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::TransportError;
use crate::events::TransportEvent;
use crate::peer::{LinkId, PeerId};
use crate::transport::{EventSender, Transport};

/// One end of an in-memory link.
#[derive(Debug, Clone)]
struct Endpoint {
    owner: PeerId,
    remote_link: LinkId,
}

#[derive(Debug, Default)]
struct Hub {
    identities: DashMap<PeerId, EventSender>,
    links: DashMap<LinkId, Endpoint>,
    next_link: AtomicU64,
    next_identity: AtomicU64,
}

/// A shared in-memory network.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    hub: Arc<Hub>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identities currently online.
    pub fn identity_count(&self) -> usize {
        self.hub.identities.len()
    }

    pub fn is_online(&self, identity: &PeerId) -> bool {
        self.hub.identities.contains_key(identity)
    }

    /// Report a failure on `identity` as if its identity service broke.
    pub fn fail_identity(&self, identity: &PeerId, error: TransportError) -> bool {
        let Some(events) = self.sender(identity) else {
            return false;
        };
        events
            .send(TransportEvent::IdentityError {
                identity: identity.clone(),
                error,
            })
            .is_ok()
    }

    /// Sever a link without either side asking. Both ends see `Closed`.
    pub fn drop_link(&self, link: LinkId) {
        let Some((_, near)) = self.hub.links.remove(&link) else {
            return;
        };
        self.post(&near.owner, TransportEvent::Closed { link });
        if let Some((_, far)) = self.hub.links.remove(&near.remote_link) {
            self.post(
                &far.owner,
                TransportEvent::Closed {
                    link: near.remote_link,
                },
            );
        }
        tracing::debug!(%link, "memory link dropped");
    }

    fn allocate_link(&self) -> LinkId {
        LinkId(self.hub.next_link.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn sender(&self, identity: &PeerId) -> Option<EventSender> {
        self.hub.identities.get(identity).map(|s| s.value().clone())
    }

    fn post(&self, identity: &PeerId, event: TransportEvent) {
        if let Some(events) = self.sender(identity) {
            if events.send(event).is_err() {
                tracing::trace!(%identity, "event receiver gone");
            }
        }
    }
}

#[async_trait]
impl Transport for MemoryNetwork {
    async fn open_identity(&self, events: EventSender) -> Result<PeerId, TransportError> {
        let n = self.hub.next_identity.fetch_add(1, Ordering::Relaxed) + 1;
        let identity = PeerId::new(format!("mem-{}", n));
        self.hub.identities.insert(identity.clone(), events);
        tracing::debug!(%identity, "memory identity opened");
        Ok(identity)
    }

    async fn destroy_identity(&self, identity: &PeerId) {
        self.hub.identities.remove(identity);

        let owned: Vec<LinkId> = self
            .hub
            .links
            .iter()
            .filter(|entry| &entry.value().owner == identity)
            .map(|entry| *entry.key())
            .collect();
        for link in owned {
            if let Some((_, near)) = self.hub.links.remove(&link) {
                if let Some((_, far)) = self.hub.links.remove(&near.remote_link) {
                    self.post(
                        &far.owner,
                        TransportEvent::Closed {
                            link: near.remote_link,
                        },
                    );
                }
            }
        }
        tracing::debug!(%identity, "memory identity destroyed");
    }

    async fn connect(&self, local: &PeerId, remote: &PeerId) -> Result<LinkId, TransportError> {
        let local_events = self
            .sender(local)
            .ok_or_else(|| TransportError::Disconnected(format!("identity {} is offline", local)))?;

        let near = self.allocate_link();
        let Some(remote_events) = self.sender(remote) else {
            let _ = local_events.send(TransportEvent::LinkError {
                link: near,
                error: TransportError::PeerUnavailable(remote.to_string()),
            });
            return Ok(near);
        };

        let far = self.allocate_link();
        self.hub.links.insert(
            near,
            Endpoint {
                owner: local.clone(),
                remote_link: far,
            },
        );
        self.hub.links.insert(
            far,
            Endpoint {
                owner: remote.clone(),
                remote_link: near,
            },
        );

        let _ = remote_events.send(TransportEvent::Incoming {
            link: far,
            remote: local.clone(),
        });
        let _ = local_events.send(TransportEvent::Opened { link: near });
        tracing::debug!(%local, %remote, %near, %far, "memory link opened");
        Ok(near)
    }

    async fn send(&self, link: LinkId, frame: String) -> Result<(), TransportError> {
        let far = self
            .hub
            .links
            .get(&link)
            .map(|e| e.remote_link)
            .ok_or_else(|| TransportError::Disconnected(link.to_string()))?;
        let owner = self
            .hub
            .links
            .get(&far)
            .map(|e| e.owner.clone())
            .ok_or_else(|| TransportError::Disconnected(far.to_string()))?;
        let events = self
            .sender(&owner)
            .ok_or_else(|| TransportError::Disconnected(owner.to_string()))?;
        events
            .send(TransportEvent::Frame {
                link: far,
                data: frame,
            })
            .map_err(|_| TransportError::Disconnected(owner.to_string()))
    }

    async fn close(&self, link: LinkId) {
        let Some((_, near)) = self.hub.links.remove(&link) else {
            return;
        };
        if let Some((_, far)) = self.hub.links.remove(&near.remote_link) {
            self.post(
                &far.owner,
                TransportEvent::Closed {
                    link: near.remote_link,
                },
            );
        }
    }
}
