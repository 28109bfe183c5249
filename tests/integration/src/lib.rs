//! Shared harness for the Splitter integration tests.
//!
//! Nodes run on a [`MemoryNetwork`] with in-memory persistence. A
//! [`RawPeer`] speaks the wire protocol by hand for scenarios a real node
//! would never produce.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use splitter_core::{ExpenseDraft, Money, Participant, Payer, SplitType, User};
use splitter_network::{LinkId, MemoryNetwork, Message, PeerId, Transport, TransportEvent};
use splitter_node::{NodeHandle, NodeSettings, NodeSnapshot, SplitterNode};
use splitter_store::MemoryBlobStore;
use tokio::sync::mpsc;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Identity retry delay used by test nodes.
pub const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Start a node on `net` backed by `blobs` and return its handle.
pub async fn spawn_node(net: &MemoryNetwork, blobs: Arc<MemoryBlobStore>) -> NodeHandle {
    let settings = NodeSettings {
        identity_retry_delay: RETRY_DELAY,
        ..NodeSettings::default()
    };
    let (mut node, handle) =
        SplitterNode::new(Arc::new(net.clone()), blobs, settings).expect("node should build");
    node.start().await.expect("identity should open");
    tokio::spawn(node.run());
    handle
}

/// Start a node with fresh in-memory storage.
pub async fn fresh_node(net: &MemoryNetwork) -> NodeHandle {
    spawn_node(net, Arc::new(MemoryBlobStore::new())).await
}

/// The node's current peer id.
pub async fn peer_id(handle: &NodeHandle) -> PeerId {
    handle
        .snapshot()
        .await
        .expect("snapshot")
        .peer_id
        .expect("identity should be ready")
}

/// Poll `handle` until its snapshot satisfies `done`.
pub async fn wait_for(
    handle: &NodeHandle,
    what: &str,
    done: impl Fn(&NodeSnapshot) -> bool,
) -> NodeSnapshot {
    let poll = async {
        loop {
            let snapshot = handle.snapshot().await.expect("snapshot");
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(WAIT, poll)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
}

/// An equal split of `cents` paid in full by `payer`.
pub fn equal_split(title: &str, payer: &User, participants: &[&User], cents: i64) -> ExpenseDraft {
    ExpenseDraft {
        title: title.into(),
        amount: Money::from_cents(cents),
        payers: vec![Payer {
            user_id: payer.id.clone(),
            amount: Money::from_cents(cents),
        }],
        participants: participants
            .iter()
            .map(|u| Participant {
                user_id: u.id.clone(),
                share: 0,
            })
            .collect(),
        split_type: SplitType::Equal,
        date: NaiveDate::from_ymd_opt(2024, 10, 5).expect("valid date"),
    }
}

/// A hand-driven peer on the memory network.
pub struct RawPeer {
    pub net: MemoryNetwork,
    pub id: PeerId,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl RawPeer {
    pub async fn open(net: &MemoryNetwork) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let id = net.open_identity(tx).await.expect("raw identity");
        Self {
            net: net.clone(),
            id,
            events,
        }
    }

    /// Dial `remote` and wait for the link to open.
    pub async fn connect(&mut self, remote: &PeerId) -> LinkId {
        let link = self.net.connect(&self.id, remote).await.expect("connect");
        match self.next_event().await {
            TransportEvent::Opened { link: opened } => assert_eq!(opened, link),
            other => panic!("expected open event, got {:?}", other),
        }
        link
    }

    pub async fn send_raw(&self, link: LinkId, frame: &str) {
        self.net
            .send(link, frame.to_string())
            .await
            .expect("raw send");
    }

    pub async fn send(&self, link: LinkId, message: &Message) {
        self.send_raw(link, &message.encode().expect("encode")).await;
    }

    pub async fn next_event(&mut self) -> TransportEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event channel closed")
    }

    /// Wait for the next decodable message on any link.
    pub async fn next_message(&mut self) -> (LinkId, Message) {
        loop {
            if let TransportEvent::Frame { link, data } = self.next_event().await {
                return (link, Message::decode(&data).expect("node sent a valid frame"));
            }
        }
    }
}
