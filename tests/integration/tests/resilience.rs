//! Integration test: identity recovery, restarts, late answers and bad input.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use splitter_core::{Expense, Group, Money, Participant, Payer, SplitType, User};
use splitter_network::{MemoryNetwork, Message, Notice, TransportError, TransportEvent};
use splitter_node::{JoinOutcome, NodeError, NodeEvent};
use splitter_store::MemoryBlobStore;
use splitter_integration_tests::{fresh_node, peer_id, spawn_node, wait_for, RawPeer, WAIT};

#[tokio::test]
async fn test_identity_is_recreated_after_fatal_error() {
    let net = MemoryNetwork::new();
    let host = fresh_node(&net).await;
    host.create_group("Ski week").await.unwrap();
    let guest = fresh_node(&net).await;
    guest
        .join(&host.invite_code().await.unwrap(), "Bob", Duration::from_secs(2))
        .await
        .unwrap();

    let mut events = host.subscribe();
    let old = peer_id(&host).await;
    assert!(net.fail_identity(&old, TransportError::Network("socket reset".into())));

    let lost = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(NodeEvent::Network(Notice::IdentityLost { reason })) = events.recv().await {
                return reason;
            }
        }
    })
    .await
    .expect("identity lost notice");
    assert!(lost.contains("socket reset"));

    let recovered = wait_for(&host, "new identity", |s| {
        s.peer_id.as_ref().map(|p| p != &old).unwrap_or(false)
    })
    .await;
    assert!(recovered.connected_peers.is_empty());
    assert!(!net.is_online(&old));
    // Replicated state survives the identity swap.
    assert_eq!(recovered.active_group().unwrap().users.len(), 1);

    // The old session is gone on the guest's side too.
    wait_for(&guest, "host session closed", |s| s.connected_peers.is_empty()).await;
}

#[tokio::test]
async fn test_non_fatal_identity_error_keeps_identity() {
    let net = MemoryNetwork::new();
    let node = fresh_node(&net).await;
    let id = peer_id(&node).await;

    net.fail_identity(&id, TransportError::PeerUnavailable("mem-99".into()));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(peer_id(&node).await, id);
    assert!(net.is_online(&id));
}

#[tokio::test]
async fn test_state_survives_restart() {
    let net = MemoryNetwork::new();
    let host = fresh_node(&net).await;
    let group = host.create_group("Cabin").await.unwrap();
    host.add_user("Alice").await.unwrap();

    let blobs = Arc::new(MemoryBlobStore::new());
    let guest = spawn_node(&net, blobs.clone()).await;
    guest
        .join(&host.invite_code().await.unwrap(), "Bob", Duration::from_secs(2))
        .await
        .unwrap();
    guest.shutdown().await.unwrap();

    let restarted = spawn_node(&net, blobs).await;
    let snapshot = restarted.snapshot().await.unwrap();
    assert_eq!(snapshot.active_group_id.as_deref(), Some(group.id.as_str()));
    assert_eq!(snapshot.active_group().unwrap().users.len(), 2);
    assert!(snapshot.connected_peers.is_empty());
}

#[tokio::test]
async fn test_late_group_sync_is_applied_after_soft_timeout() {
    let net = MemoryNetwork::new();
    let mut host = RawPeer::open(&net).await;
    let guest = fresh_node(&net).await;
    let mut events = guest.subscribe();

    let outcome = guest
        .join(host.id.as_str(), "Bob", Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(outcome, JoinOutcome::TimedOut);

    let link = match host.next_event().await {
        TransportEvent::Incoming { link, .. } => link,
        other => panic!("expected incoming link, got {:?}", other),
    };
    let (_, request) = host.next_message().await;
    assert_eq!(request, Message::JoinRequest { name: "Bob".into() });

    let mut group = Group::new("Late answer");
    let bob = User::new("Bob");
    group.users.push(bob.clone());
    host.send(
        link,
        &Message::GroupSync {
            group: group.clone(),
            assigned_user: bob.clone(),
        },
    )
    .await;

    let joined = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(NodeEvent::Joined { group_id, user }) = events.recv().await {
                return (group_id, user);
            }
        }
    })
    .await
    .expect("late join event");
    assert_eq!(joined, (group.id.clone(), bob.clone()));

    let snapshot = guest.snapshot().await.unwrap();
    assert_eq!(snapshot.active_group(), Some(&group));
    assert_eq!(snapshot.local_user, Some(bob));
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let net = MemoryNetwork::new();
    let host = fresh_node(&net).await;
    let group = host.create_group("Garage band").await.unwrap();

    let mut raw = RawPeer::open(&net).await;
    let link = raw.connect(&peer_id(&host).await).await;
    raw.send_raw(link, "this is not json").await;
    raw.send_raw(link, r#"{"type":"SHRUG"}"#).await;
    raw.send(link, &Message::JoinRequest { name: "Zoe".into() }).await;

    let (from, reply) = raw.next_message().await;
    assert_eq!(from, link);
    match reply {
        Message::GroupSync {
            group: synced,
            assigned_user,
        } => {
            assert_eq!(synced.id, group.id);
            assert_eq!(assigned_user.name, "Zoe");
        }
        other => panic!("expected group sync, got {:?}", other),
    }
    assert_eq!(
        host.snapshot().await.unwrap().active_group().unwrap().users.len(),
        1
    );
}

#[tokio::test]
async fn test_out_of_range_remote_amounts_do_not_stop_the_node() {
    let net = MemoryNetwork::new();
    let host = fresh_node(&net).await;
    host.create_group("Harbour").await.unwrap();
    let alice = host.add_user("Alice").await.unwrap();
    let mut group = host.snapshot().await.unwrap().active_group().unwrap().clone();

    // Two payments that each fit in i64 but not once credited together.
    let half = Money::from_cents(i64::MAX / 2 + 1);
    group.expenses.push(Expense {
        id: "yacht".into(),
        title: "Yacht".into(),
        amount: Money::MAX,
        payers: vec![
            Payer {
                user_id: alice.id.clone(),
                amount: half,
            },
            Payer {
                user_id: alice.id.clone(),
                amount: half,
            },
        ],
        participants: vec![Participant {
            user_id: alice.id.clone(),
            share: 0,
        }],
        split_type: SplitType::Equal,
        date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        comments: Vec::new(),
    });

    let mut raw = RawPeer::open(&net).await;
    let link = raw.connect(&peer_id(&host).await).await;
    raw.send(link, &Message::GroupUpdate { group }).await;

    wait_for(&host, "remote expense applied", |s| {
        s.active_group()
            .map(|g| g.expense("yacht").is_some())
            .unwrap_or(false)
    })
    .await;
    assert!(matches!(
        host.settlement(None).await,
        Err(NodeError::Settlement(_))
    ));

    // The node keeps serving and recovers once the expense is gone.
    host.delete_expense("yacht").await.unwrap();
    let plan = host.settlement(None).await.unwrap();
    assert!(plan.transactions.is_empty());
}

#[tokio::test]
async fn test_join_request_without_group_gets_no_answer() {
    let net = MemoryNetwork::new();
    let host = fresh_node(&net).await;

    let mut raw = RawPeer::open(&net).await;
    let link = raw.connect(&peer_id(&host).await).await;
    raw.send(link, &Message::JoinRequest { name: "Zoe".into() }).await;

    let silence = tokio::time::timeout(Duration::from_millis(200), raw.next_message()).await;
    assert!(silence.is_err());
    assert!(host.snapshot().await.unwrap().groups.is_empty());
}
