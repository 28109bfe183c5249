//! Integration test: joining a hosted group over the memory network.

use std::time::Duration;

use splitter_network::{MemoryNetwork, Notice};
use splitter_node::{JoinOutcome, NodeError, NodeEvent};
use splitter_integration_tests::{fresh_node, peer_id, wait_for, WAIT};

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_join_assigns_new_user_and_syncs_group() {
    let net = MemoryNetwork::new();
    let host = fresh_node(&net).await;
    let group = host.create_group("Lisbon trip").await.unwrap();
    host.add_user("Alice").await.unwrap();

    let guest = fresh_node(&net).await;
    let invite = host.invite_code().await.unwrap();
    let outcome = guest.join(&invite, "Bob", JOIN_TIMEOUT).await.unwrap();

    let bob = match outcome {
        JoinOutcome::Joined { group_id, user } => {
            assert_eq!(group_id, group.id);
            assert_eq!(user.name, "Bob");
            user
        }
        other => panic!("unexpected join outcome: {:?}", other),
    };

    let host_view = host.snapshot().await.unwrap();
    let guest_view = guest.snapshot().await.unwrap();
    assert_eq!(host_view.active_group().unwrap().users.len(), 2);
    assert_eq!(guest_view.active_group(), host_view.active_group());
    assert_eq!(guest_view.local_user, Some(bob));
    assert_eq!(guest_view.connected_peers, vec![peer_id(&host).await]);
}

#[tokio::test]
async fn test_join_through_invite_link() {
    let net = MemoryNetwork::new();
    let host = fresh_node(&net).await;
    host.create_group("Flat 3B").await.unwrap();

    let link = host
        .invite_link("https://splitter.example/open?lang=pt")
        .await
        .unwrap();
    let guest = fresh_node(&net).await;
    let outcome = guest.join(&link, "Carla", JOIN_TIMEOUT).await.unwrap();
    assert!(matches!(outcome, JoinOutcome::Joined { .. }));
}

#[tokio::test]
async fn test_rejoin_with_same_name_reuses_user() {
    let net = MemoryNetwork::new();
    let host = fresh_node(&net).await;
    host.create_group("Climbing").await.unwrap();
    let invite = host.invite_code().await.unwrap();

    let first = fresh_node(&net).await;
    let JoinOutcome::Joined { user: bob, .. } =
        first.join(&invite, "Bob", JOIN_TIMEOUT).await.unwrap()
    else {
        panic!("first join should complete");
    };

    let second = fresh_node(&net).await;
    let JoinOutcome::Joined { user: again, .. } =
        second.join(&invite, "  BOB ", JOIN_TIMEOUT).await.unwrap()
    else {
        panic!("second join should complete");
    };

    assert_eq!(again.id, bob.id);
    let users = host.snapshot().await.unwrap().active_group().unwrap().users.clone();
    assert_eq!(users.len(), 1);
}

#[tokio::test]
async fn test_new_member_is_announced_to_existing_peers() {
    let net = MemoryNetwork::new();
    let host = fresh_node(&net).await;
    host.create_group("Band").await.unwrap();
    let invite = host.invite_code().await.unwrap();

    let bob = fresh_node(&net).await;
    bob.join(&invite, "Bob", JOIN_TIMEOUT).await.unwrap();
    let carol = fresh_node(&net).await;
    carol.join(&invite, "Carol", JOIN_TIMEOUT).await.unwrap();

    wait_for(&bob, "Carol to reach Bob", |s| {
        s.active_group()
            .map(|g| g.find_user_by_name("Carol").is_some())
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn test_second_join_to_connected_host_is_not_sent() {
    let net = MemoryNetwork::new();
    let host = fresh_node(&net).await;
    host.create_group("Book club").await.unwrap();
    let invite = host.invite_code().await.unwrap();

    let guest = fresh_node(&net).await;
    guest.join(&invite, "Dan", JOIN_TIMEOUT).await.unwrap();
    let again = guest.join(&invite, "Dan", JOIN_TIMEOUT).await.unwrap();
    assert_eq!(again, JoinOutcome::AlreadyConnected);
}

#[tokio::test]
async fn test_join_unknown_host_fails() {
    let net = MemoryNetwork::new();
    let guest = fresh_node(&net).await;
    let mut events = guest.subscribe();

    let result = guest.join("mem-404", "Eve", JOIN_TIMEOUT).await;
    assert!(matches!(result, Err(NodeError::PeerUnavailable(ref p)) if p.as_str() == "mem-404"));

    let notice = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(NodeEvent::Network(Notice::PeerUnavailable(peer))) = events.recv().await {
                return peer;
            }
        }
    })
    .await
    .expect("peer unavailable notice");
    assert_eq!(notice.as_str(), "mem-404");
    assert!(guest.snapshot().await.unwrap().connected_peers.is_empty());
}

#[tokio::test]
async fn test_join_rejects_self_and_blank_input() {
    let net = MemoryNetwork::new();
    let node = fresh_node(&net).await;
    let own = node.invite_code().await.unwrap();

    assert!(node.join(&own, "Me", JOIN_TIMEOUT).await.is_err());
    assert!(node.join("   ", "Me", JOIN_TIMEOUT).await.is_err());
    assert!(node.join("mem-1", "  ", JOIN_TIMEOUT).await.is_err());
}
