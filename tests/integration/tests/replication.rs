//! Integration test: edits and comments replicating between joined peers.

use std::collections::BTreeSet;
use std::time::Duration;

use splitter_core::{Money, User};
use splitter_network::MemoryNetwork;
use splitter_node::{JoinOutcome, NodeHandle};
use splitter_integration_tests::{equal_split, fresh_node, wait_for};

/// A host with Alice and a guest joined as Bob.
async fn pair(net: &MemoryNetwork) -> (NodeHandle, User, NodeHandle, User) {
    let host = fresh_node(net).await;
    host.create_group("Dinner club").await.unwrap();
    let alice = host.add_user("Alice").await.unwrap();

    let guest = fresh_node(net).await;
    let invite = host.invite_code().await.unwrap();
    let JoinOutcome::Joined { user: bob, .. } = guest
        .join(&invite, "Bob", Duration::from_secs(2))
        .await
        .unwrap()
    else {
        panic!("join should complete");
    };
    (host, alice, guest, bob)
}

#[tokio::test]
async fn test_expense_added_by_guest_reaches_host() {
    let net = MemoryNetwork::new();
    let (host, alice, guest, bob) = pair(&net).await;

    guest
        .save_expense(equal_split("Pizza", &bob, &[&alice, &bob], 3_001), None)
        .await
        .unwrap();

    wait_for(&host, "expense on host", |s| {
        s.active_group().map(|g| g.expenses.len() == 1).unwrap_or(false)
    })
    .await;

    let on_host = host.settlement(None).await.unwrap();
    let on_guest = guest.settlement(None).await.unwrap();
    assert_eq!(on_host, on_guest);
    assert_eq!(on_host.transactions.len(), 1);
    assert_eq!(on_host.transactions[0].from.id, alice.id);
    assert_eq!(on_host.transactions[0].to.id, bob.id);
    // Alice's share of the odd cent goes to the first participant.
    assert_eq!(on_host.transactions[0].amount, Money::from_cents(1_501));
}

#[tokio::test]
async fn test_last_writer_wins_for_whole_group() {
    let net = MemoryNetwork::new();
    let (host, alice, guest, bob) = pair(&net).await;

    let expense_id = host
        .save_expense(equal_split("Taxi", &alice, &[&alice, &bob], 2_000), None)
        .await
        .unwrap();
    wait_for(&guest, "taxi on guest", |s| {
        s.active_group().map(|g| g.expense(&expense_id).is_some()).unwrap_or(false)
    })
    .await;

    // The guest edits after the host; its copy replaces the host's.
    guest
        .save_expense(
            equal_split("Taxi home", &bob, &[&alice, &bob], 2_400),
            Some(&expense_id),
        )
        .await
        .unwrap();

    let host_view = wait_for(&host, "edited taxi on host", |s| {
        s.active_group()
            .and_then(|g| g.expense(&expense_id))
            .map(|e| e.title == "Taxi home")
            .unwrap_or(false)
    })
    .await;
    let guest_view = guest.snapshot().await.unwrap();
    assert_eq!(host_view.active_group(), guest_view.active_group());
}

#[tokio::test]
async fn test_removed_user_replicates() {
    let net = MemoryNetwork::new();
    let (host, _alice, guest, _bob) = pair(&net).await;
    let carol = host.add_user("Carol").await.unwrap();

    wait_for(&guest, "Carol on guest", |s| {
        s.active_group().map(|g| g.user(&carol.id).is_some()).unwrap_or(false)
    })
    .await;

    guest.remove_user(&carol.id).await.unwrap();
    wait_for(&host, "Carol removed on host", |s| {
        s.active_group().map(|g| g.user(&carol.id).is_none()).unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn test_concurrent_comments_converge() {
    let net = MemoryNetwork::new();
    let (host, alice, guest, bob) = pair(&net).await;

    let expense_id = host
        .save_expense(equal_split("Groceries", &alice, &[&alice, &bob], 5_000), None)
        .await
        .unwrap();
    wait_for(&guest, "groceries on guest", |s| {
        s.active_group().map(|g| g.expense(&expense_id).is_some()).unwrap_or(false)
    })
    .await;

    let (a, b) = tokio::join!(
        host.add_comment(&expense_id, "receipt attached"),
        guest.add_comment(&expense_id, "I'll pay Friday"),
    );
    a.unwrap();
    b.unwrap();

    let texts = |handle: &NodeHandle| {
        let handle = handle.clone();
        let id = expense_id.clone();
        async move {
            wait_for(&handle, "both comments", |s| {
                s.active_group()
                    .and_then(|g| g.expense(&id))
                    .map(|e| e.comments.len() == 2)
                    .unwrap_or(false)
            })
            .await
            .active_group()
            .and_then(|g| g.expense(&id))
            .map(|e| e.comments.iter().map(|c| c.text.clone()).collect::<BTreeSet<_>>())
            .unwrap_or_default()
        }
    };

    let on_host = texts(&host).await;
    let on_guest = texts(&guest).await;
    assert_eq!(on_host, on_guest);
    assert!(on_host.contains("receipt attached"));
    assert!(on_host.contains("I'll pay Friday"));
}

#[tokio::test]
async fn test_comment_authors_are_local_users() {
    let net = MemoryNetwork::new();
    let (host, alice, guest, bob) = pair(&net).await;
    let expense_id = host
        .save_expense(equal_split("Wine", &alice, &[&alice, &bob], 1_800), None)
        .await
        .unwrap();
    wait_for(&guest, "wine on guest", |s| {
        s.active_group().map(|g| g.expense(&expense_id).is_some()).unwrap_or(false)
    })
    .await;

    guest.add_comment(&expense_id, "thanks!").await.unwrap();
    let snapshot = wait_for(&host, "comment on host", |s| {
        s.active_group()
            .and_then(|g| g.expense(&expense_id))
            .map(|e| !e.comments.is_empty())
            .unwrap_or(false)
    })
    .await;
    let comment = &snapshot.active_group().unwrap().expense(&expense_id).unwrap().comments[0];
    assert_eq!(comment.user_id, bob.id);
    assert_eq!(comment.user_name, "Bob");
}
