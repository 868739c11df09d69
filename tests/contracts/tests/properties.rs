//! Contract tests for the synchronization core, driven over scripted
//! in-memory transports.

use pairchat_contracts::{record, DeadWire, FailingHistory, MemoryHistory, ScriptedWire};
use pairchat_protocol::wire::{ClientFrame, ServerFrame};
use pairchat_protocol::{ConversationKey, ParticipantId};
use pairchat_sync::{ChannelConfig, ChatSession, SessionHandle, SyncError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn fast_config() -> ChannelConfig {
    ChannelConfig {
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        ..ChannelConfig::default()
    }
}

fn key(a: &str, b: &str) -> ConversationKey {
    ConversationKey::new(a.into(), b.into()).unwrap()
}

fn receive(sender: &str, receiver: &str, body: &str) -> ServerFrame {
    ServerFrame::Receive {
        sender: sender.into(),
        receiver: receiver.into(),
        body: body.into(),
    }
}

struct Harness {
    wire: ScriptedWire,
    history: MemoryHistory,
    handle: SessionHandle,
    identity: watch::Sender<Option<ParticipantId>>,
}

fn alice_session() -> Harness {
    let wire = ScriptedWire::new();
    let history = MemoryHistory::new();
    let (identity, identity_rx) = watch::channel(Some(ParticipantId::from("alice@x")));
    let handle = ChatSession::spawn(wire.clone(), history.clone(), identity_rx, fast_config());
    Harness {
        wire,
        history,
        handle,
        identity,
    }
}

#[tokio::test]
async fn history_load_populates_view_in_fetch_order() {
    let h = alice_session();
    h.history.put(
        &key("alice@x", "bob@x"),
        vec![
            record("bob@x", "alice@x", "first"),
            record("alice@x", "bob@x", "second"),
            record("bob@x", "alice@x", "third"),
        ],
    );

    h.handle.set_peer(Some("bob@x".into())).unwrap();

    let mut view = h.handle.view();
    timeout(WAIT, view.wait_for(|v| v.len() == 3))
        .await
        .unwrap()
        .unwrap();
    let bodies: Vec<String> = view
        .borrow()
        .messages
        .iter()
        .map(|m| m.body.clone())
        .collect();
    assert_eq!(bodies, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn blank_send_never_appends_or_transmits() {
    let h = alice_session();
    h.handle.set_peer(Some("bob@x".into())).unwrap();
    h.wire.wait_for_epochs(1).await;

    let err = h.handle.send("   \t ").await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidSend(_)));
    assert!(h.handle.view().borrow().is_empty());

    // Only the join announcement ever went out.
    h.wire.wait_for_sent(0, 1).await;
    let sent = h.wire.sent(0);
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0], ClientFrame::Join { .. }));
}

#[tokio::test]
async fn local_send_appends_before_any_transport_roundtrip() {
    // The wire is permanently down: the optimistic append must happen anyway.
    let history = MemoryHistory::new();
    let (_identity, identity_rx) = watch::channel(Some(ParticipantId::from("alice@x")));
    let handle = ChatSession::spawn(DeadWire, history, identity_rx, fast_config());

    handle.set_peer(Some("bob@x".into())).unwrap();
    handle.send("instant").await.unwrap();

    let view = handle.view().borrow().clone();
    assert_eq!(view.len(), 1);
    assert_eq!(view.messages[0].body, "instant");
    assert!(!view.messages[0].confirmed);
}

#[tokio::test]
async fn self_echo_confirms_without_growing_the_view() {
    let h = alice_session();
    h.handle.set_peer(Some("bob@x".into())).unwrap();
    h.wire.wait_for_epochs(1).await;

    h.handle.send("hi").await.unwrap();
    h.wire.wait_for_sent(0, 2).await;
    assert_eq!(h.handle.view().borrow().len(), 1);

    assert!(h.wire.push(0, receive("alice@x", "bob@x", "hi")));

    let mut view = h.handle.view();
    timeout(WAIT, view.wait_for(|v| v.messages.first().is_some_and(|m| m.confirmed)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.borrow().len(), 1);
}

#[tokio::test]
async fn peer_message_with_identical_body_is_a_distinct_entry() {
    let h = alice_session();
    h.handle.set_peer(Some("bob@x".into())).unwrap();
    h.wire.wait_for_epochs(1).await;

    h.handle.send("hi").await.unwrap();
    assert!(h.wire.push(0, receive("bob@x", "alice@x", "hi")));

    let mut view = h.handle.view();
    timeout(WAIT, view.wait_for(|v| v.len() == 2))
        .await
        .unwrap()
        .unwrap();
    // The local send is still unconfirmed; the peer's message did not
    // swallow its echo slot.
    assert!(!view.borrow().messages[0].confirmed);
}

#[tokio::test]
async fn messages_for_other_keys_are_never_admitted() {
    let h = alice_session();
    h.handle.set_peer(Some("bob@x".into())).unwrap();
    h.wire.wait_for_epochs(1).await;

    assert!(h.wire.push(0, receive("alice@x", "carol@x", "wrong pair")));
    assert!(h.wire.push(0, receive("carol@x", "dave@x", "unrelated")));
    assert!(h.wire.push(0, receive("bob@x", "alice@x", "ours")));

    let mut view = h.handle.view();
    timeout(WAIT, view.wait_for(|v| v.len() == 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.borrow().messages[0].body, "ours");
}

#[tokio::test]
async fn late_history_for_the_old_peer_does_not_populate_the_new_view() {
    let h = alice_session();
    let old_key = key("alice@x", "bob@x");
    h.history.put(&old_key, vec![record("bob@x", "alice@x", "stale")]);
    h.history.hold(&old_key);

    h.handle.set_peer(Some("bob@x".into())).unwrap();
    // Navigate away while the first fetch is still pending.
    h.handle.set_peer(Some("carol@x".into())).unwrap();
    h.history.release(&old_key);

    // Give the stale fetch ample time to resolve and be discarded.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.handle.view().borrow().is_empty());

    // The new conversation still works.
    h.handle.send("fresh").await.unwrap();
    let mut view = h.handle.view();
    timeout(WAIT, view.wait_for(|v| v.len() == 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.borrow().messages[0].body, "fresh");
}

#[tokio::test]
async fn reconnect_rejoins_with_the_key_current_at_reconnect_time() {
    let h = alice_session();
    h.handle.set_peer(Some("bob@x".into())).unwrap();
    h.wire.wait_for_epochs(1).await;

    // The connection dies and the user switches peers during the outage.
    h.wire.sever(0);
    h.handle.set_peer(Some("carol@x".into())).unwrap();

    // Whatever epochs the race produces, the newest join announces carol.
    let target = ClientFrame::Join {
        sender: "alice@x".into(),
        receiver: "carol@x".into(),
    };
    timeout(WAIT, async {
        loop {
            let count = h.wire.epoch_count();
            if count > 1 {
                let sent = h.wire.sent(count - 1);
                if sent.first() == Some(&target) {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn history_failure_is_nonfatal() {
    let wire = ScriptedWire::new();
    let (_identity, identity_rx) = watch::channel(Some(ParticipantId::from("alice@x")));
    let handle = ChatSession::spawn(wire.clone(), FailingHistory, identity_rx, fast_config());

    handle.set_peer(Some("bob@x".into())).unwrap();
    wire.wait_for_epochs(1).await;

    // The backlog failed, but sending and receiving still work.
    handle.send("still alive").await.unwrap();
    assert!(wire.push(0, receive("bob@x", "alice@x", "indeed")));

    let mut view = handle.view();
    timeout(WAIT, view.wait_for(|v| v.len() == 2))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn sign_out_tears_down_the_conversation() {
    let h = alice_session();
    h.handle.set_peer(Some("bob@x".into())).unwrap();
    h.wire.wait_for_epochs(1).await;
    h.handle.send("hello").await.unwrap();

    h.identity.send(None).unwrap();
    let mut view = h.handle.view();
    timeout(WAIT, view.wait_for(|v| v.is_empty()))
        .await
        .unwrap()
        .unwrap();

    let err = h.handle.send("anyone?").await.unwrap_err();
    assert!(matches!(err, SyncError::AuthRequired));
}
