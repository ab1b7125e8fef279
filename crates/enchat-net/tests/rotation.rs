//! A peer keeps reading a sender across session key rotations, through the
//! real outbox and listener over the in-memory relay.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};

use enchat_net::{
    spawn_listener, spawn_outbox, EnvelopeCodec, Inbound, ListenerConfig, MemoryRelay,
    OutboundOp, OutboxConfig,
};
use enchat_shared::{RoomKey, SessionKeyStore};

const ROOM: &str = "rotation-room";

fn codec(sessions: Arc<SessionKeyStore>) -> Arc<EnvelopeCodec> {
    Arc::new(EnvelopeCodec::new(ROOM, RoomKey::from_bytes([5u8; 32]), sessions, true))
}

fn sealed_session_key(wire: &str) -> String {
    let parsed: Value = serde_json::from_str(wire).unwrap();
    parsed["sk"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_peer_reads_across_rotations() {
    let relay = Arc::new(MemoryRelay::new());
    let sender_sessions = Arc::new(SessionKeyStore::with_interval(Duration::from_millis(150)));
    let (stop_tx, stop_rx) = watch::channel(false);

    let (outbox, outbox_task) = spawn_outbox(
        relay.clone(),
        codec(sender_sessions.clone()),
        "alice".into(),
        OutboxConfig::default(),
        None,
        stop_rx.clone(),
    );

    outbox.enqueue(OutboundOp::Chat("before".into())).unwrap();
    outbox.join().await;
    let first_key = sender_sessions.current(ROOM).unwrap();

    // Explicit rotation.
    sender_sessions.rotate(ROOM);
    outbox.enqueue(OutboundOp::Chat("after rotate".into())).unwrap();
    outbox.join().await;
    let second_key = sender_sessions.current(ROOM).unwrap();
    assert_ne!(first_key, second_key);

    // Rotation by age on the next seal.
    tokio::time::sleep(Duration::from_millis(200)).await;
    outbox.enqueue(OutboundOp::Chat("after expiry".into())).unwrap();
    outbox.join().await;
    assert_ne!(sender_sessions.current(ROOM).unwrap(), second_key);

    let wires: Vec<String> = relay.messages().into_iter().map(|m| m.text).collect();
    assert_eq!(wires.len(), 3);
    let keys: Vec<String> = wires.iter().map(|w| sealed_session_key(w)).collect();
    assert_ne!(keys[0], keys[1]);
    assert_ne!(keys[1], keys[2]);

    // The peer has never seen any of alice's session keys.
    let peer_sessions = Arc::new(SessionKeyStore::new());
    let (tx, mut rx) = mpsc::channel(16);
    let listener_task = spawn_listener(
        relay.clone(),
        codec(peer_sessions.clone()),
        ListenerConfig {
            poll_interval: Duration::from_millis(10),
            ..ListenerConfig::default()
        },
        tx,
        stop_rx,
    );

    let mut received = Vec::new();
    while received.len() < 3 {
        let item = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("listener produced nothing")
            .expect("listener channel closed");
        match item {
            Inbound::Envelope(envelope) => {
                assert_eq!(envelope.body.sender, "alice");
                received.push(envelope.body.text);
            }
            Inbound::Connectivity { .. } => {}
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(received, ["before", "after rotate", "after expiry"]);
    assert!(peer_sessions.current(ROOM).is_none());

    stop_tx.send(true).unwrap();
    outbox_task.await.unwrap();
    listener_task.await.unwrap();
}
