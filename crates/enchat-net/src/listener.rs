//! Relay polling loop.
//!
//! Polls the room topic, opens every new message and hands the results to a
//! single consumer over an mpsc channel. The consumer is the only place where
//! room state changes, so the listener itself holds nothing but its cursor and
//! a bounded set of ids it has already forwarded.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use enchat_shared::DecodeError;

use crate::codec::{Envelope, EnvelopeCodec};
use crate::outbox::wait_abort;
use crate::relay::{Cursor, Relay, RelayMessage};

/// Relay reachability as seen by the network tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline(String),
}

/// Which side of the relay conversation a connectivity report is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelayOp {
    Publish,
    Poll,
}

/// Everything the network layer reports to the state owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Envelope(Envelope),
    /// A well-formed envelope that none of our keys could open.
    Undecryptable {
        relay_id: String,
        reason: &'static str,
    },
    Connectivity {
        op: RelayOp,
        status: Connectivity,
    },
    /// An outbound operation that was given up on without being published.
    Dropped {
        op: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub poll_interval: Duration,
    pub max_backoff: Duration,
    /// Where the first poll starts reading.
    pub start: Cursor,
    /// How many forwarded relay ids are remembered for deduplication.
    pub seen_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            start: Cursor::All,
            seen_capacity: 4096,
        }
    }
}

/// Bounded FIFO set of relay ids.
struct SeenIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false if the id was already present.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }
}

pub fn spawn_listener(
    relay: Arc<dyn Relay>,
    codec: Arc<EnvelopeCodec>,
    config: ListenerConfig,
    tx: mpsc::Sender<Inbound>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let listener = Listener {
        relay,
        codec,
        cursor: config.start.clone(),
        seen: SeenIds::new(config.seen_capacity),
        config,
        tx,
        offline: false,
    };
    tokio::spawn(listener.run(shutdown))
}

struct Listener {
    relay: Arc<dyn Relay>,
    codec: Arc<EnvelopeCodec>,
    config: ListenerConfig,
    cursor: Cursor,
    seen: SeenIds,
    tx: mpsc::Sender<Inbound>,
    offline: bool,
}

impl Listener {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(server = %self.relay.server_url(), room = %self.codec.room(), "Listener started");
        let mut delay = Duration::ZERO;

        loop {
            tokio::select! {
                _ = wait_abort(&mut shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let fetched = tokio::select! {
                _ = wait_abort(&mut shutdown) => break,
                fetched = self.relay.fetch_since(&self.cursor) => fetched,
            };

            delay = match fetched {
                Ok(messages) => {
                    if self.report(Connectivity::Online).await.is_err() {
                        break;
                    }
                    if self.forward(messages).await.is_err() {
                        break;
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    warn!(error = %e, "Relay poll failed");
                    if self.report(Connectivity::Offline(e.to_string())).await.is_err() {
                        break;
                    }
                    next_backoff(delay, self.config.poll_interval, self.config.max_backoff)
                }
            };
        }

        info!("Listener stopped");
    }

    async fn forward(&mut self, messages: Vec<RelayMessage>) -> Result<(), ()> {
        for message in messages {
            self.cursor = Cursor::After(message.id.clone());
            if !self.seen.insert(&message.id) {
                debug!(id = %message.id, "Skipping redelivered message");
                continue;
            }

            let inbound = match self.codec.open(&message.text) {
                Ok(body) => Inbound::Envelope(Envelope {
                    relay_id: message.id,
                    relay_time: message.time,
                    body,
                }),
                Err(DecodeError::Undecryptable(reason)) => {
                    warn!(id = %message.id, reason, "Envelope not decryptable with our keys");
                    Inbound::Undecryptable {
                        relay_id: message.id,
                        reason,
                    }
                }
                Err(DecodeError::Malformed(reason)) => {
                    debug!(id = %message.id, %reason, "Ignoring malformed relay message");
                    continue;
                }
            };

            self.tx.send(inbound).await.map_err(|_| ())?;
        }
        Ok(())
    }

    /// Send a connectivity change; repeated states are not re-sent.
    async fn report(&mut self, status: Connectivity) -> Result<(), ()> {
        let offline = matches!(status, Connectivity::Offline(_));
        if offline == self.offline {
            return Ok(());
        }
        self.offline = offline;
        match &status {
            Connectivity::Online => info!("Relay reachable again"),
            Connectivity::Offline(reason) => warn!(%reason, "Relay unreachable"),
        }
        self.tx
            .send(Inbound::Connectivity {
                op: RelayOp::Poll,
                status,
            })
            .await
            .map_err(|_| ())
    }
}

/// Doubling back-off starting at the poll interval, capped at `max`.
fn next_backoff(current: Duration, poll_interval: Duration, max: Duration) -> Duration {
    let base = current.max(poll_interval);
    if current < poll_interval {
        base.min(max)
    } else {
        (base * 2).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRelay;
    use enchat_shared::crypto::generate_symmetric_key;
    use enchat_shared::{EnvelopeBody, RoomKey, SessionKeyStore};

    fn codec(key: [u8; 32]) -> Arc<EnvelopeCodec> {
        Arc::new(EnvelopeCodec::new(
            "room",
            RoomKey::from_bytes(key),
            Arc::new(SessionKeyStore::new()),
            true,
        ))
    }

    fn fast() -> ListenerConfig {
        ListenerConfig {
            poll_interval: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            ..ListenerConfig::default()
        }
    }

    async fn next_envelope(rx: &mut mpsc::Receiver<Inbound>) -> Inbound {
        loop {
            let item = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("listener produced nothing")
                .expect("listener channel closed");
            if !matches!(item, Inbound::Connectivity { status: Connectivity::Online, .. }) {
                return item;
            }
        }
    }

    #[test]
    fn test_seen_ids_evicts_oldest() {
        let mut seen = SeenIds::new(2);
        assert!(seen.insert("a"));
        assert!(seen.insert("b"));
        assert!(!seen.insert("a"));
        assert!(seen.insert("c"));
        assert!(seen.insert("a"));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let poll = Duration::from_secs(2);
        let max = Duration::from_secs(10);
        let first = next_backoff(Duration::ZERO, poll, max);
        assert_eq!(first, poll);
        let second = next_backoff(first, poll, max);
        assert_eq!(second, Duration::from_secs(4));
        assert_eq!(next_backoff(Duration::from_secs(8), poll, max), max);
    }

    #[tokio::test]
    async fn test_forwards_once_and_flags_foreign_keys() {
        let key = generate_symmetric_key();
        let ours = codec(key);
        let relay = Arc::new(MemoryRelay::new());

        let id = relay.push_raw(&ours.seal(&EnvelopeBody::chat("bob", "hello")).unwrap());
        relay.redeliver(&id);
        relay.push_raw("not an envelope");
        let foreign = codec(generate_symmetric_key());
        relay.push_raw(&foreign.seal(&EnvelopeBody::chat("eve", "x")).unwrap());

        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_listener(relay.clone(), ours, fast(), tx, stop_rx);

        match next_envelope(&mut rx).await {
            Inbound::Envelope(env) => {
                assert_eq!(env.relay_id, id);
                assert_eq!(env.body.text, "hello");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            next_envelope(&mut rx).await,
            Inbound::Undecryptable { reason: "session key", .. }
        ));

        relay.push_raw(&codec(key).seal(&EnvelopeBody::chat("bob", "again")).unwrap());
        match next_envelope(&mut rx).await {
            Inbound::Envelope(env) => assert_eq!(env.body.text, "again"),
            other => panic!("unexpected {other:?}"),
        }

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_reports_offline_then_online() {
        let relay = Arc::new(MemoryRelay::new());
        relay.fail_next_fetches(2);

        let (tx, mut rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_listener(relay, codec(generate_symmetric_key()), fast(), tx, stop_rx);

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(
            first,
            Some(Inbound::Connectivity {
                op: RelayOp::Poll,
                status: Connectivity::Offline(_)
            })
        ));
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(
            second,
            Some(Inbound::Connectivity {
                op: RelayOp::Poll,
                status: Connectivity::Online
            })
        );

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
