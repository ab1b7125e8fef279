//! Outbound delivery queue.
//!
//! Callers enqueue whole operations without blocking. One drain worker seals
//! and publishes them in enqueue order, retrying failed publishes with
//! exponential back-off until they succeed or the worker is aborted. A file
//! transfer is one operation even though it goes out as many envelopes.
//!
//! An envelope that cannot be sealed, or that the relay refuses for good, is
//! dropped and reported as [`Inbound::Dropped`] instead of retried.
//!
//! [`Outbox::join`] resolves once every enqueued operation has been handled,
//! which is what lets shutdown guarantee the final `left` is sent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use enchat_shared::protocol::FileBundle;
use enchat_shared::{EnvelopeBody, SystemMessage};

use crate::codec::EnvelopeCodec;
use crate::error::NetError;
use crate::listener::{Connectivity, Inbound, RelayOp};
use crate::relay::Relay;

/// One logical outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundOp {
    Chat(String),
    System(SystemMessage),
    FileTransfer(FileBundle),
}

impl OutboundOp {
    /// Split into envelope bodies, in the order they must be published.
    fn into_bodies(self, nick: &str) -> Vec<EnvelopeBody> {
        match self {
            Self::Chat(text) => vec![EnvelopeBody::chat(nick, text)],
            Self::System(message) => vec![EnvelopeBody::system(nick, &message)],
            Self::FileTransfer(bundle) => {
                let mut bodies = Vec::with_capacity(bundle.chunks.len() + 1);
                bodies.push(EnvelopeBody::system(nick, &SystemMessage::FileMeta(bundle.metadata)));
                for chunk in bundle.chunks {
                    bodies.push(EnvelopeBody::system(nick, &SystemMessage::FileChunk(chunk)));
                }
                bodies
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Chat(_) => "chat",
            Self::System(message) => message.token(),
            Self::FileTransfer(_) => "FILE_TRANSFER",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Handle for enqueueing operations and waiting for the queue to drain.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundOp>,
    pending: Arc<watch::Sender<usize>>,
}

impl Outbox {
    pub fn enqueue(&self, op: OutboundOp) -> Result<(), NetError> {
        self.pending.send_modify(|n| *n += 1);
        if self.tx.send(op).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(NetError::QueueClosed);
        }
        Ok(())
    }

    /// Operations enqueued but not yet handled by the worker.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until every enqueued operation has been attempted.
    pub async fn join(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so this only ends once the count is zero.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// [`Outbox::join`] bounded by `timeout`. Returns false if it expired.
    pub async fn join_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.join()).await.is_ok()
    }
}

/// Spawn the drain worker. The worker stops when `abort` turns true or every
/// [`Outbox`] handle is dropped.
pub fn spawn_outbox(
    relay: Arc<dyn Relay>,
    codec: Arc<EnvelopeCodec>,
    nick: String,
    config: OutboxConfig,
    status: Option<mpsc::Sender<Inbound>>,
    abort: watch::Receiver<bool>,
) -> (Outbox, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(watch::Sender::new(0usize));

    let worker = DrainWorker {
        relay,
        codec,
        nick,
        config,
        status,
        abort,
        pending: pending.clone(),
        offline: false,
    };
    let handle = tokio::spawn(worker.run(rx));

    (Outbox { tx, pending }, handle)
}

struct DrainWorker {
    relay: Arc<dyn Relay>,
    codec: Arc<EnvelopeCodec>,
    nick: String,
    config: OutboxConfig,
    status: Option<mpsc::Sender<Inbound>>,
    abort: watch::Receiver<bool>,
    pending: Arc<watch::Sender<usize>>,
    offline: bool,
}

enum Delivery {
    Sent,
    /// Given up on without publishing; retrying cannot help.
    Rejected(String),
    Aborted,
}

impl DrainWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<OutboundOp>) {
        info!("Outbound worker started");

        loop {
            let op = tokio::select! {
                biased;
                _ = wait_abort(&mut self.abort) => break,
                op = rx.recv() => match op {
                    Some(op) => op,
                    None => break,
                },
            };

            let delivery = self.deliver(op).await;
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            if matches!(delivery, Delivery::Aborted) {
                break;
            }
        }

        // Anything still queued is dropped; release waiters.
        rx.close();
        while rx.try_recv().is_ok() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
        }
        info!("Outbound worker stopped");
    }

    async fn deliver(&mut self, op: OutboundOp) -> Delivery {
        let label = op.label();
        let bodies = op.into_bodies(&self.nick);
        let envelopes = bodies.len();
        let mut rejected: Option<(usize, String)> = None;

        for body in bodies {
            let delivery = match self.codec.seal(&body) {
                Ok(wire) => self.publish_with_retry(label, &wire).await,
                Err(e) => {
                    error!(op = label, error = %e, "Failed to seal envelope, dropping it");
                    Delivery::Rejected(e.to_string())
                }
            };
            match delivery {
                Delivery::Sent => {}
                Delivery::Rejected(reason) => match &mut rejected {
                    Some((count, _)) => *count += 1,
                    None => rejected = Some((1, reason)),
                },
                Delivery::Aborted => {
                    warn!(op = label, "Outbound delivery aborted by shutdown");
                    return Delivery::Aborted;
                }
            }
        }

        match rejected {
            Some((count, reason)) => {
                let reason = if envelopes > 1 {
                    format!("{count} of {envelopes} envelopes dropped: {reason}")
                } else {
                    reason
                };
                self.report(Inbound::Dropped {
                    op: label,
                    reason: reason.clone(),
                })
                .await;
                Delivery::Rejected(reason)
            }
            None => {
                debug!(op = label, envelopes, "Outbound operation delivered");
                Delivery::Sent
            }
        }
    }

    async fn publish_with_retry(&mut self, label: &'static str, wire: &str) -> Delivery {
        let mut backoff = self.config.initial_backoff;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.relay.publish(wire).await {
                Ok(()) => {
                    self.set_offline(false, None).await;
                    return Delivery::Sent;
                }
                Err(e) if e.is_permanent() => {
                    error!(op = label, error = %e, "Relay refused envelope, dropping it");
                    return Delivery::Rejected(e.to_string());
                }
                Err(e) => {
                    warn!(op = label, attempt, error = %e, "Relay publish failed, retrying");
                    self.set_offline(true, Some(e.to_string())).await;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = wait_abort(&mut self.abort) => return Delivery::Aborted,
            }
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }

    async fn set_offline(&mut self, offline: bool, reason: Option<String>) {
        if self.offline == offline {
            return;
        }
        self.offline = offline;

        let status = if offline {
            Connectivity::Offline(reason.unwrap_or_default())
        } else {
            Connectivity::Online
        };
        self.report(Inbound::Connectivity {
            op: RelayOp::Publish,
            status,
        })
        .await;
    }

    async fn report(&self, item: Inbound) {
        if let Some(status) = &self.status {
            let _ = status.send(item).await;
        }
    }
}

/// Resolves once the abort flag is raised or its sender is gone.
pub(crate) async fn wait_abort(abort: &mut watch::Receiver<bool>) {
    let _ = abort.wait_for(|stop| *stop).await;
}
