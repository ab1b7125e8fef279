//! One joined room: the background tasks, the state they feed and the
//! handle the input loop drives.
//!
//! Four tasks run per session: the outbound drain worker, the inbound
//! listener, the apply task that owns every state transition, and a
//! heartbeat. They share one shutdown channel. [`ChatSession::shutdown`]
//! sends `left`, waits for the outbound queue to drain, then raises the
//! shutdown flag and joins every task.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use enchat_net::{
    spawn_listener, spawn_outbox, Cursor, EnvelopeCodec, Inbound, LinkBroker, ListenerConfig,
    OutboundOp, Outbox, OutboxConfig, Relay,
};
use enchat_shared::constants::{MAX_NICK_LEN, TRANSCRIPT_LIMIT};
use enchat_shared::{
    EnchatError, EnvelopeBody, RoomCredentials, RoomKey, SessionKeyStore, SystemMessage,
};

use crate::commands::{self, Command, Reaction};
use crate::config::ClientConfig;
use crate::error::{ClientError, IntentError};
use crate::file_transfer::TransferLimits;
use crate::state::{RoomState, StateStore};

const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Knobs that only tests need to turn.
#[derive(Clone)]
pub struct SessionOptions {
    pub listener_start: Option<Cursor>,
    pub outbox: OutboxConfig,
    pub sessions: Option<Arc<SessionKeyStore>>,
    pub transcript_limit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            listener_start: None,
            outbox: OutboxConfig::default(),
            sessions: None,
            transcript_limit: TRANSCRIPT_LIMIT,
        }
    }
}

pub struct ChatSession {
    pub(crate) nick: String,
    pub(crate) creds: RoomCredentials,
    pub(crate) public: bool,
    pub(crate) config: ClientConfig,
    pub(crate) store: StateStore,
    pub(crate) codec: Arc<EnvelopeCodec>,
    pub(crate) relay: Arc<dyn Relay>,
    pub(crate) outbox: Outbox,
    pub(crate) broker: LinkBroker,
    pub(crate) last_link: Mutex<Option<String>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ChatSession {
    pub async fn start(
        config: ClientConfig,
        creds: RoomCredentials,
        nick: String,
        public: bool,
        relay: Arc<dyn Relay>,
    ) -> Result<Self, ClientError> {
        Self::start_with(config, creds, nick, public, relay, SessionOptions::default()).await
    }

    pub async fn start_with(
        config: ClientConfig,
        creds: RoomCredentials,
        nick: String,
        public: bool,
        relay: Arc<dyn Relay>,
        options: SessionOptions,
    ) -> Result<Self, ClientError> {
        if nick.trim().is_empty() {
            return Err(ClientError::MissingSetting("nick"));
        }
        if nick.chars().count() > MAX_NICK_LEN {
            return Err(ClientError::InvalidSetting {
                name: "nick",
                reason: format!("at most {MAX_NICK_LEN} characters"),
            });
        }
        let joined_at = Utc::now();

        // PBKDF2 with a high iteration count; keep it off the runtime threads.
        let key_creds = creds.clone();
        let room_key = tokio::task::spawn_blocking(move || key_creds.room_key()).await?;
        info!(room = %creds.room, public, "Derived room key");

        let sessions = options
            .sessions
            .unwrap_or_else(|| Arc::new(SessionKeyStore::new()));
        let codec = Arc::new(EnvelopeCodec::new(
            creds.room.clone(),
            room_key,
            sessions,
            !public,
        ));
        let store = StateStore::new(RoomState::new(options.transcript_limit));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        let (outbox, outbox_task) = spawn_outbox(
            relay.clone(),
            codec.clone(),
            nick.clone(),
            options.outbox,
            Some(inbound_tx.clone()),
            shutdown_rx.clone(),
        );

        let listener_config = ListenerConfig {
            poll_interval: config.poll_interval,
            start: options
                .listener_start
                .unwrap_or(Cursor::Since(joined_at.timestamp())),
            ..ListenerConfig::default()
        };
        let listener_task = spawn_listener(
            relay.clone(),
            codec.clone(),
            listener_config,
            inbound_tx,
            shutdown_rx.clone(),
        );

        let apply_task = spawn_apply(store.clone(), nick.clone(), inbound_rx, shutdown_rx.clone());
        let heartbeat_task = spawn_heartbeat(outbox.clone(), config.heartbeat_interval, shutdown_rx);

        let broker = LinkBroker::new(&config.link_server_url, &config.http_options())?;
        let session = Self {
            nick,
            creds,
            public,
            config,
            store,
            codec,
            relay,
            outbox,
            broker,
            last_link: Mutex::new(None),
            shutdown: shutdown_tx,
            tasks: vec![
                ("outbox", outbox_task),
                ("listener", listener_task),
                ("apply", apply_task),
                ("heartbeat", heartbeat_task),
            ],
        };

        session.notice(format!(
            "Joined room '{}' as {} on {}",
            session.creds.room,
            session.nick,
            session.relay.server_url()
        ));
        session.send(OutboundOp::System(SystemMessage::Joined));
        Ok(session)
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn room(&self) -> &str {
        &self.creds.room
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub(crate) fn room_key(&self) -> &RoomKey {
        self.codec.room_key()
    }

    pub(crate) fn transfer_limits(&self) -> TransferLimits {
        TransferLimits {
            max_file_size: self.config.max_file_size,
            chunk_size: self.config.chunk_size,
        }
    }

    /// Parse and run one input line.
    pub async fn handle_line(&self, line: &str) -> Reaction {
        match Command::parse(line) {
            Ok(Some(command)) => commands::execute(self, command).await,
            Ok(None) => Reaction::Continue,
            Err(e) => {
                self.notice(e.to_string());
                Reaction::Continue
            }
        }
    }

    /// Add a local-only line to the transcript.
    pub(crate) fn notice(&self, text: impl Into<String>) {
        let text = text.into();
        self.store.write(|s| s.transcript.notice(text));
    }

    /// Enqueue an outbound operation, reporting a closed queue or an
    /// oversized message locally.
    pub(crate) fn send(&self, op: OutboundOp) -> bool {
        if let Err(e) = self.check_size(&op) {
            self.notice(e.to_string());
            return false;
        }
        match self.outbox.enqueue(op) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Dropping outbound operation");
                self.notice(format!("Not sent: {e}"));
                false
            }
        }
    }

    /// Refuse single-envelope operations that would not fit one relay
    /// message. File chunks are sized by configuration instead.
    fn check_size(&self, op: &OutboundOp) -> Result<(), IntentError> {
        let body = match op {
            OutboundOp::Chat(text) => EnvelopeBody::chat(self.nick.as_str(), text.as_str()),
            OutboundOp::System(message) => EnvelopeBody::system(self.nick.as_str(), message),
            OutboundOp::FileTransfer(_) => return Ok(()),
        };
        match self.codec.check_size(&body) {
            Err(EnchatError::TooLarge { size, max }) => {
                debug!(size, max, "Refusing oversized message");
                Err(IntentError::TooLong { size, max })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn set_last_link(&self, url: String) {
        let mut guard = self.last_link.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(url);
    }

    pub(crate) fn last_link(&self) -> Option<String> {
        self.last_link
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Announce departure, drain the outbound queue and stop every task.
    pub async fn shutdown(self) {
        info!(room = %self.creds.room, "Leaving room");
        self.send(OutboundOp::System(SystemMessage::Left));

        if !self.outbox.join_timeout(self.config.shutdown_timeout).await {
            warn!(
                pending = self.outbox.pending(),
                timeout = ?self.config.shutdown_timeout,
                "Outbound queue did not drain before the shutdown timeout"
            );
        }

        let _ = self.shutdown.send(true);
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Session task failed");
            }
        }
        info!("Session closed");
    }
}

/// The only writer of shared room state from network input. Items are
/// applied one at a time in the order the listener forwarded them.
fn spawn_apply(
    store: StateStore,
    nick: String,
    mut rx: mpsc::Receiver<Inbound>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let inbound = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                inbound = rx.recv() => match inbound {
                    Some(inbound) => inbound,
                    None => break,
                },
            };
            store.write(|state| state.apply_inbound(&inbound, &nick));
        }
        debug!("Apply task stopped");
    })
}

fn spawn_heartbeat(
    outbox: Outbox,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; `joined` already covers it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = ticker.tick() => {
                    if outbox.enqueue(OutboundOp::System(SystemMessage::Heartbeat)).is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Heartbeat task stopped");
    })
}
