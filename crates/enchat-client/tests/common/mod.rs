#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use enchat_client::{ChatSession, ClientConfig, SessionOptions, StateStore};
use enchat_net::{Cursor, Envelope, MemoryRelay, OutboxConfig};
use enchat_shared::crypto;
use enchat_shared::protocol::{FileBundle, FileChunk, FileMetadata};
use enchat_shared::{EnvelopeBody, RoomCredentials, RoomKey, SystemMessage};

pub const ROOM: &str = "test-room";
pub const SECRET: &str = "correct horse battery staple";

/// Relay-ordered stream builder: ids and times increase with each push.
#[derive(Default)]
pub struct Stream {
    envelopes: Vec<Envelope>,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chat(&mut self, sender: &str, text: &str) -> &mut Self {
        self.push(EnvelopeBody::chat(sender, text))
    }

    pub fn sys(&mut self, sender: &str, message: SystemMessage) -> &mut Self {
        self.push(EnvelopeBody::system(sender, &message))
    }

    pub fn push(&mut self, body: EnvelopeBody) -> &mut Self {
        let n = self.envelopes.len() as i64;
        self.envelopes.push(Envelope {
            relay_id: format!("m{n:06}"),
            relay_time: 1_700_000_000 + n,
            body,
        });
        self
    }

    pub fn envelopes(&self) -> &[Envelope] {
        &self.envelopes
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.envelopes)
    }
}

/// Split `data` into a bundle the way the sending side does.
pub fn bundle(file_id: &str, filename: &str, data: &[u8], chunk_size: usize, key: &RoomKey) -> FileBundle {
    let chunks: Vec<FileChunk> = data
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, block)| FileChunk {
            file_id: file_id.to_string(),
            chunk_num: i as u32,
            data: crypto::encrypt_token(key.as_bytes(), block).unwrap(),
        })
        .collect();
    FileBundle {
        metadata: FileMetadata {
            file_id: file_id.to_string(),
            filename: filename.to_string(),
            size: data.len() as u64,
            total_chunks: chunks.len() as u32,
            hash: blake3::hash(data).to_hex().to_string(),
        },
        chunks,
    }
}

pub fn fast_config(downloads: &std::path::Path) -> ClientConfig {
    ClientConfig {
        poll_interval: Duration::from_millis(20),
        downloads_dir: downloads.to_path_buf(),
        shutdown_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    }
}

pub fn fast_options() -> SessionOptions {
    SessionOptions {
        listener_start: Some(Cursor::All),
        outbox: OutboxConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        },
        ..SessionOptions::default()
    }
}

pub async fn join(relay: &Arc<MemoryRelay>, nick: &str, downloads: &std::path::Path) -> ChatSession {
    let creds = RoomCredentials::new(ROOM, "memory://relay", SECRET);
    ChatSession::start_with(
        fast_config(downloads),
        creds,
        nick.to_string(),
        false,
        relay.clone(),
        fast_options(),
    )
    .await
    .unwrap()
}

/// Poll the store until `check` holds or five seconds pass.
pub async fn wait_until(store: &StateStore, check: impl Fn(&enchat_client::RoomState) -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if store.read(&check) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
