//! In-process relay used by tests and local simulations.
//!
//! Behaves like a single ntfy topic: ids are assigned in arrival order and
//! `fetch_since` returns everything after the cursor. The same message size
//! limit as a real ntfy server applies. Failures and
//! redeliveries can be injected to exercise retry and deduplication paths.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use enchat_shared::constants::MAX_RELAY_MESSAGE_BYTES;

use crate::error::NetError;
use crate::relay::{Cursor, Relay, RelayMessage};

#[derive(Default)]
pub struct MemoryRelay {
    messages: Mutex<Vec<RelayMessage>>,
    next_id: AtomicU64,
    publish_attempts: AtomicU64,
    failing_publishes: AtomicU32,
    failing_fetches: AtomicU32,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw text message as if some client had published it.
    pub fn push_raw(&self, text: &str) -> String {
        let id = format!("m{:06}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let message = RelayMessage {
            id: id.clone(),
            time: Utc::now().timestamp(),
            text: text.to_string(),
        };
        self.lock().push(message);
        id
    }

    /// Deliver an already stored message a second time, keeping its id.
    pub fn redeliver(&self, id: &str) -> bool {
        let mut messages = self.lock();
        let Some(copy) = messages.iter().find(|m| m.id == id).cloned() else {
            return false;
        };
        messages.push(copy);
        true
    }

    pub fn messages(&self) -> Vec<RelayMessage> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Make the next `n` publishes fail with a transport error.
    pub fn fail_next_publishes(&self, n: u32) {
        self.failing_publishes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` fetches fail with a transport error.
    pub fn fail_next_fetches(&self, n: u32) {
        self.failing_fetches.store(n, Ordering::SeqCst);
    }

    /// Publish calls seen so far, failed ones included.
    pub fn publish_attempts(&self) -> u64 {
        self.publish_attempts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RelayMessage>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn publish(&self, text: &str) -> Result<(), NetError> {
        self.publish_attempts.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_publishes) {
            return Err(NetError::Unavailable("injected publish failure".into()));
        }
        if text.len() > MAX_RELAY_MESSAGE_BYTES {
            return Err(NetError::TooLarge {
                size: text.len(),
                max: MAX_RELAY_MESSAGE_BYTES,
            });
        }
        self.push_raw(text);
        Ok(())
    }

    async fn fetch_since(&self, cursor: &Cursor) -> Result<Vec<RelayMessage>, NetError> {
        if take_failure(&self.failing_fetches) {
            return Err(NetError::Unavailable("injected fetch failure".into()));
        }

        let messages = self.lock();
        let selected = match cursor {
            Cursor::All => messages.clone(),
            Cursor::Since(time) => messages.iter().filter(|m| m.time >= *time).cloned().collect(),
            Cursor::After(id) => match messages.iter().rposition(|m| &m.id == id) {
                Some(pos) => messages[pos + 1..].to_vec(),
                None => messages.clone(),
            },
        };
        Ok(selected)
    }

    async fn health(&self) -> Result<(), NetError> {
        Ok(())
    }

    fn server_url(&self) -> &str {
        "memory://relay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_after_cursor() {
        let relay = MemoryRelay::new();
        let first = relay.push_raw("one");
        relay.push_raw("two");
        relay.push_raw("three");

        let all = relay.fetch_since(&Cursor::All).await.unwrap();
        assert_eq!(all.len(), 3);

        let after = relay.fetch_since(&Cursor::After(first)).await.unwrap();
        let texts: Vec<_> = after.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["two", "three"]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let relay = MemoryRelay::new();
        relay.fail_next_publishes(2);

        assert!(relay.publish("a").await.is_err());
        assert!(relay.publish("a").await.is_err());
        assert!(relay.publish("a").await.is_ok());
        assert_eq!(relay.publish_attempts(), 3);
        assert_eq!(relay.len(), 1);

        relay.fail_next_fetches(1);
        assert!(relay.fetch_since(&Cursor::All).await.is_err());
        assert!(relay.fetch_since(&Cursor::All).await.is_ok());
    }

    #[tokio::test]
    async fn test_enforces_message_size_limit() {
        let relay = MemoryRelay::new();
        assert!(relay.publish(&"a".repeat(MAX_RELAY_MESSAGE_BYTES)).await.is_ok());
        let err = relay
            .publish(&"a".repeat(MAX_RELAY_MESSAGE_BYTES + 1))
            .await
            .unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(relay.len(), 1);
    }

    #[tokio::test]
    async fn test_redeliver_keeps_id() {
        let relay = MemoryRelay::new();
        let id = relay.push_raw("hello");
        assert!(relay.redeliver(&id));
        assert!(!relay.redeliver("missing"));

        let all = relay.messages();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, all[1].id);
    }
}
