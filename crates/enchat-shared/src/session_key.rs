//! Rotating per-room session keys.
//!
//! A session key lives only in memory. The sealing side asks
//! [`SessionKeyStore::current_or_rotate`] before every envelope, so a key is
//! replaced lazily once it is older than the rotation interval. Receivers
//! never need this store: every session-layered envelope carries its session
//! key sealed under the room key.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::constants::SESSION_KEY_ROTATION_SECS;
use crate::crypto::{generate_symmetric_key, SymmetricKey};

#[derive(Clone)]
struct SessionKey {
    key: SymmetricKey,
    created_at: Instant,
}

pub struct SessionKeyStore {
    sessions: Mutex<HashMap<String, SessionKey>>,
    rotation_interval: Duration,
}

impl SessionKeyStore {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(SESSION_KEY_ROTATION_SECS))
    }

    pub fn with_interval(rotation_interval: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            rotation_interval,
        }
    }

    pub fn rotation_interval(&self) -> Duration {
        self.rotation_interval
    }

    /// Replace the room's key with a fresh one and return it.
    pub fn rotate(&self, room: &str) -> SymmetricKey {
        let key = generate_symmetric_key();
        self.set(room, key);
        debug!(room = %room, "Rotated session key");
        key
    }

    pub fn set(&self, room: &str, key: SymmetricKey) {
        let mut sessions = self.lock();
        sessions.insert(
            room.to_string(),
            SessionKey {
                key,
                created_at: Instant::now(),
            },
        );
    }

    pub fn current(&self, room: &str) -> Option<SymmetricKey> {
        self.lock().get(room).map(|s| s.key)
    }

    /// True when no key exists or the key has outlived the rotation interval.
    pub fn should_rotate(&self, room: &str) -> bool {
        match self.lock().get(room) {
            None => true,
            Some(session) => session.created_at.elapsed() > self.rotation_interval,
        }
    }

    pub fn current_or_rotate(&self, room: &str) -> SymmetricKey {
        let mut sessions = self.lock();
        if let Some(session) = sessions.get(room) {
            if session.created_at.elapsed() <= self.rotation_interval {
                return session.key;
            }
        }

        let key = generate_symmetric_key();
        sessions.insert(
            room.to_string(),
            SessionKey {
                key,
                created_at: Instant::now(),
            },
        );
        debug!(room = %room, "Rotated session key");
        key
    }

    pub fn age(&self, room: &str) -> Option<Duration> {
        self.lock().get(room).map(|s| s.created_at.elapsed())
    }

    /// Time left before the current key is replaced, if one exists.
    pub fn rotation_due_in(&self, room: &str) -> Option<Duration> {
        self.age(room)
            .map(|age| self.rotation_interval.saturating_sub(age))
    }

    pub fn forget(&self, room: &str) {
        self.lock().remove(room);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionKey>> {
        // A poisoned map only ever holds fully written entries.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SessionKeyStore {
    fn default() -> Self {
        Self::new()
    }
}
