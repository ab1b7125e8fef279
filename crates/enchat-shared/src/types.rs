use serde::{Deserialize, Serialize};

use crate::constants::KDF_CONTEXT_TOPIC;
use crate::crypto::{derive_room_key, SymmetricKey};

/// Everything needed to join a room: the room name, the relay it lives on
/// and the shared passphrase.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCredentials {
    pub room: String,
    pub server_url: String,
    pub secret: String,
}

impl RoomCredentials {
    pub fn new(
        room: impl Into<String>,
        server_url: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            room: room.into(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        }
    }

    /// Derive the long-lived room key. This is slow on purpose.
    pub fn room_key(&self) -> RoomKey {
        RoomKey::derive(&self.room, &self.secret)
    }
}

impl std::fmt::Debug for RoomCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomCredentials")
            .field("room", &self.room)
            .field("server_url", &self.server_url)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The symmetric key derived from `(room_name, passphrase)`.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomKey(SymmetricKey);

impl RoomKey {
    pub fn derive(room: &str, passphrase: &str) -> Self {
        Self(derive_room_key(room, passphrase))
    }

    pub fn from_bytes(bytes: SymmetricKey) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &SymmetricKey {
        &self.0
    }
}

impl std::fmt::Debug for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RoomKey(<redacted>)")
    }
}

/// Relay topic for a room. The room name itself never reaches the relay.
pub fn room_topic(room: &str) -> String {
    let hash = blake3::derive_key(KDF_CONTEXT_TOPIC, room.as_bytes());
    format!("enchat-{}", hex::encode(&hash[..16]))
}
