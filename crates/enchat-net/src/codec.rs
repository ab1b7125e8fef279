//! Layered envelope sealing.
//!
//! On the wire every relay message is a small JSON object:
//!
//! ```text
//! {"v":1,"ct":"<token>"}                      room layer only
//! {"v":1,"sk":"<token>","ct":"<token>"}       room layer wrapped by a session layer
//! ```
//!
//! With a session layer, `ct` is the room-key ciphertext encrypted again under
//! the sender's current session key, and `sk` is that session key encrypted
//! under the room key. Any room-key holder can therefore peel both layers
//! from a single envelope.
//!
//! A sealed envelope never exceeds [`MAX_RELAY_MESSAGE_BYTES`]; larger bodies
//! are refused before they reach the relay.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use enchat_shared::constants::{
    MAX_RELAY_MESSAGE_BYTES, NONCE_SIZE, SYMMETRIC_KEY_SIZE, TAG_SIZE, WIRE_VERSION,
};
use enchat_shared::crypto::{self, key_from_slice};
use enchat_shared::{DecodeError, EnchatError, EnvelopeBody, RoomKey, SessionKeyStore};

#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    v: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sk: Option<String>,
    ct: String,
}

/// A decoded envelope together with the relay's ordering marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub relay_id: String,
    pub relay_time: i64,
    pub body: EnvelopeBody,
}

pub struct EnvelopeCodec {
    room: String,
    room_key: RoomKey,
    sessions: Arc<SessionKeyStore>,
    session_layer: bool,
}

impl EnvelopeCodec {
    pub fn new(
        room: impl Into<String>,
        room_key: RoomKey,
        sessions: Arc<SessionKeyStore>,
        session_layer: bool,
    ) -> Self {
        Self {
            room: room.into(),
            room_key,
            sessions,
            session_layer,
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn room_key(&self) -> &RoomKey {
        &self.room_key
    }

    pub fn sessions(&self) -> &SessionKeyStore {
        &self.sessions
    }

    pub fn session_layer(&self) -> bool {
        self.session_layer
    }

    /// Exact length of the text [`EnvelopeCodec::seal`] produces for `body`.
    /// Ciphertext sizes depend only on plaintext sizes, so nothing is
    /// encrypted here.
    pub fn sealed_len(&self, body: &EnvelopeBody) -> Result<usize, EnchatError> {
        let room_layer = sealed_bytes(body.to_json()?.len());
        let frame = WireEnvelope {
            v: WIRE_VERSION,
            sk: self.session_layer.then(String::new),
            ct: String::new(),
        };
        let frame_len = serde_json::to_string(&frame)?.len();

        Ok(if self.session_layer {
            frame_len + token_len(sealed_bytes(SYMMETRIC_KEY_SIZE)) + token_len(sealed_bytes(room_layer))
        } else {
            frame_len + token_len(room_layer)
        })
    }

    /// Refuse bodies whose envelope would not fit in one relay message.
    pub fn check_size(&self, body: &EnvelopeBody) -> Result<(), EnchatError> {
        let size = self.sealed_len(body)?;
        if size > MAX_RELAY_MESSAGE_BYTES {
            return Err(EnchatError::TooLarge {
                size,
                max: MAX_RELAY_MESSAGE_BYTES,
            });
        }
        Ok(())
    }

    /// Encrypt a body into the text published on the relay.
    pub fn seal(&self, body: &EnvelopeBody) -> Result<String, EnchatError> {
        let plaintext = body.to_json()?;
        let room_layer = crypto::encrypt(self.room_key.as_bytes(), &plaintext)?;

        let wire = if self.session_layer {
            let session_key = self.sessions.current_or_rotate(&self.room);
            WireEnvelope {
                v: WIRE_VERSION,
                sk: Some(crypto::encrypt_token(self.room_key.as_bytes(), &session_key)?),
                ct: crypto::encrypt_token(&session_key, &room_layer)?,
            }
        } else {
            WireEnvelope {
                v: WIRE_VERSION,
                sk: None,
                ct: URL_SAFE_NO_PAD.encode(room_layer),
            }
        };

        let text = serde_json::to_string(&wire)?;
        if text.len() > MAX_RELAY_MESSAGE_BYTES {
            return Err(EnchatError::TooLarge {
                size: text.len(),
                max: MAX_RELAY_MESSAGE_BYTES,
            });
        }
        Ok(text)
    }

    /// Peel every layer of a relay message. Never panics on hostile input.
    pub fn open(&self, text: &str) -> Result<EnvelopeBody, DecodeError> {
        let wire: WireEnvelope = serde_json::from_str(text)
            .map_err(|e| DecodeError::Malformed(format!("not an envelope: {e}")))?;
        if wire.v != WIRE_VERSION {
            return Err(DecodeError::Malformed(format!("unsupported version {}", wire.v)));
        }

        let ciphertext = decode_b64(&wire.ct)?;
        let room_layer = match wire.sk {
            Some(sealed_key) => {
                let key_bytes = crypto::decrypt(self.room_key.as_bytes(), &decode_b64(&sealed_key)?)
                    .map_err(|_| DecodeError::Undecryptable("session key"))?;
                let session_key =
                    key_from_slice(&key_bytes).map_err(|_| DecodeError::Undecryptable("session key"))?;
                crypto::decrypt(&session_key, &ciphertext)
                    .map_err(|_| DecodeError::Undecryptable("session layer"))?
            }
            None => ciphertext,
        };

        let plaintext = crypto::decrypt(self.room_key.as_bytes(), &room_layer)
            .map_err(|_| DecodeError::Undecryptable("room layer"))?;

        let body = EnvelopeBody::from_json(&plaintext)
            .map_err(|e| DecodeError::Malformed(format!("bad body: {e}")))?;
        debug!(sender = %body.sender, kind = ?body.kind, "Opened envelope");
        Ok(body)
    }
}

/// Nonce and tag around `plaintext_len` bytes.
fn sealed_bytes(plaintext_len: usize) -> usize {
    NONCE_SIZE + plaintext_len + TAG_SIZE
}

/// Unpadded base64url length of `bytes` bytes.
fn token_len(bytes: usize) -> usize {
    base64::encoded_len(bytes, false).unwrap_or(usize::MAX)
}

fn decode_b64(token: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| DecodeError::Malformed("invalid base64".into()))
}
