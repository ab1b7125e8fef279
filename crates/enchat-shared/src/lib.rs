//! # enchat-shared
//!
//! Types and cryptography shared by every enchat participant: room key
//! derivation, the AEAD used for both encryption layers, the rotating session
//! key store, the envelope body and system message vocabulary, and the
//! credential payload carried by share links.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod session_key;
pub mod share_link;
pub mod types;

pub use error::{CryptoError, DecodeError, EnchatError, LinkError, ProtocolError};
pub use protocol::{EnvelopeBody, EnvelopeKind, SystemMessage};
pub use session_key::SessionKeyStore;
pub use types::{RoomCredentials, RoomKey};
