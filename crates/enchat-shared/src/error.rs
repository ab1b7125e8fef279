use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnchatError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Message too large for the relay: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid key length")]
    InvalidKeyLength,
}

/// A system payload that could not be understood.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Empty system message")]
    Empty,

    #[error("Unknown system message: {0}")]
    UnknownToken(String),

    #[error("Missing argument for {0}")]
    MissingArgument(&'static str),

    #[error("Malformed {token} payload: {reason}")]
    MalformedPayload { token: &'static str, reason: String },
}

/// Why a relay message could not be turned into an envelope body.
///
/// `Malformed` means the text is not one of ours at all (foreign traffic on
/// the topic, truncated JSON, bad base64). `Undecryptable` means it has our
/// shape but fails authentication under the keys we hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Undecryptable envelope: {0}")]
    Undecryptable(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Malformed share link")]
    MalformedUrl,

    #[error("Base64 decode error")]
    Base64Decode,

    #[error("Failed to decrypt room details; the link may be corrupt")]
    Decrypt,

    #[error("Invalid credential payload")]
    InvalidPayload,

    #[error("This link may have expired or has already been used")]
    ExpiredOrUsed,

    #[error("Invalid time format '{0}'. Use '10m', '2h', '1d'")]
    InvalidTtl(String),
}
