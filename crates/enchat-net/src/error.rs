use thiserror::Error;

use enchat_shared::{CryptoError, EnchatError, LinkError};

#[derive(Error, Debug)]
pub enum NetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Message of {size} bytes exceeds the relay limit of {max}")]
    TooLarge { size: usize, max: usize },

    #[error("Relay unavailable: {0}")]
    Unavailable(String),

    #[error("Outbound queue closed")]
    QueueClosed,

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnchatError),
}

impl NetError {
    /// Errors that retrying the same request can never fix.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::TooLarge { .. })
    }
}
