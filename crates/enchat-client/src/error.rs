use std::path::PathBuf;

use thiserror::Error;

use enchat_net::NetError;
use enchat_shared::{CryptoError, LinkError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("File transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("Unknown public room '{0}'. Available: {1}")]
    UnknownPublicRoom(String, String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("File too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("File ID '{0}' not found. Use /files")]
    UnknownFile(String),

    #[error("Already saved to {}", .0.display())]
    AlreadySaved(PathBuf),

    #[error("File not complete ({received}/{total})")]
    Incomplete { received: usize, total: usize },

    #[error("File details for '{0}' have not arrived yet")]
    MissingMetadata(String),

    #[error("Integrity check failed for '{file_id}': {reason}")]
    Integrity { file_id: String, reason: String },

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A command rejected against the local snapshot. Nothing is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntentError {
    #[error("A lottery is already running in this room")]
    LotteryActive,

    #[error("There is no active lottery")]
    NoLottery,

    #[error("You have already entered the lottery")]
    AlreadyEntered,

    #[error("Only the lottery starter ({0}) can do that")]
    NotLotteryStarter(String),

    #[error("There are no participants in the lottery")]
    NoParticipants,

    #[error("A poll is already running in this room. Close it first with /poll close")]
    PollActive,

    #[error("There is no active poll")]
    NoPoll,

    #[error("Only the poll starter ({0}) can close it")]
    NotPollStarter(String),

    #[error("Invalid choice. Use a number between 1 and {0}")]
    InvalidChoice(usize),

    #[error("A poll needs a question and at least {0} options")]
    TooFewOptions(usize),

    #[error("Maximum of {0} options allowed")]
    TooManyOptions(usize),

    #[error("Not available in public rooms")]
    PublicRoom,

    #[error("Message too long: {size} bytes once encrypted (max {max})")]
    TooLong { size: usize, max: usize },

    #[error("This will clear chat history for everyone. Type '/clean-chat confirm' to proceed")]
    NeedsConfirmation,
}

/// A command line that does not parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: /{0}. Use /help to see available commands")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid value for {flag}: '{value}'")]
    InvalidArgument { flag: &'static str, value: String },

    #[error("{0}")]
    Link(#[from] LinkError),
}
