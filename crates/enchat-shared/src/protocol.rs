use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Whether an envelope carries chat text or a system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Chat,
    Sys,
}

/// The decrypted content of one relay envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeBody {
    pub kind: EnvelopeKind,
    /// Display name chosen by the sender. Only as trustworthy as the room key.
    pub sender: String,
    pub ts: DateTime<Utc>,
    pub text: String,
}

impl EnvelopeBody {
    pub fn chat(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Chat,
            sender: sender.into(),
            ts: Utc::now(),
            text: text.into(),
        }
    }

    pub fn system(sender: impl Into<String>, message: &SystemMessage) -> Self {
        Self {
            kind: EnvelopeKind::Sys,
            sender: sender.into(),
            ts: Utc::now(),
            text: message.to_wire(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Question and options announced by `POLL_START`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSpec {
    pub question: String,
    pub options: Vec<String>,
}

/// Describes a shared file. `hash` is the hex BLAKE3 digest of the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub total_chunks: u32,
    pub hash: String,
}

/// One encrypted block of a shared file. `data` is a room-key token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    pub file_id: String,
    pub chunk_num: u32,
    pub data: String,
}

/// Metadata plus every chunk of a file, enqueued as one outbound operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBundle {
    pub metadata: FileMetadata,
    pub chunks: Vec<FileChunk>,
}

/// Every system message a participant may send. The first word of the
/// payload is a case-sensitive token; arguments follow after one space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemMessage {
    Joined,
    Left,
    Heartbeat,
    RoomCleanup,
    LotteryStart,
    LotteryEnter,
    LotteryWinner(String),
    LotteryCancel,
    PollStart(PollSpec),
    PollVote(usize),
    PollClose,
    FileTransfer(FileBundle),
    FileMeta(FileMetadata),
    FileChunk(FileChunk),
    FileDownload(String),
}

impl SystemMessage {
    pub fn token(&self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Left => "left",
            Self::Heartbeat => "HEARTBEAT",
            Self::RoomCleanup => "ROOM_CLEANUP",
            Self::LotteryStart => "LOTTERY_START",
            Self::LotteryEnter => "LOTTERY_ENTER",
            Self::LotteryWinner(_) => "LOTTERY_WINNER",
            Self::LotteryCancel => "LOTTERY_CANCEL",
            Self::PollStart(_) => "POLL_START",
            Self::PollVote(_) => "POLL_VOTE",
            Self::PollClose => "POLL_CLOSE",
            Self::FileTransfer(_) => "FILE_TRANSFER",
            Self::FileMeta(_) => "FILE_META",
            Self::FileChunk(_) => "FILE_CHUNK",
            Self::FileDownload(_) => "FILE_DOWNLOAD",
        }
    }

    pub fn to_wire(&self) -> String {
        let token = self.token();
        match self {
            Self::LotteryWinner(nick) => format!("{token} {nick}"),
            Self::PollVote(index) => format!("{token} {index}"),
            Self::FileDownload(file_id) => format!("{token} {file_id}"),
            Self::PollStart(spec) => format!("{token} {}", to_json(spec)),
            Self::FileTransfer(bundle) => format!("{token} {}", to_json(bundle)),
            Self::FileMeta(metadata) => format!("{token} {}", to_json(metadata)),
            Self::FileChunk(chunk) => format!("{token} {}", to_json(chunk)),
            _ => token.to_string(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim_start();
        if text.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let (token, rest) = match text.split_once(' ') {
            Some((token, rest)) => (token, rest.trim()),
            None => (text.trim_end(), ""),
        };

        let message = match token {
            "joined" => Self::Joined,
            "left" => Self::Left,
            "HEARTBEAT" => Self::Heartbeat,
            "ROOM_CLEANUP" => Self::RoomCleanup,
            "LOTTERY_START" => Self::LotteryStart,
            "LOTTERY_ENTER" => Self::LotteryEnter,
            "LOTTERY_CANCEL" => Self::LotteryCancel,
            "POLL_CLOSE" => Self::PollClose,
            "LOTTERY_WINNER" => Self::LotteryWinner(required("LOTTERY_WINNER", rest)?.to_string()),
            "FILE_DOWNLOAD" => Self::FileDownload(required("FILE_DOWNLOAD", rest)?.to_string()),
            "POLL_VOTE" => {
                let raw = required("POLL_VOTE", rest)?;
                let index = raw
                    .parse::<usize>()
                    .map_err(|e| malformed("POLL_VOTE", e.to_string()))?;
                Self::PollVote(index)
            }
            "POLL_START" => Self::PollStart(from_json("POLL_START", rest)?),
            "FILE_TRANSFER" => Self::FileTransfer(from_json("FILE_TRANSFER", rest)?),
            "FILE_META" => Self::FileMeta(from_json("FILE_META", rest)?),
            "FILE_CHUNK" => Self::FileChunk(from_json("FILE_CHUNK", rest)?),
            other => return Err(ProtocolError::UnknownToken(other.to_string())),
        };
        Ok(message)
    }
}

fn required<'a>(token: &'static str, rest: &'a str) -> Result<&'a str, ProtocolError> {
    if rest.is_empty() {
        Err(ProtocolError::MissingArgument(token))
    } else {
        Ok(rest)
    }
}

fn malformed(token: &'static str, reason: String) -> ProtocolError {
    ProtocolError::MalformedPayload { token, reason }
}

fn from_json<T: for<'de> Deserialize<'de>>(
    token: &'static str,
    rest: &str,
) -> Result<T, ProtocolError> {
    let raw = required(token, rest)?;
    serde_json::from_str(raw).map_err(|e| malformed(token, e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> String {
    // Plain data structs with string keys always serialize.
    serde_json::to_string(value).unwrap_or_default()
}
