//! Room state shared between the apply task, the command layer and the
//! renderer.
//!
//! [`RoomState`] holds everything reconstructed from the relayed envelope
//! stream. It sits behind [`StateStore`], which hands out closures over a read
//! guard or full snapshots, so a renderer never observes a half-applied
//! envelope.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use enchat_net::{Connectivity, RelayOp};
use enchat_shared::constants::{MAX_TRACKED_FILES, TRANSCRIPT_LIMIT};
use enchat_shared::protocol::FileMetadata;

/// Sender shown on locally generated transcript lines.
pub const SYSTEM_SENDER: &str = "System";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineBody {
    Chat(String),
    Notice(String),
    /// An envelope that arrived but could not be opened with our keys.
    Undecryptable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    /// Monotonic across the whole session, including after a clear.
    pub seq: u64,
    pub sender: String,
    pub body: LineBody,
    pub is_mine: bool,
    pub at: DateTime<Utc>,
}

/// Bounded display buffer.
#[derive(Debug, Clone)]
pub struct Transcript {
    lines: VecDeque<TranscriptLine>,
    next_seq: u64,
    limit: usize,
}

impl Transcript {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            next_seq: 1,
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, sender: &str, body: LineBody, is_mine: bool, at: DateTime<Utc>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.lines.push_back(TranscriptLine {
            seq,
            sender: sender.to_string(),
            body,
            is_mine,
            at,
        });
        while self.lines.len() > self.limit {
            self.lines.pop_front();
        }
        seq
    }

    pub fn notice(&mut self, text: impl Into<String>) -> u64 {
        self.push(SYSTEM_SENDER, LineBody::Notice(text.into()), false, Utc::now())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> impl Iterator<Item = &TranscriptLine> {
        self.lines.iter()
    }

    /// Lines with a sequence number greater than `seq`.
    pub fn since(&self, seq: u64) -> Vec<TranscriptLine> {
        self.lines.iter().filter(|l| l.seq > seq).cloned().collect()
    }

    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `(sent, received)` chat line counts.
    pub fn chat_counts(&self) -> (usize, usize) {
        self.lines
            .iter()
            .filter(|l| matches!(l.body, LineBody::Chat(_)))
            .fold((0, 0), |(mine, theirs), l| {
                if l.is_mine {
                    (mine + 1, theirs)
                } else {
                    (mine, theirs + 1)
                }
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lottery {
    pub starter: String,
    pub participants: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    pub starter: String,
    pub question: String,
    pub options: Vec<String>,
    /// Option index to the nicks currently voting for it.
    pub votes: BTreeMap<usize, BTreeSet<String>>,
}

impl Poll {
    pub fn tally(&self) -> Vec<(&str, usize)> {
        self.options
            .iter()
            .enumerate()
            .map(|(i, option)| (option.as_str(), self.votes.get(&i).map_or(0, BTreeSet::len)))
            .collect()
    }

    pub fn voter_count(&self) -> usize {
        self.votes.values().map(BTreeSet::len).sum()
    }

    pub fn vote_of(&self, nick: &str) -> Option<usize> {
        self.votes
            .iter()
            .find_map(|(index, voters)| voters.contains(nick).then_some(*index))
    }
}

/// An in-flight or completed incoming file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub file_id: String,
    pub sender: String,
    pub metadata: Option<FileMetadata>,
    /// Encrypted chunk payloads by chunk number. Emptied once saved.
    pub chunks: BTreeMap<u32, String>,
    pub complete: bool,
    /// Local path of a finished download.
    pub saved_to: Option<PathBuf>,
}

impl FileRecord {
    pub fn new(file_id: &str, sender: &str) -> Self {
        Self {
            file_id: file_id.to_string(),
            sender: sender.to_string(),
            metadata: None,
            chunks: BTreeMap::new(),
            complete: false,
            saved_to: None,
        }
    }

    /// Drop the chunk buffer after a successful save. The record stays
    /// complete, so redelivered chunks are still ignored.
    pub fn release(&mut self, saved_to: PathBuf) {
        self.chunks = BTreeMap::new();
        self.saved_to = Some(saved_to);
    }

    pub fn chunks_received(&self) -> usize {
        self.chunks.len()
    }

    pub fn total_chunks(&self) -> Option<u32> {
        self.metadata.as_ref().map(|m| m.total_chunks)
    }

    /// True once metadata is known and every chunk `0..total` is present.
    pub fn is_assemblable(&self) -> bool {
        match self.total_chunks() {
            Some(total) => {
                self.chunks.len() == total as usize && (0..total).all(|n| self.chunks.contains_key(&n))
            }
            None => false,
        }
    }

    pub fn display_name(&self) -> &str {
        self.metadata
            .as_ref()
            .map_or(self.file_id.as_str(), |m| m.filename.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    /// Nick to the relay time of their most recent envelope.
    pub roster: BTreeMap<String, DateTime<Utc>>,
    pub lottery: Option<Lottery>,
    pub last_winner: Option<String>,
    pub poll: Option<Poll>,
    pub files: BTreeMap<String, FileRecord>,
    pub transcript: Transcript,
    /// Last reported state of outbound publishing.
    pub sending: Connectivity,
    /// Last reported state of inbound polling.
    pub receiving: Connectivity,
    pub undecryptable: u64,
    /// File ids in first-seen order, oldest first.
    file_order: VecDeque<String>,
}

impl RoomState {
    pub fn new(transcript_limit: usize) -> Self {
        Self {
            roster: BTreeMap::new(),
            lottery: None,
            last_winner: None,
            poll: None,
            files: BTreeMap::new(),
            transcript: Transcript::new(transcript_limit),
            sending: Connectivity::Online,
            receiving: Connectivity::Online,
            undecryptable: 0,
            file_order: VecDeque::new(),
        }
    }

    pub fn connectivity(&self, op: RelayOp) -> &Connectivity {
        match op {
            RelayOp::Publish => &self.sending,
            RelayOp::Poll => &self.receiving,
        }
    }

    pub(crate) fn connectivity_mut(&mut self, op: RelayOp) -> &mut Connectivity {
        match op {
            RelayOp::Publish => &mut self.sending,
            RelayOp::Poll => &mut self.receiving,
        }
    }

    /// The record for `file_id`, created on first sight. Creating one past
    /// [`MAX_TRACKED_FILES`] forgets the oldest record, so every participant
    /// evicts the same ids.
    pub(crate) fn file_entry(&mut self, file_id: &str, sender: &str) -> &mut FileRecord {
        if !self.files.contains_key(file_id) {
            self.file_order.push_back(file_id.to_string());
            while self.file_order.len() > MAX_TRACKED_FILES {
                if let Some(oldest) = self.file_order.pop_front() {
                    self.files.remove(&oldest);
                    debug!(file_id = %oldest, "Forgetting oldest file record");
                }
            }
        }
        self.files
            .entry(file_id.to_string())
            .or_insert_with(|| FileRecord::new(file_id, sender))
    }
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new(TRANSCRIPT_LIMIT)
    }
}

/// Handle to the single [`RoomState`] of a session.
#[derive(Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<RoomState>>,
}

impl StateStore {
    pub fn new(state: RoomState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&RoomState) -> R) -> R {
        f(&self.read_guard())
    }

    pub fn snapshot(&self) -> RoomState {
        self.read_guard().clone()
    }

    /// Mutate the state. Shared room state is only changed by the apply task;
    /// the command layer uses this for the local transcript.
    pub fn write<R>(&self, f: impl FnOnce(&mut RoomState) -> R) -> R {
        f(&mut self.write_guard())
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, RoomState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, RoomState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
