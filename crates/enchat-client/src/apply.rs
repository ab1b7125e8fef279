//! The authoritative transition function.
//!
//! Every participant, the sender included, feeds the same relay-ordered
//! envelope stream through [`RoomState::apply`]. Given identical input the
//! resulting state is identical, which is the only coordination the room has.
//! Re-applying an envelope must never change the outcome.
//!
//! Starter checks here are cooperative: anyone holding the room key can forge
//! a `LOTTERY_WINNER` or `POLL_CLOSE` under the starter's name. Clients only
//! agree to ignore the ones that visibly come from someone else.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use enchat_net::{Connectivity, Envelope, Inbound, RelayOp};
use enchat_shared::constants::MAX_POLL_OPTIONS;
use enchat_shared::protocol::{FileBundle, FileChunk, FileMetadata, PollSpec};
use enchat_shared::{EnvelopeKind, SystemMessage};

use crate::state::{FileRecord, LineBody, Lottery, Poll, RoomState};

impl RoomState {
    /// Route one item from the network layer.
    pub fn apply_inbound(&mut self, inbound: &Inbound, local_nick: &str) {
        match inbound {
            Inbound::Envelope(envelope) => self.apply(envelope, local_nick),
            Inbound::Undecryptable { relay_id, reason } => {
                self.undecryptable += 1;
                debug!(%relay_id, reason, "Recording undecryptable envelope");
                self.transcript
                    .push("?", LineBody::Undecryptable, false, Utc::now());
            }
            Inbound::Connectivity { op, status } => self.set_connectivity(*op, status),
            Inbound::Dropped { op, reason } => {
                warn!(op = *op, %reason, "Outbound operation dropped");
                self.transcript.notice(format!("Not sent ({op}): {reason}"));
            }
        }
    }

    pub fn apply(&mut self, envelope: &Envelope, local_nick: &str) {
        let body = &envelope.body;
        let sender = body.sender.as_str();
        let at = DateTime::<Utc>::from_timestamp(envelope.relay_time, 0).unwrap_or(body.ts);

        match body.kind {
            EnvelopeKind::Chat => {
                self.roster.insert(sender.to_string(), at);
                self.transcript.push(
                    sender,
                    LineBody::Chat(body.text.clone()),
                    sender == local_nick,
                    at,
                );
            }
            EnvelopeKind::Sys => match SystemMessage::parse(&body.text) {
                Ok(SystemMessage::Left) => {
                    if self.roster.remove(sender).is_some() {
                        self.transcript.notice(format!("{sender} left the room"));
                    }
                }
                Ok(message) => {
                    self.roster.insert(sender.to_string(), at);
                    self.apply_system(sender, message);
                }
                Err(e) => debug!(sender, error = %e, "Ignoring unknown system message"),
            },
        }
    }

    fn apply_system(&mut self, sender: &str, message: SystemMessage) {
        match message {
            SystemMessage::Joined => {
                self.transcript.notice(format!("{sender} joined the room"));
            }
            SystemMessage::Heartbeat | SystemMessage::Left => {}
            SystemMessage::RoomCleanup => {
                self.transcript.clear();
                self.transcript
                    .notice(format!("Chat history was cleared by {sender}"));
            }
            SystemMessage::LotteryStart => self.lottery_start(sender),
            SystemMessage::LotteryEnter => self.lottery_enter(sender),
            SystemMessage::LotteryWinner(winner) => self.lottery_winner(sender, &winner),
            SystemMessage::LotteryCancel => self.lottery_cancel(sender),
            SystemMessage::PollStart(spec) => self.poll_start(sender, spec),
            SystemMessage::PollVote(index) => self.poll_vote(sender, index),
            SystemMessage::PollClose => self.poll_close(sender),
            SystemMessage::FileTransfer(FileBundle { metadata, chunks }) => {
                self.file_metadata(sender, metadata);
                for chunk in chunks {
                    self.file_chunk(sender, chunk);
                }
            }
            SystemMessage::FileMeta(metadata) => self.file_metadata(sender, metadata),
            SystemMessage::FileChunk(chunk) => self.file_chunk(sender, chunk),
            SystemMessage::FileDownload(file_id) => {
                let name = self
                    .files
                    .get(&file_id)
                    .map_or(file_id.as_str(), FileRecord::display_name)
                    .to_string();
                self.transcript.notice(format!("{sender} downloaded {name}"));
            }
        }
    }

    fn lottery_start(&mut self, sender: &str) {
        if self.lottery.is_some() {
            debug!(sender, "Lottery already running, ignoring start");
            return;
        }
        self.lottery = Some(Lottery {
            starter: sender.to_string(),
            participants: Default::default(),
        });
        info!(starter = sender, "Lottery started");
        self.transcript
            .notice(format!("{sender} started a lottery! Type /lottery enter to join"));
    }

    fn lottery_enter(&mut self, sender: &str) {
        let Some(lottery) = self.lottery.as_mut() else {
            return;
        };
        if lottery.participants.insert(sender.to_string()) {
            let count = lottery.participants.len();
            self.transcript
                .notice(format!("{sender} entered the lottery ({count} participants)"));
        }
    }

    fn lottery_winner(&mut self, sender: &str, winner: &str) {
        let Some(lottery) = self.lottery.as_ref() else {
            return;
        };
        if lottery.starter != sender {
            warn!(sender, starter = %lottery.starter, "Ignoring lottery draw from non-starter");
            return;
        }
        if !lottery.participants.contains(winner) {
            warn!(sender, winner, "Ignoring lottery winner who never entered");
            return;
        }

        self.lottery = None;
        self.last_winner = Some(winner.to_string());
        info!(winner, "Lottery resolved");
        self.transcript
            .notice(format!("The lottery winner is {winner}!"));
    }

    fn lottery_cancel(&mut self, sender: &str) {
        let Some(lottery) = self.lottery.as_ref() else {
            return;
        };
        if lottery.starter != sender {
            warn!(sender, starter = %lottery.starter, "Ignoring lottery cancel from non-starter");
            return;
        }
        self.lottery = None;
        self.transcript
            .notice(format!("The lottery was cancelled by {sender}"));
    }

    fn poll_start(&mut self, sender: &str, spec: PollSpec) {
        if self.poll.is_some() {
            debug!(sender, "Poll already running, ignoring start");
            return;
        }
        if spec.question.trim().is_empty() || !(2..=MAX_POLL_OPTIONS).contains(&spec.options.len()) {
            warn!(sender, options = spec.options.len(), "Ignoring invalid poll");
            return;
        }

        let mut notice = format!("{sender} started a poll: {}", spec.question);
        for (i, option) in spec.options.iter().enumerate() {
            notice.push_str(&format!("\n  {}. {option}", i + 1));
        }
        notice.push_str("\nUse /vote <number> to vote");

        self.poll = Some(Poll {
            starter: sender.to_string(),
            question: spec.question,
            options: spec.options,
            votes: Default::default(),
        });
        self.transcript.notice(notice);
    }

    /// Last vote wins: the voter moves out of every other option.
    fn poll_vote(&mut self, sender: &str, index: usize) {
        let Some(poll) = self.poll.as_mut() else {
            return;
        };
        if index >= poll.options.len() {
            warn!(sender, index, "Ignoring vote for unknown option");
            return;
        }
        if poll.vote_of(sender) == Some(index) {
            return;
        }

        for voters in poll.votes.values_mut() {
            voters.remove(sender);
        }
        poll.votes.retain(|_, voters| !voters.is_empty());
        poll.votes.entry(index).or_default().insert(sender.to_string());
        debug!(sender, index, "Poll vote recorded");
    }

    fn poll_close(&mut self, sender: &str) {
        let Some(poll) = self.poll.as_ref() else {
            return;
        };
        if poll.starter != sender {
            warn!(sender, starter = %poll.starter, "Ignoring poll close from non-starter");
            return;
        }

        let mut notice = format!("Poll closed by {sender}: {}", poll.question);
        for (option, count) in poll.tally() {
            notice.push_str(&format!("\n  {option}: {count} votes"));
        }
        notice.push_str(&format!("\nTotal votes: {}", poll.voter_count()));

        self.poll = None;
        self.transcript.notice(notice);
    }

    fn file_metadata(&mut self, sender: &str, metadata: FileMetadata) {
        let record = self.file_entry(&metadata.file_id, sender);
        if record.metadata.is_some() {
            return;
        }

        let total = metadata.total_chunks;
        record.chunks.retain(|n, _| *n < total);
        record.sender = sender.to_string();
        let notice = format!(
            "{sender} is sharing {} ({} bytes, {} chunks). File ID: {}",
            metadata.filename, metadata.size, total, metadata.file_id
        );
        record.metadata = Some(metadata);
        let file_id = record.file_id.clone();

        self.transcript.notice(notice);
        self.check_file_completion(&file_id);
    }

    fn file_chunk(&mut self, sender: &str, chunk: FileChunk) {
        let record = self.file_entry(&chunk.file_id, sender);
        if record.complete {
            return;
        }
        if record.total_chunks().is_some_and(|total| chunk.chunk_num >= total) {
            warn!(file_id = %chunk.file_id, chunk = chunk.chunk_num, "Ignoring out-of-range chunk");
            return;
        }

        record.chunks.insert(chunk.chunk_num, chunk.data);
        let file_id = chunk.file_id;
        self.check_file_completion(&file_id);
    }

    fn check_file_completion(&mut self, file_id: &str) {
        let Some(record) = self.files.get_mut(file_id) else {
            return;
        };
        if record.complete || !record.is_assemblable() {
            return;
        }

        record.complete = true;
        info!(file_id, chunks = record.chunks_received(), "File transfer complete");
        let notice = format!(
            "{} is ready. Use /download {}",
            record.display_name(),
            record.file_id
        );
        self.transcript.notice(notice);
    }

    /// Publishing and polling are tracked apart. Only a change between
    /// online and offline is announced, whatever the offline reason.
    fn set_connectivity(&mut self, op: RelayOp, status: &Connectivity) {
        let current = self.connectivity_mut(op);
        let unchanged = matches!(
            (&*current, status),
            (Connectivity::Online, Connectivity::Online)
                | (Connectivity::Offline(_), Connectivity::Offline(_))
        );
        if unchanged {
            return;
        }
        *current = status.clone();

        let notice = match (op, status) {
            (RelayOp::Poll, Connectivity::Online) => "Connection to the relay restored".to_string(),
            (RelayOp::Poll, Connectivity::Offline(reason)) => {
                format!("Relay unreachable, retrying ({reason})")
            }
            (RelayOp::Publish, Connectivity::Online) => "Sending to the relay works again".to_string(),
            (RelayOp::Publish, Connectivity::Offline(reason)) => {
                format!("Sending to the relay failed, retrying ({reason})")
            }
        };
        self.transcript.notice(notice);
    }
}
