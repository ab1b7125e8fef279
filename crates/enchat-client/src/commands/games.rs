use enchat_net::OutboundOp;
use enchat_shared::SystemMessage;

use crate::commands::{LotteryAction, PollAction};
use crate::error::IntentError;
use crate::intent;
use crate::session::ChatSession;
use crate::state::RoomState;

const LOTTERY_HELP: &str = "=== Lottery ===
  /lottery start: Start a new lottery
  /lottery enter: Join the active lottery
  /lottery status: Show participants
  /lottery draw: Pick a winner (starter only)
  /lottery cancel: Cancel the lottery (starter only)";

/// Publish the message from a passing check, or show why it failed.
fn submit(session: &ChatSession, checked: Result<SystemMessage, IntentError>) {
    match checked {
        Ok(message) => {
            session.send(OutboundOp::System(message));
        }
        Err(e) => session.notice(e.to_string()),
    }
}

pub fn lottery(session: &ChatSession, action: LotteryAction) {
    let nick = session.nick.as_str();
    match action {
        LotteryAction::Start => submit(session, session.store.read(intent::lottery_start)),
        LotteryAction::Enter => submit(session, session.store.read(|s| intent::lottery_enter(s, nick))),
        LotteryAction::Draw => {
            let mut rng = rand::thread_rng();
            submit(session, session.store.read(|s| intent::lottery_draw(s, nick, &mut rng)));
        }
        LotteryAction::Cancel => submit(session, session.store.read(|s| intent::lottery_cancel(s, nick))),
        LotteryAction::Status => {
            let text = session.store.read(lottery_status);
            session.notice(text);
        }
        LotteryAction::Help => session.notice(LOTTERY_HELP),
    }
}

fn lottery_status(state: &RoomState) -> String {
    let mut text = String::from("=== Lottery ===");
    match &state.lottery {
        Some(lottery) => {
            text.push_str(&format!("\n  Started by: {}", lottery.starter));
            text.push_str(&format!("\n  Participants ({}):", lottery.participants.len()));
            for participant in &lottery.participants {
                text.push_str(&format!("\n    {participant}"));
            }
        }
        None => text.push_str("\n  No active lottery"),
    }
    if let Some(winner) = &state.last_winner {
        text.push_str(&format!("\n  Last winner: {winner}"));
    }
    text
}

pub fn poll(session: &ChatSession, action: PollAction) {
    match action {
        PollAction::Create { question, options } => submit(
            session,
            session.store.read(|s| intent::poll_start(s, &question, &options)),
        ),
        PollAction::Status => {
            let nick = session.nick.as_str();
            let text = session.store.read(|s| poll_status(s, nick));
            session.notice(text);
        }
        PollAction::Close => {
            let nick = session.nick.as_str();
            submit(session, session.store.read(|s| intent::poll_close(s, nick)));
        }
    }
}

fn poll_status(state: &RoomState, nick: &str) -> String {
    let Some(poll) = &state.poll else {
        return IntentError::NoPoll.to_string();
    };

    let mine = poll.vote_of(nick);
    let mut text = format!("=== POLL: {} ===", poll.question);
    for (i, (option, count)) in poll.tally().into_iter().enumerate() {
        let marker = if mine == Some(i) { " *" } else { "" };
        text.push_str(&format!("\n  {}. {option}: {count}{marker}", i + 1));
    }
    text.push_str(&format!(
        "\n  {} vote(s). Started by {}",
        poll.voter_count(),
        poll.starter
    ));
    text
}

pub fn vote(session: &ChatSession, choice: usize) {
    submit(session, session.store.read(|s| intent::poll_vote(s, choice)));
}
