//! Local, advisory validation of commands that change shared room state.
//!
//! Each function looks at a possibly stale snapshot and either rejects the
//! request or returns the system message to publish. None of them touch the
//! state: the change only happens when the message comes back through the
//! relay and [`RoomState::apply`](crate::state::RoomState) runs on it. Two
//! participants can both pass a check before either message lands; apply
//! resolves that race by relay order.

use rand::seq::IteratorRandom;
use rand::Rng;

use enchat_shared::constants::MAX_POLL_OPTIONS;
use enchat_shared::protocol::PollSpec;
use enchat_shared::SystemMessage;

use crate::error::IntentError;
use crate::state::RoomState;

pub fn lottery_start(state: &RoomState) -> Result<SystemMessage, IntentError> {
    if state.lottery.is_some() {
        return Err(IntentError::LotteryActive);
    }
    Ok(SystemMessage::LotteryStart)
}

pub fn lottery_enter(state: &RoomState, nick: &str) -> Result<SystemMessage, IntentError> {
    let lottery = state.lottery.as_ref().ok_or(IntentError::NoLottery)?;
    if lottery.participants.contains(nick) {
        return Err(IntentError::AlreadyEntered);
    }
    Ok(SystemMessage::LotteryEnter)
}

/// Pick a winner among the current participants.
pub fn lottery_draw(
    state: &RoomState,
    nick: &str,
    rng: &mut impl Rng,
) -> Result<SystemMessage, IntentError> {
    let lottery = state.lottery.as_ref().ok_or(IntentError::NoLottery)?;
    if lottery.starter != nick {
        return Err(IntentError::NotLotteryStarter(lottery.starter.clone()));
    }
    let winner = lottery
        .participants
        .iter()
        .choose(rng)
        .ok_or(IntentError::NoParticipants)?;
    Ok(SystemMessage::LotteryWinner(winner.clone()))
}

pub fn lottery_cancel(state: &RoomState, nick: &str) -> Result<SystemMessage, IntentError> {
    let lottery = state.lottery.as_ref().ok_or(IntentError::NoLottery)?;
    if lottery.starter != nick {
        return Err(IntentError::NotLotteryStarter(lottery.starter.clone()));
    }
    Ok(SystemMessage::LotteryCancel)
}

pub fn poll_start(
    state: &RoomState,
    question: &str,
    options: &[String],
) -> Result<SystemMessage, IntentError> {
    if state.poll.is_some() {
        return Err(IntentError::PollActive);
    }
    if question.trim().is_empty() || options.len() < 2 {
        return Err(IntentError::TooFewOptions(2));
    }
    if options.len() > MAX_POLL_OPTIONS {
        return Err(IntentError::TooManyOptions(MAX_POLL_OPTIONS));
    }
    Ok(SystemMessage::PollStart(PollSpec {
        question: question.trim().to_string(),
        options: options.to_vec(),
    }))
}

/// `choice` is 1-based as typed; the wire index is 0-based.
pub fn poll_vote(state: &RoomState, choice: usize) -> Result<SystemMessage, IntentError> {
    let poll = state.poll.as_ref().ok_or(IntentError::NoPoll)?;
    if choice == 0 || choice > poll.options.len() {
        return Err(IntentError::InvalidChoice(poll.options.len()));
    }
    Ok(SystemMessage::PollVote(choice - 1))
}

pub fn poll_close(state: &RoomState, nick: &str) -> Result<SystemMessage, IntentError> {
    let poll = state.poll.as_ref().ok_or(IntentError::NoPoll)?;
    if poll.starter != nick {
        return Err(IntentError::NotPollStarter(poll.starter.clone()));
    }
    Ok(SystemMessage::PollClose)
}

/// Cleaning the room needs confirmation while anyone else is present.
pub fn clean_chat(
    state: &RoomState,
    nick: &str,
    public: bool,
    confirmed: bool,
) -> Result<SystemMessage, IntentError> {
    if public {
        return Err(IntentError::PublicRoom);
    }
    let others = state.roster.keys().any(|n| n != nick);
    if others && !confirmed {
        return Err(IntentError::NeedsConfirmation);
    }
    Ok(SystemMessage::RoomCleanup)
}
