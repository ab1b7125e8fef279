//! Input line handling.
//!
//! A line is parsed into one closed [`Command`] and dispatched by exhaustive
//! match. Handlers are grouped by domain in the sub-modules. Handlers that
//! affect shared room state only validate and enqueue; they never apply.

pub mod files;
pub mod games;
pub mod messaging;
pub mod room;

use std::path::PathBuf;

use enchat_shared::share_link::parse_ttl;

use crate::error::CommandError;
use crate::session::ChatSession;

/// What the input loop should do after a line was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Continue,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LotteryAction {
    Start,
    Enter,
    Status,
    Draw,
    Cancel,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    Create { question: String, options: Vec<String> },
    Status,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    Exit,
    Clear,
    CleanChat { confirm: bool },
    Who,
    Help,
    Stats,
    Lottery(LotteryAction),
    Poll(PollAction),
    /// 1-based, as typed.
    Vote(usize),
    Security,
    Files,
    Download(String),
    Share(PathBuf),
    Server,
    ShareRoom { uses: Option<u32>, ttl: Option<u64> },
    CopyLink,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.trim().is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.trim_start().strip_prefix('/') else {
            return Ok(Some(Self::Chat(line.to_string())));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "exit" | "quit" => Self::Exit,
            "clear" => Self::Clear,
            "clean-chat" => Self::CleanChat {
                confirm: args == "confirm",
            },
            "who" => Self::Who,
            "help" => Self::Help,
            "stats" => Self::Stats,
            "lottery" => Self::Lottery(parse_lottery(args)),
            "poll" => Self::Poll(parse_poll(args)?),
            "vote" => Self::Vote(
                args.parse()
                    .map_err(|_| CommandError::Usage("/vote <option_number>"))?,
            ),
            "security" => Self::Security,
            "files" => Self::Files,
            "download" => {
                let file_id = args
                    .split_whitespace()
                    .next()
                    .map(|id| id.trim_matches(&['"', '\''][..]))
                    .filter(|id| !id.is_empty())
                    .ok_or(CommandError::Usage("/download <file_id>"))?;
                Self::Download(file_id.to_string())
            }
            "share" => {
                let path = args.trim_matches(&['"', '\''][..]);
                if path.is_empty() {
                    return Err(CommandError::Usage("/share <filepath>"));
                }
                Self::Share(PathBuf::from(path))
            }
            "server" => Self::Server,
            "share-room" => parse_share_room(args)?,
            "copy-link" => Self::CopyLink,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn parse_lottery(args: &str) -> LotteryAction {
    let sub = args.split_whitespace().next().unwrap_or_default().to_lowercase();
    match sub.as_str() {
        "start" => LotteryAction::Start,
        "enter" => LotteryAction::Enter,
        "status" => LotteryAction::Status,
        "draw" => LotteryAction::Draw,
        "cancel" => LotteryAction::Cancel,
        _ => LotteryAction::Help,
    }
}

const POLL_USAGE: &str = "/poll \"Question\" | \"Option 1\" | \"Option 2\"";

fn parse_poll(args: &str) -> Result<PollAction, CommandError> {
    match args.to_lowercase().as_str() {
        "status" => return Ok(PollAction::Status),
        "close" => return Ok(PollAction::Close),
        _ => {}
    }

    let parts: Vec<String> = args
        .split('|')
        .map(|p| p.trim().trim_matches('"').trim().to_string())
        .collect();
    if parts.len() < 3 || parts.iter().any(String::is_empty) {
        return Err(CommandError::Usage(POLL_USAGE));
    }

    let mut parts = parts.into_iter();
    let question = parts.next().unwrap_or_default();
    Ok(PollAction::Create {
        question,
        options: parts.collect(),
    })
}

fn parse_share_room(args: &str) -> Result<Command, CommandError> {
    const USAGE: &str = "/share-room [--uses N] [--ttl 10m|2h|1d]";
    let mut uses = None;
    let mut ttl = None;

    let mut tokens = args.split_whitespace();
    while let Some(flag) = tokens.next() {
        match flag {
            "--uses" => {
                let value = tokens.next().ok_or(CommandError::Usage(USAGE))?;
                let parsed = value
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| CommandError::InvalidArgument {
                        flag: "--uses",
                        value: value.to_string(),
                    })?;
                uses = Some(parsed);
            }
            "--ttl" => {
                let value = tokens.next().ok_or(CommandError::Usage(USAGE))?;
                ttl = Some(parse_ttl(value)?);
            }
            _ => return Err(CommandError::Usage(USAGE)),
        }
    }
    Ok(Command::ShareRoom { uses, ttl })
}

/// Run one parsed command against the session.
pub async fn execute(session: &ChatSession, command: Command) -> Reaction {
    match command {
        Command::Exit => return Reaction::Exit,
        Command::Chat(text) => messaging::chat(session, text),
        Command::Clear => messaging::clear(session),
        Command::CleanChat { confirm } => messaging::clean_chat(session, confirm),
        Command::Who => messaging::who(session),
        Command::Help => messaging::help(session),
        Command::Stats => messaging::stats(session),
        Command::Lottery(action) => games::lottery(session, action),
        Command::Poll(action) => games::poll(session, action),
        Command::Vote(choice) => games::vote(session, choice),
        Command::Security => room::security(session),
        Command::Files => files::list(session),
        Command::Download(file_id) => files::download(session, &file_id).await,
        Command::Share(path) => files::share(session, &path).await,
        Command::Server => room::server(session).await,
        Command::ShareRoom { uses, ttl } => room::share_room(session, uses, ttl).await,
        Command::CopyLink => room::copy_link(session),
    }
    Reaction::Continue
}
