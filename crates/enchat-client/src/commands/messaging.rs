use enchat_net::OutboundOp;

use crate::intent;
use crate::session::ChatSession;

pub fn chat(session: &ChatSession, text: String) {
    // Our own line shows up once the relay echoes it back.
    session.send(OutboundOp::Chat(text));
}

pub fn clear(session: &ChatSession) {
    session.store.write(|s| {
        s.transcript.clear();
        s.transcript.notice("Message buffer cleared");
    });
}

pub fn clean_chat(session: &ChatSession, confirm: bool) {
    let checked = session
        .store
        .read(|s| intent::clean_chat(s, &session.nick, session.public, confirm));
    match checked {
        Ok(message) => {
            if session.send(OutboundOp::System(message)) {
                session.store.write(|s| {
                    s.transcript.clear();
                    s.transcript
                        .notice("Chat cleanup sent to all participants. Local history cleared");
                });
            }
        }
        Err(e) => session.notice(e.to_string()),
    }
}

pub fn who(session: &ChatSession) {
    let mut users: Vec<String> = session.store.read(|s| s.roster.keys().cloned().collect());
    if !users.contains(&session.nick) {
        users.push(session.nick.clone());
        users.sort();
    }

    let mut text = format!("=== ONLINE ({}) ===", users.len());
    for user in users {
        if user == session.nick {
            text.push_str(&format!("\n  {user} (you)"));
        } else {
            text.push_str(&format!("\n  {user}"));
        }
    }
    session.notice(text);
}

const HELP: &[(&str, &str)] = &[
    ("/help", "Show this help message"),
    ("/who", "List users currently in the room"),
    ("/stats", "Show message counts"),
    ("/share-room [--uses N] [--ttl 10m]", "Create a temporary link to share this room"),
    ("/copy-link", "Show the last generated room link"),
    ("/lottery", "Start or join a lottery. /lottery help for details"),
    ("/poll \"Q\" | \"A1\" | \"A2\"", "Create a poll"),
    ("/poll status | close", "Show or close the current poll"),
    ("/vote <n>", "Vote in the current poll"),
    ("/files", "List files shared in this room"),
    ("/download <id>", "Download a shared file"),
    ("/share <file>", "Share a file with the room"),
    ("/clean-chat", "Clear chat history for all participants (private rooms only)"),
    ("/security", "Show encryption status"),
    ("/server", "Show relay status"),
    ("/clear", "Clear the message window"),
    ("/exit", "Leave the room"),
];

pub fn help(session: &ChatSession) {
    let mut text = String::from("=== Commands ===");
    for (command, description) in HELP {
        text.push_str(&format!("\n  {command}: {description}"));
    }
    session.notice(text);
}

pub fn stats(session: &ChatSession) {
    let (sent, received) = session.store.read(|s| s.transcript.chat_counts());
    session.notice(format!(
        "Messages - Sent: {sent}, Received: {received}, Total: {}",
        sent + received
    ));
}
