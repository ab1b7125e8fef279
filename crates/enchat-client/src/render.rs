//! Plain-text rendering of transcript lines for a line-oriented terminal.

use chrono::Local;

use crate::state::{LineBody, TranscriptLine};

pub fn format_line(line: &TranscriptLine) -> String {
    let time = line.at.with_timezone(&Local).format("%H:%M");
    match &line.body {
        LineBody::Chat(text) if line.is_mine => format!("[{time}] {} (you): {text}", line.sender),
        LineBody::Chat(text) => format!("[{time}] {}: {text}", line.sender),
        LineBody::Notice(text) => indent_continuation(&format!("[{time}] * {text}")),
        LineBody::Undecryptable => format!("[{time}] ! message could not be decrypted"),
    }
}

/// Multi-line notices keep their indentation under the timestamp.
fn indent_continuation(text: &str) -> String {
    text.replace('\n', "\n        ")
}
