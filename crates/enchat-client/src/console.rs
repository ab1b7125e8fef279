//! The line-oriented terminal loop. It returns on `/exit`, end of input,
//! an interrupt, or any input or output failure, so the caller can always
//! run the session shutdown afterwards.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

use crate::commands::Reaction;
use crate::render::format_line;
use crate::session::ChatSession;

const RENDER_TICK: Duration = Duration::from_millis(200);

pub async fn run<R, W>(
    session: &ChatSession,
    input: R,
    mut output: W,
    interrupt: impl Future<Output = ()>,
) where
    R: AsyncRead + Unpin,
    W: Write,
{
    // Split on raw bytes so a line that is not UTF-8 is not fatal.
    let mut segments = BufReader::new(input).split(b'\n');
    let mut ticker = tokio::time::interval(RENDER_TICK);
    let mut rendered = 0;
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut interrupt => {
                info!("Interrupted");
                break;
            }
            segment = segments.next_segment() => match segment {
                Ok(Some(bytes)) => {
                    let line = String::from_utf8_lossy(&bytes);
                    if session.handle_line(line.trim_end_matches('\r')).await == Reaction::Exit {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Reading input failed");
                    break;
                }
            },
            _ = ticker.tick() => {}
        }
        match render_new(session, &mut output, rendered) {
            Ok(seq) => rendered = seq,
            Err(e) => {
                warn!(error = %e, "Writing output failed");
                return;
            }
        }
    }

    if let Err(e) = render_new(session, &mut output, rendered) {
        warn!(error = %e, "Writing output failed");
    }
}

/// Print transcript lines newer than `last_seq`, returning the new high mark.
fn render_new(session: &ChatSession, output: &mut impl Write, last_seq: u64) -> std::io::Result<u64> {
    let (lines, newest) = session
        .store()
        .read(|s| (s.transcript.since(last_seq), s.transcript.last_seq()));
    if lines.is_empty() {
        return Ok(newest);
    }

    for line in &lines {
        writeln!(output, "{}", format_line(line))?;
    }
    output.flush()?;
    Ok(newest)
}
