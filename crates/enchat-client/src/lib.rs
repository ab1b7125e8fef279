//! # enchat-client
//!
//! Room session logic for the enchat terminal client: the shared state store
//! and its apply function, command parsing and validation, chunked file
//! transfer and the session that wires them to the relay.

pub mod apply;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod file_transfer;
pub mod intent;
pub mod render;
pub mod rooms;
pub mod session;
pub mod state;

pub use commands::{Command, Reaction};
pub use config::ClientConfig;
pub use error::ClientError;
pub use session::{ChatSession, SessionOptions};
pub use state::{RoomState, StateStore};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Logs go to stderr; stdout carries the
/// transcript.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("enchat_client=info,enchat_net=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
