//! # enchat
//!
//! Terminal entry point: resolve room credentials from the environment (or a
//! share link), join the room and run a line-oriented input loop until
//! `/exit`, end of input or Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use enchat_client::rooms::{self, ResolvedRoom};
use enchat_client::{console, init_tracing, ChatSession, ClientConfig, ClientError};
use enchat_net::NtfyRelay;
use enchat_shared::types::room_topic;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting enchat v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    let nick = config
        .nick
        .clone()
        .ok_or(ClientError::MissingSetting("ENCHAT_NICK"))?;
    let ResolvedRoom {
        creds,
        public,
        created,
    } = rooms::resolve(&config).await?;

    if created {
        println!("Created room '{}'. Share this secret with the people you invite:", creds.room);
        println!("  {}", creds.secret);
    }

    let relay = NtfyRelay::new(
        &creds.server_url,
        &room_topic(&creds.room),
        &config.http_options(),
    )
    .context("Failed to build relay client")?;

    let session = ChatSession::start(config, creds, nick, public, Arc::new(relay))
        .await
        .context("Failed to join room")?;

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    console::run(&session, tokio::io::stdin(), std::io::stdout(), interrupt).await;

    session.shutdown().await;
    Ok(())
}
