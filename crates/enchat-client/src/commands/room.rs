use tracing::warn;

use enchat_net::{Connectivity, RelayOp};
use enchat_shared::constants::{
    DEFAULT_LINK_TTL_SECS, DEFAULT_LINK_USES, ROOM_KDF_ITERATIONS, SESSION_KEY_ROTATION_SECS,
};

use crate::error::IntentError;
use crate::session::ChatSession;

pub fn security(session: &ChatSession) {
    let mut text = String::from("=== Security ===");
    if session.public {
        text.push_str("\n  Room type: public (anyone who knows the room name can read it)");
    } else {
        text.push_str("\n  Room type: private");
    }
    text.push_str(&format!("\n  Network: {}", session.config.network_route()));
    text.push_str("\n  Cipher: XChaCha20-Poly1305");
    text.push_str(&format!(
        "\n  Room key: PBKDF2-SHA256, {ROOM_KDF_ITERATIONS} iterations"
    ));

    if session.codec.session_layer() {
        let rotation = match session.codec.sessions().rotation_due_in(session.room()) {
            Some(due) => format!("next rotation in {}s", due.as_secs()),
            None => "created on next send".to_string(),
        };
        text.push_str(&format!(
            "\n  Session keys: rotate every {SESSION_KEY_ROTATION_SECS}s, {rotation}"
        ));
    } else {
        text.push_str("\n  Session keys: off");
    }

    let undecryptable = session.store.read(|s| s.undecryptable);
    if undecryptable > 0 {
        text.push_str(&format!(
            "\n  Undecryptable messages seen: {undecryptable}"
        ));
    }
    session.notice(text);
}

pub async fn server(session: &ChatSession) {
    let url = session.relay.server_url().to_string();
    match session.relay.health().await {
        Ok(()) => session.notice(format!("Relay {url}: reachable")),
        Err(e) => {
            warn!(url = %url, error = %e, "Relay health check failed");
            session.notice(format!("Relay {url}: unreachable ({e})"));
        }
    }
    let (sending, receiving) = session.store.read(|s| {
        (
            describe(s.connectivity(RelayOp::Publish)),
            describe(s.connectivity(RelayOp::Poll)),
        )
    });
    session.notice(format!("Sending: {sending}. Receiving: {receiving}"));
    let pending = session.outbox.pending();
    if pending > 0 {
        session.notice(format!("{pending} message(s) waiting to be sent"));
    }
}

fn describe(status: &Connectivity) -> String {
    match status {
        Connectivity::Online => "ok".to_string(),
        Connectivity::Offline(reason) => format!("failing ({reason})"),
    }
}

pub async fn share_room(session: &ChatSession, uses: Option<u32>, ttl: Option<u64>) {
    if session.public {
        session.notice(IntentError::PublicRoom.to_string());
        return;
    }

    session.notice("Creating share link...");
    match session.broker.share_room(&session.creds, ttl, uses).await {
        Ok(url) => {
            session.notice(format!(
                "Share link ({} use(s), expires in {} min):\n  {url}",
                uses.unwrap_or(DEFAULT_LINK_USES),
                ttl.unwrap_or(DEFAULT_LINK_TTL_SECS) / 60
            ));
            session.set_last_link(url);
        }
        Err(e) => {
            warn!(error = %e, "Creating share link failed");
            session.notice(format!("Could not create share link: {e}"));
        }
    }
}

pub fn copy_link(session: &ChatSession) {
    match session.last_link() {
        Some(url) => session.notice(format!("Last share link:\n  {url}")),
        None => session.notice("No share link yet. Create one with /share-room"),
    }
}
