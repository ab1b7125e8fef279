//! Where the room credentials come from: a share link, a public room alias,
//! a freshly created room, or an explicit room and secret.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use tracing::info;
use uuid::Uuid;

use enchat_net::join_from_link;
use enchat_shared::constants::{NEW_ROOM_SECRET_BYTES, PUBLIC_ROOMS};
use enchat_shared::RoomCredentials;

use crate::config::ClientConfig;
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoom {
    pub creds: RoomCredentials,
    pub public: bool,
    /// True when the secret was generated here and must be handed out.
    pub created: bool,
}

/// `(room, passphrase)` of a built-in public room.
pub fn public_room(alias: &str) -> Option<(&'static str, &'static str)> {
    let alias = alias.trim().to_ascii_lowercase();
    PUBLIC_ROOMS
        .iter()
        .find(|(name, _, _)| *name == alias)
        .map(|(_, room, secret)| (*room, *secret))
}

pub fn public_aliases() -> String {
    PUBLIC_ROOMS
        .iter()
        .map(|(alias, _, _)| *alias)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve credentials in priority order: share link, public alias, room
/// creation, then room and secret. Links always describe private rooms.
pub async fn resolve(config: &ClientConfig) -> Result<ResolvedRoom, ClientError> {
    if let Some(url) = &config.join_link {
        let creds = join_from_link(url, &config.http_options()).await?;
        info!(room = %creds.room, server = %creds.server_url, "Resolved share link");
        return Ok(ResolvedRoom {
            creds,
            public: false,
            created: false,
        });
    }
    resolve_local(config)
}

/// Every source that needs no network round trip.
pub fn resolve_local(config: &ClientConfig) -> Result<ResolvedRoom, ClientError> {
    if let Some(alias) = &config.public_room {
        let (room, secret) = public_room(alias)
            .ok_or_else(|| ClientError::UnknownPublicRoom(alias.clone(), public_aliases()))?;
        return Ok(ResolvedRoom {
            creds: RoomCredentials::new(room, config.server_url.clone(), secret),
            public: true,
            created: false,
        });
    }

    if config.create_room {
        let room = config.room.clone().unwrap_or_else(new_room_name);
        info!(room = %room, "Created new private room");
        return Ok(ResolvedRoom {
            creds: RoomCredentials::new(room, config.server_url.clone(), new_room_secret()),
            public: false,
            created: true,
        });
    }

    let room = config
        .room
        .clone()
        .ok_or(ClientError::MissingSetting("ENCHAT_ROOM"))?;
    let secret = match (&config.secret, config.public) {
        (Some(secret), _) => secret.clone(),
        // Public rooms are readable by anyone who knows the name.
        (None, true) => room.clone(),
        (None, false) => return Err(ClientError::MissingSetting("ENCHAT_SECRET")),
    };
    Ok(ResolvedRoom {
        creds: RoomCredentials::new(room, config.server_url.clone(), secret),
        public: config.public,
        created: false,
    })
}

fn new_room_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("room-{}", &id[..8])
}

fn new_room_secret() -> String {
    let mut bytes = [0u8; NEW_ROOM_SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
