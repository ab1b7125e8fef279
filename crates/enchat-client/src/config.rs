//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client can start with only a room, a
//! nick and a secret (or a share link). Durable on-disk configuration and
//! keychain storage live outside this crate.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use enchat_net::HttpOptions;
use enchat_shared::constants::{
    CHUNK_SIZE, DEFAULT_LINK_SERVER_URL, DEFAULT_RELAY_URL, DEFAULT_TOR_PROXY, MAX_FILE_SIZE,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay base URL.
    /// Env: `ENCHAT_SERVER`
    /// Default: `https://ntfy.sh`
    pub server_url: String,

    /// Link broker used by `/share-room`.
    /// Env: `ENCHAT_LINK_SERVER`
    /// Default: `https://share.enchat.io`
    pub link_server_url: String,

    /// Env: `ENCHAT_ROOM`
    pub room: Option<String>,

    /// Env: `ENCHAT_NICK`
    pub nick: Option<String>,

    /// Room passphrase. Never logged.
    /// Env: `ENCHAT_SECRET`
    pub secret: Option<String>,

    /// Public rooms use the room name as passphrase and skip the session
    /// layer.
    /// Env: `ENCHAT_PUBLIC` (true/false)
    /// Default: `false`
    pub public: bool,

    /// Join through a share link instead of room/secret.
    /// Env: `ENCHAT_JOIN_LINK`
    pub join_link: Option<String>,

    /// Join one of the built-in public rooms by alias.
    /// Env: `ENCHAT_PUBLIC_ROOM`
    pub public_room: Option<String>,

    /// Create a fresh private room with a random secret.
    /// Env: `ENCHAT_CREATE_ROOM` (true/false)
    /// Default: `false`
    pub create_room: bool,

    /// Route relay and link traffic through a local Tor daemon.
    /// Env: `ENCHAT_TOR` (true/false)
    /// Default: `false`
    pub tor: bool,

    /// Proxy URL for all HTTP traffic. With Tor on and no proxy set,
    /// `socks5h://127.0.0.1:9050` is used.
    /// Env: `ENCHAT_PROXY`
    pub proxy: Option<String>,

    /// Where completed downloads are written.
    /// Env: `ENCHAT_DOWNLOADS_DIR`
    /// Default: `./downloads`
    pub downloads_dir: PathBuf,

    /// Env: `ENCHAT_POLL_INTERVAL_MS`
    /// Default: `2000`
    pub poll_interval: Duration,

    /// Per-request relay timeout.
    /// Env: `ENCHAT_REQUEST_TIMEOUT_SECS`
    /// Default: `15`
    pub request_timeout: Duration,

    /// Env: `ENCHAT_MAX_FILE_SIZE`
    /// Default: 5 MiB
    pub max_file_size: u64,

    /// Plaintext bytes per file chunk. Larger values are capped so a
    /// sealed chunk still fits one relay message.
    /// Env: `ENCHAT_CHUNK_SIZE`
    /// Default: `1536`
    pub chunk_size: usize,

    /// Env: `ENCHAT_HEARTBEAT_SECS`
    /// Default: `60`
    pub heartbeat_interval: Duration,

    /// Upper bound on the final outbound drain at shutdown.
    /// Env: `ENCHAT_SHUTDOWN_TIMEOUT_SECS`
    /// Default: `10`
    pub shutdown_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_RELAY_URL.to_string(),
            link_server_url: DEFAULT_LINK_SERVER_URL.to_string(),
            room: None,
            nick: None,
            secret: None,
            public: false,
            join_link: None,
            public_room: None,
            create_room: false,
            tor: false,
            proxy: None,
            downloads_dir: PathBuf::from("./downloads"),
            poll_interval: Duration::from_millis(2000),
            request_timeout: Duration::from_secs(15),
            max_file_size: MAX_FILE_SIZE,
            chunk_size: CHUNK_SIZE,
            heartbeat_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("ENCHAT_SERVER") {
            config.server_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = non_empty("ENCHAT_LINK_SERVER") {
            config.link_server_url = url.trim_end_matches('/').to_string();
        }

        config.room = non_empty("ENCHAT_ROOM");
        config.nick = non_empty("ENCHAT_NICK");
        config.secret = non_empty("ENCHAT_SECRET");
        config.join_link = non_empty("ENCHAT_JOIN_LINK");

        config.public_room = non_empty("ENCHAT_PUBLIC_ROOM");
        config.proxy = non_empty("ENCHAT_PROXY");
        if let Some(val) = non_empty("ENCHAT_PUBLIC") {
            config.public = is_true(&val);
        }
        if let Some(val) = non_empty("ENCHAT_CREATE_ROOM") {
            config.create_room = is_true(&val);
        }
        if let Some(val) = non_empty("ENCHAT_TOR") {
            config.tor = is_true(&val);
        }
        if config.tor && config.proxy.is_none() {
            config.proxy = Some(DEFAULT_TOR_PROXY.to_string());
        }
        if let Some(path) = non_empty("ENCHAT_DOWNLOADS_DIR") {
            config.downloads_dir = PathBuf::from(path);
        }

        if let Some(ms) = parse_number::<u64>(&non_empty, "ENCHAT_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms.max(100));
        }
        if let Some(secs) = parse_number::<u64>(&non_empty, "ENCHAT_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(size) = parse_number::<u64>(&non_empty, "ENCHAT_MAX_FILE_SIZE") {
            config.max_file_size = size;
        }
        if let Some(size) = parse_number::<usize>(&non_empty, "ENCHAT_CHUNK_SIZE") {
            if size == 0 {
                warn!("ENCHAT_CHUNK_SIZE must be positive, using default");
            } else if size > CHUNK_SIZE {
                warn!(size, max = CHUNK_SIZE, "ENCHAT_CHUNK_SIZE too large for the relay, capping");
                config.chunk_size = CHUNK_SIZE;
            } else {
                config.chunk_size = size;
            }
        }
        if let Some(secs) = parse_number::<u64>(&non_empty, "ENCHAT_HEARTBEAT_SECS") {
            config.heartbeat_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_number::<u64>(&non_empty, "ENCHAT_SHUTDOWN_TIMEOUT_SECS") {
            config.shutdown_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// HTTP client settings shared by the relay and the link broker.
    pub fn http_options(&self) -> HttpOptions {
        HttpOptions::with_timeout(self.request_timeout).proxy(self.proxy.clone())
    }

    /// Human-readable description of how traffic leaves this machine.
    pub fn network_route(&self) -> String {
        match (&self.proxy, self.tor) {
            (Some(proxy), true) => format!("Tor via {proxy}"),
            (Some(proxy), false) => format!("proxy {proxy}"),
            (None, _) => "direct".to_string(),
        }
    }
}

fn is_true(val: &str) -> bool {
    val != "false" && val != "0"
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Invalid number, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> ClientConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = load(&[]);
        assert_eq!(config.server_url, "https://ntfy.sh");
        assert_eq!(config.chunk_size, 1536);
        assert_eq!(config.max_file_size, 5 * 1024 * 1024);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert!(!config.public);
        assert!(!config.tor);
        assert!(config.room.is_none());
        assert_eq!(config.network_route(), "direct");
        assert!(config.http_options().proxy.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("ENCHAT_SERVER", "https://relay.example/"),
            ("ENCHAT_ROOM", "ops"),
            ("ENCHAT_PUBLIC", "true"),
            ("ENCHAT_POLL_INTERVAL_MS", "500"),
            ("ENCHAT_CHUNK_SIZE", "1024"),
            ("ENCHAT_PUBLIC_ROOM", "lobby"),
            ("ENCHAT_CREATE_ROOM", "1"),
        ]);
        assert_eq!(config.server_url, "https://relay.example");
        assert_eq!(config.room.as_deref(), Some("ops"));
        assert!(config.public);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.public_room.as_deref(), Some("lobby"));
        assert!(config.create_room);
    }

    #[test]
    fn test_chunk_size_is_capped_for_the_relay() {
        let config = load(&[("ENCHAT_CHUNK_SIZE", "4096")]);
        assert_eq!(config.chunk_size, CHUNK_SIZE);
    }

    #[test]
    fn test_tor_uses_local_socks_proxy() {
        let config = load(&[("ENCHAT_TOR", "true")]);
        assert!(config.tor);
        assert_eq!(config.proxy.as_deref(), Some("socks5h://127.0.0.1:9050"));
        assert_eq!(config.network_route(), "Tor via socks5h://127.0.0.1:9050");
        assert_eq!(config.http_options().proxy, config.proxy);
        assert_eq!(config.http_options().timeout, Some(Duration::from_secs(15)));

        let custom = load(&[("ENCHAT_TOR", "1"), ("ENCHAT_PROXY", "socks5h://10.0.0.2:9150")]);
        assert_eq!(custom.proxy.as_deref(), Some("socks5h://10.0.0.2:9150"));

        let plain = load(&[("ENCHAT_PROXY", "http://proxy.local:3128")]);
        assert_eq!(plain.network_route(), "proxy http://proxy.local:3128");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = load(&[
            ("ENCHAT_POLL_INTERVAL_MS", "soon"),
            ("ENCHAT_CHUNK_SIZE", "0"),
            ("ENCHAT_NICK", "   "),
        ]);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.chunk_size, 1536);
        assert!(config.nick.is_none());
    }
}
