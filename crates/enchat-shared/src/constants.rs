/// Wire format version carried in every relay envelope
pub const WIRE_VERSION: u8 = 1;

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// PBKDF2-HMAC-SHA256 iteration count for room keys
pub const ROOM_KDF_ITERATIONS: u32 = 100_000;

/// Salt prefix for room key derivation; the room name is appended
pub const ROOM_KDF_SALT_PREFIX: &str = "enchat-room-salt-v1:";

/// Key derivation context for relay topic names (BLAKE3)
pub const KDF_CONTEXT_TOPIC: &str = "enchat-relay-topic-v1";

/// Session keys older than this are replaced before the next seal (seconds)
pub const SESSION_KEY_ROTATION_SECS: u64 = 300;

/// Largest relay message body published inline. ntfy turns anything bigger
/// into an attachment, which the listener cannot read.
pub const MAX_RELAY_MESSAGE_BYTES: usize = 4096;

/// Plaintext block size for file transfer, and the largest one accepted from
/// configuration. A sealed chunk costs about two wire bytes per plaintext
/// byte, so 1.5 KiB stays near 3.2 KiB on the wire.
pub const CHUNK_SIZE: usize = 1536;

/// Longest accepted nick, in bytes
pub const MAX_NICK_LEN: usize = 32;

/// Maximum file transfer size in bytes (5 MiB)
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Incoming file records kept per room; the oldest is forgotten first
pub const MAX_TRACKED_FILES: usize = 64;

/// Maximum number of options in a poll
pub const MAX_POLL_OPTIONS: usize = 10;

/// Maximum number of transcript lines kept for rendering
pub const TRANSCRIPT_LIMIT: usize = 500;

/// Default relay (ntfy-compatible)
pub const DEFAULT_RELAY_URL: &str = "https://ntfy.sh";

/// Local Tor SOCKS proxy. `socks5h` resolves host names through Tor too.
pub const DEFAULT_TOR_PROXY: &str = "socks5h://127.0.0.1:9050";

/// Default link broker
pub const DEFAULT_LINK_SERVER_URL: &str = "https://share.enchat.io";

/// Well-known public rooms: `(alias, room, passphrase)`. The passphrase is
/// public knowledge; these rooms run without a session layer.
pub const PUBLIC_ROOMS: &[(&str, &str, &str)] = &[
    ("lobby", "enchat-public-lobby", "enchat-lobby-open-to-all"),
    ("help", "enchat-public-help", "enchat-help-open-to-all"),
    ("dev", "enchat-public-dev", "enchat-dev-open-to-all"),
];

/// Random bytes behind a freshly created room passphrase
pub const NEW_ROOM_SECRET_BYTES: usize = 32;

/// Share links default to a single use when no limit is given
pub const DEFAULT_LINK_USES: u32 = 1;

/// Share links default to a 15 minute lifetime when no TTL is given
pub const DEFAULT_LINK_TTL_SECS: u64 = 900;
