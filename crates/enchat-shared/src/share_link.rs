//! One-time room invitation links.
//!
//! The room credentials are encrypted under a fresh ephemeral key. The
//! ciphertext goes to the link broker, the key only ever travels inside the
//! URL fragment: `https://<broker>/join#<session_id>:<ephemeral_key>`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::crypto::{decrypt_token, encrypt_token, generate_symmetric_key, key_from_slice};
use crate::error::{CryptoError, LinkError};
use crate::types::RoomCredentials;

/// Encrypted credentials ready for upload, plus the key that opens them.
#[derive(Debug, Clone)]
pub struct LinkComponents {
    /// Ciphertext token stored by the broker.
    pub payload: String,
    /// base64url ephemeral key, placed in the URL fragment.
    pub key: String,
}

impl LinkComponents {
    pub fn generate(creds: &RoomCredentials) -> Result<Self, CryptoError> {
        let ephemeral_key = generate_symmetric_key();
        let plaintext = format!("{}|{}|{}", creds.room, creds.server_url, creds.secret);
        let payload = encrypt_token(&ephemeral_key, plaintext.as_bytes())?;

        Ok(Self {
            payload,
            key: URL_SAFE_NO_PAD.encode(ephemeral_key),
        })
    }
}

/// The two halves of a share URL fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub session_id: String,
    pub key: String,
}

impl ShareLink {
    pub fn to_url(&self, broker_url: &str) -> String {
        format!(
            "{}/join#{}:{}",
            broker_url.trim_end_matches('/'),
            self.session_id,
            self.key
        )
    }

    pub fn parse(url: &str) -> Result<Self, LinkError> {
        let (_, fragment) = url.trim().split_once("/join#").ok_or(LinkError::MalformedUrl)?;
        let (session_id, key) = fragment.split_once(':').ok_or(LinkError::MalformedUrl)?;
        if session_id.is_empty() || key.is_empty() || key.contains(':') {
            return Err(LinkError::MalformedUrl);
        }

        Ok(Self {
            session_id: session_id.to_string(),
            key: key.to_string(),
        })
    }

    /// Open a payload fetched from the broker with this link's key.
    pub fn decrypt_credentials(&self, payload: &str) -> Result<RoomCredentials, LinkError> {
        let key_bytes = URL_SAFE_NO_PAD
            .decode(self.key.trim_end_matches('='))
            .map_err(|_| LinkError::Base64Decode)?;
        let key = key_from_slice(&key_bytes).map_err(|_| LinkError::Decrypt)?;

        let plaintext = decrypt_token(&key, payload).map_err(|_| LinkError::Decrypt)?;
        let text = String::from_utf8(plaintext).map_err(|_| LinkError::InvalidPayload)?;

        let mut parts = text.splitn(3, '|');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(room), Some(server_url), Some(secret)) if !room.is_empty() => {
                Ok(RoomCredentials::new(room, server_url, secret))
            }
            _ => Err(LinkError::InvalidPayload),
        }
    }
}

/// Parse a human TTL such as `10m`, `2h` or `1d` into seconds.
pub fn parse_ttl(input: &str) -> Result<u64, LinkError> {
    let lower = input.trim().to_lowercase();
    let invalid = || LinkError::InvalidTtl(input.to_string());

    let unit = lower.chars().last().ok_or_else(invalid)?;
    let digits = &lower[..lower.len() - unit.len_utf8()];
    let multiplier = match unit {
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return Err(invalid()),
    };
    let value: u64 = digits.parse().map_err(|_| invalid())?;
    value.checked_mul(multiplier).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> RoomCredentials {
        RoomCredentials::new("team-room", "https://relay.example", "s3cret|with|pipes")
    }

    #[test]
    fn test_link_roundtrip() {
        let components = LinkComponents::generate(&creds()).unwrap();
        let link = ShareLink {
            session_id: "abc123".into(),
            key: components.key.clone(),
        };

        let url = link.to_url("https://share.example/");
        assert_eq!(url, format!("https://share.example/join#abc123:{}", components.key));

        let parsed = ShareLink::parse(&url).unwrap();
        assert_eq!(parsed, link);

        let opened = parsed.decrypt_credentials(&components.payload).unwrap();
        assert_eq!(opened, creds());
    }

    #[test]
    fn test_wrong_key_fails() {
        let components = LinkComponents::generate(&creds()).unwrap();
        let other = LinkComponents::generate(&creds()).unwrap();
        let link = ShareLink {
            session_id: "abc".into(),
            key: other.key,
        };
        assert_eq!(link.decrypt_credentials(&components.payload), Err(LinkError::Decrypt));
    }

    #[test]
    fn test_malformed_urls() {
        assert_eq!(ShareLink::parse("https://share.example/abc"), Err(LinkError::MalformedUrl));
        assert_eq!(ShareLink::parse("https://share.example/join#abc"), Err(LinkError::MalformedUrl));
        assert_eq!(ShareLink::parse("https://share.example/join#:key"), Err(LinkError::MalformedUrl));
        assert_eq!(ShareLink::parse("https://share.example/join#a:b:c"), Err(LinkError::MalformedUrl));
    }

    #[test]
    fn test_bad_base64_key() {
        let link = ShareLink {
            session_id: "abc".into(),
            key: "***".into(),
        };
        assert_eq!(link.decrypt_credentials("payload"), Err(LinkError::Base64Decode));
    }

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("10m"), Ok(600));
        assert_eq!(parse_ttl("2h"), Ok(7_200));
        assert_eq!(parse_ttl("1D"), Ok(86_400));
        assert!(parse_ttl("10").is_err());
        assert!(parse_ttl("m").is_err());
        assert!(parse_ttl("").is_err());
        assert!(parse_ttl("xm").is_err());
    }
}
