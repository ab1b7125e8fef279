//! HTTP relay speaking the ntfy publish/poll API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use enchat_shared::constants::MAX_RELAY_MESSAGE_BYTES;

use crate::error::NetError;
use crate::http::{build_client, HttpOptions};
use crate::relay::{Cursor, Relay, RelayMessage};

const PAYLOAD_TOO_LARGE: u16 = 413;

#[derive(Debug, Deserialize)]
struct NtfyEvent {
    id: String,
    time: i64,
    event: String,
    #[serde(default)]
    message: Option<String>,
}

pub struct NtfyRelay {
    client: reqwest::Client,
    base_url: String,
    topic: String,
}

impl NtfyRelay {
    pub fn new(base_url: &str, topic: &str, options: &HttpOptions) -> Result<Self, NetError> {
        let client = build_client(options)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            topic: topic.to_string(),
        })
    }

    fn topic_url(&self) -> String {
        format!("{}/{}", self.base_url, self.topic)
    }
}

#[async_trait]
impl Relay for NtfyRelay {
    /// Bodies over [`MAX_RELAY_MESSAGE_BYTES`] are refused locally: ntfy
    /// would store them as attachments that the poll never returns inline.
    async fn publish(&self, text: &str) -> Result<(), NetError> {
        if text.len() > MAX_RELAY_MESSAGE_BYTES {
            return Err(NetError::TooLarge {
                size: text.len(),
                max: MAX_RELAY_MESSAGE_BYTES,
            });
        }

        let url = self.topic_url();
        let resp = self.client.post(&url).body(text.to_string()).send().await?;

        if resp.status().as_u16() == PAYLOAD_TOO_LARGE {
            return Err(NetError::TooLarge {
                size: text.len(),
                max: MAX_RELAY_MESSAGE_BYTES,
            });
        }
        if !resp.status().is_success() {
            return Err(NetError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        debug!(topic = %self.topic, len = text.len(), "Published to relay");
        Ok(())
    }

    async fn fetch_since(&self, cursor: &Cursor) -> Result<Vec<RelayMessage>, NetError> {
        let url = format!("{}/json", self.topic_url());
        let resp = self
            .client
            .get(&url)
            .query(&[("poll", "1".to_string()), ("since", cursor.as_query())])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(NetError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        let body = resp.text().await?;
        Ok(parse_poll_response(&body))
    }

    async fn health(&self) -> Result<(), NetError> {
        let url = format!("{}/v1/health", self.base_url);
        let resp = self.client.get(&url).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(NetError::Status {
                url,
                status: resp.status().as_u16(),
            })
        }
    }

    fn server_url(&self) -> &str {
        &self.base_url
    }
}

/// Parse newline-delimited ntfy events, keeping only published messages.
fn parse_poll_response(body: &str) -> Vec<RelayMessage> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<NtfyEvent>(line) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(error = %e, "Skipping unparsable relay line");
                None
            }
        })
        .filter(|event| event.event == "message")
        .filter_map(|event| {
            event.message.map(|text| RelayMessage {
                id: event.id,
                time: event.time,
                text,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_poll_response() {
        let body = concat!(
            r#"{"id":"a1","time":100,"event":"open","topic":"t"}"#,
            "\n",
            r#"{"id":"a2","time":101,"event":"message","topic":"t","message":"first"}"#,
            "\n\n",
            "garbage\n",
            r#"{"id":"a3","time":102,"event":"keepalive","topic":"t"}"#,
            "\n",
            r#"{"id":"a4","time":103,"event":"message","topic":"t","message":"second"}"#,
        );

        let messages = parse_poll_response(body);
        assert_eq!(
            messages,
            vec![
                RelayMessage {
                    id: "a2".into(),
                    time: 101,
                    text: "first".into()
                },
                RelayMessage {
                    id: "a4".into(),
                    time: 103,
                    text: "second".into()
                },
            ]
        );
    }

    #[test]
    fn test_topic_url_trims_slash() {
        let relay = NtfyRelay::new("https://ntfy.example/", "enchat-abc", &HttpOptions::default())
            .unwrap();
        assert_eq!(relay.topic_url(), "https://ntfy.example/enchat-abc");
        assert_eq!(relay.server_url(), "https://ntfy.example");
    }

    #[tokio::test]
    async fn test_oversized_publish_is_refused_without_network() {
        // Nothing listens here; the size check must fire before any request.
        let relay = NtfyRelay::new("http://127.0.0.1:9", "t", &HttpOptions::default()).unwrap();
        let err = relay.publish(&"x".repeat(MAX_RELAY_MESSAGE_BYTES + 1)).await.unwrap_err();
        assert!(matches!(
            err,
            NetError::TooLarge { size, max: MAX_RELAY_MESSAGE_BYTES } if size == MAX_RELAY_MESSAGE_BYTES + 1
        ));
        assert!(err.is_permanent());
    }
}
