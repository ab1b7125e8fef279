//! The relay is the only transport: publish a text message to a topic, read
//! everything published after a cursor. It offers no ordering or access
//! control beyond arrival order on its side.

use async_trait::async_trait;

use crate::error::NetError;

/// One message as stored by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// Relay-assigned id, usable as a cursor.
    pub id: String,
    /// Relay arrival time (unix seconds).
    pub time: i64,
    pub text: String,
}

/// Where to resume reading a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Everything the relay still retains.
    All,
    /// Messages that arrived at or after this unix time.
    Since(i64),
    /// Messages that arrived after the message with this id.
    After(String),
}

impl Cursor {
    pub fn as_query(&self) -> String {
        match self {
            Self::All => "all".to_string(),
            Self::Since(time) => time.to_string(),
            Self::After(id) => id.clone(),
        }
    }
}

#[async_trait]
pub trait Relay: Send + Sync + 'static {
    /// Publish one message to the room topic.
    async fn publish(&self, text: &str) -> Result<(), NetError>;

    /// Fetch messages newer than `cursor`, in relay arrival order.
    async fn fetch_since(&self, cursor: &Cursor) -> Result<Vec<RelayMessage>, NetError>;

    /// Check that the relay answers at all.
    async fn health(&self) -> Result<(), NetError>;

    /// Base URL shown to the user.
    fn server_url(&self) -> &str;
}
