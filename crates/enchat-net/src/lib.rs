// Relay transport, envelope codec and the outbound/inbound workers.

pub mod broker;
pub mod codec;
pub mod error;
pub mod http;
pub mod listener;
pub mod memory;
pub mod ntfy;
pub mod outbox;
pub mod relay;

pub use broker::{join_from_link, LinkBroker};
pub use codec::{Envelope, EnvelopeCodec};
pub use error::NetError;
pub use http::HttpOptions;
pub use listener::{spawn_listener, Connectivity, Inbound, ListenerConfig, RelayOp};
pub use memory::MemoryRelay;
pub use ntfy::NtfyRelay;
pub use outbox::{spawn_outbox, OutboundOp, Outbox, OutboxConfig};
pub use relay::{Cursor, Relay, RelayMessage};
