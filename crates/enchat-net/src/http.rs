//! HTTP client construction shared by the relay and the link broker.

use std::time::Duration;

use tracing::info;

use crate::error::NetError;

#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    /// Whole-request timeout. `None` leaves it to each request.
    pub timeout: Option<Duration>,
    /// Proxy for every request, e.g. a local Tor SOCKS port.
    pub proxy: Option<String>,
}

impl HttpOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            proxy: None,
        }
    }

    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}

pub fn build_client(options: &HttpOptions) -> Result<reqwest::Client, NetError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(proxy) = &options.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        info!(%proxy, "Routing relay traffic through proxy");
    }
    Ok(builder.build()?)
}
