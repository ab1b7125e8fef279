//! Client for the link broker that holds encrypted share-link payloads.
//!
//! The broker only ever sees ciphertext. Use counts and expiry are enforced
//! on its side.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use enchat_shared::share_link::{LinkComponents, ShareLink};
use enchat_shared::{LinkError, RoomCredentials};

use crate::error::NetError;
use crate::http::{build_client, HttpOptions};

const CREATE_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    payload: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uses: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayloadResponse {
    payload: Option<String>,
}

pub struct LinkBroker {
    client: reqwest::Client,
    base_url: String,
}

impl LinkBroker {
    /// Request timeouts are set per call; only the proxy in `options` is used.
    pub fn new(base_url: &str, options: &HttpOptions) -> Result<Self, NetError> {
        let options = HttpOptions {
            timeout: None,
            proxy: options.proxy.clone(),
        };
        Ok(Self {
            client: build_client(&options)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Store an encrypted payload and return the broker's session id.
    pub async fn create_session(
        &self,
        payload: &str,
        ttl: Option<u64>,
        uses: Option<u32>,
    ) -> Result<String, NetError> {
        let url = format!("{}/create", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(CREATE_TIMEOUT)
            .json(&CreateRequest { payload, ttl, uses })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(NetError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        let body: CreateResponse = resp.json().await?;
        body.session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| NetError::InvalidResponse("broker returned no session id".into()))
    }

    /// Fetch the payload behind a session id. Consumes one use on the broker,
    /// which answers 404 once the link has expired or run out of uses.
    pub async fn fetch_payload(&self, session_id: &str) -> Result<String, NetError> {
        let url = format!("{}/get/{}", self.base_url, session_id);
        let resp = self.client.get(&url).timeout(FETCH_TIMEOUT).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LinkError::ExpiredOrUsed.into());
        }
        if !resp.status().is_success() {
            return Err(NetError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        let body: PayloadResponse = resp.json().await?;
        body.payload
            .ok_or_else(|| NetError::InvalidResponse("broker returned no payload".into()))
    }

    /// Encrypt `creds` under a fresh key, upload it and build the share URL.
    pub async fn share_room(
        &self,
        creds: &RoomCredentials,
        ttl: Option<u64>,
        uses: Option<u32>,
    ) -> Result<String, NetError> {
        let components = LinkComponents::generate(creds)?;
        let session_id = self.create_session(&components.payload, ttl, uses).await?;
        info!(room = %creds.room, ?ttl, ?uses, "Created share link");

        Ok(ShareLink {
            session_id,
            key: components.key,
        }
        .to_url(&self.base_url))
    }
}

/// Resolve a share URL into room credentials. The broker is taken from the
/// URL itself so links work regardless of the local broker setting.
pub async fn join_from_link(url: &str, options: &HttpOptions) -> Result<RoomCredentials, NetError> {
    let link = ShareLink::parse(url)?;
    let broker_url = url
        .trim()
        .split_once("/join#")
        .map(|(base, _)| base)
        .unwrap_or_default();

    debug!(broker = %broker_url, "Fetching share link payload");
    let payload = LinkBroker::new(broker_url, options)?
        .fetch_payload(&link.session_id)
        .await?;
    Ok(link.decrypt_credentials(&payload)?)
}
