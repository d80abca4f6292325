//! Shared HTTP plumbing for marketplace adapters.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::config::{Endpoints, Timeouts};
use crate::{ChannelError, Result};

const USER_AGENT: &str = concat!("opensase-channels/", env!("CARGO_PKG_VERSION"));

/// Operation class, used to pick a per-call timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallClass { Read, Write, Sync }

/// HTTP client shared by every adapter.
#[derive(Clone, Debug)]
pub struct ChannelHttp {
    client: Client,
    endpoints: Arc<Endpoints>,
    timeouts: Timeouts,
}

impl ChannelHttp {
    pub fn new(endpoints: Endpoints, timeouts: Timeouts) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        tracing::debug!(read_ms = timeouts.read.as_millis() as u64, sync_ms = timeouts.sync.as_millis() as u64, "channel http client created");
        Ok(Self { client, endpoints: Arc::new(endpoints), timeouts })
    }

    pub fn client(&self) -> &Client { &self.client }
    pub fn endpoints(&self) -> &Endpoints { &self.endpoints }

    pub fn timeout(&self, class: CallClass) -> Duration {
        match class {
            CallClass::Read => self.timeouts.read,
            CallClass::Write => self.timeouts.write,
            CallClass::Sync => self.timeouts.sync,
        }
    }

    /// Sends a request and decodes a JSON body. Non-2xx becomes [`ChannelError::Api`];
    /// an empty body decodes to `Value::Null`.
    pub async fn send_json(&self, request: RequestBuilder, class: CallClass) -> Result<Value> {
        let response = request.timeout(self.timeout(class)).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&body).trim().to_string();
            let message = if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            };
            return Err(ChannelError::Api { status: status.as_u16(), message });
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Length of the array at `pointer`, or zero when absent.
pub fn count_at(body: &Value, pointer: &str) -> u32 {
    body.pointer(pointer).and_then(Value::as_array).map_or(0, |items| items.len() as u32)
}
