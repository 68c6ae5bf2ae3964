use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use super::BackoffPolicy;
use crate::constants::DEFAULT_MAX_EVENT_BYTES;
use crate::Result;

/// Realtime channel settings used by [`crate::SseTransportFactory`]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamConfig {
    /// Path appended to the api host, followed by `/{client_key}`
    /// Default: "/sub"
    #[serde(default = "default_subscribe_path")]
    pub subscribe_path: String,

    /// Buffered events between the connection reader and the subscription
    /// Default: 16
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Longest line or event body accepted from the server; larger events
    /// are dropped
    /// Default: 1 MiB
    #[serde(default = "default_max_event_bytes")]
    pub max_event_bytes: usize,

    /// Reconnect policy. `max_retries = 0` keeps reconnecting forever;
    /// `timeout_ms` bounds connection establishment.
    #[serde(default = "default_reconnect")]
    pub reconnect: BackoffPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subscribe_path: default_subscribe_path(),
            channel_capacity: default_channel_capacity(),
            max_event_bytes: default_max_event_bytes(),
            reconnect: default_reconnect(),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.subscribe_path.starts_with('/') {
            return Err(invalid(format!(
                "stream.subscribe_path must start with '/', got {:?}",
                self.subscribe_path
            )));
        }
        if self.channel_capacity == 0 {
            return Err(invalid("stream.channel_capacity must be greater than 0"));
        }
        if self.max_event_bytes == 0 {
            return Err(invalid("stream.max_event_bytes must be greater than 0"));
        }
        self.reconnect.validate("stream.reconnect")
    }
}

fn default_subscribe_path() -> String {
    "/sub".into()
}
fn default_channel_capacity() -> usize {
    16
}
fn default_max_event_bytes() -> usize {
    DEFAULT_MAX_EVENT_BYTES
}
fn default_reconnect() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 0,
        timeout_ms: 10_000,
        base_delay_ms: 1_000,
        max_delay_ms: 30_000,
    }
}
