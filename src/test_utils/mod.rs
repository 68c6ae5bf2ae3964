//! Fakes and fixtures shared by the unit tests.
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::ConfigKey;
use crate::EventStream;
use crate::FeatureFetcher;
use crate::FetchError;
use crate::Payload;
use crate::Result;
use crate::StreamEvent;
use crate::TransportFactory;

pub(crate) fn test_key() -> ConfigKey {
    ConfigKey::new("https://api.example.com", "abc123")
}

/// `{"features":{"<flag>":{"defaultValue":<value_json>}}}`
pub(crate) fn features_payload(
    flag: &str,
    value_json: &str,
) -> Arc<Payload> {
    Arc::new(features_document(flag, value_json))
}

pub(crate) fn features_document(
    flag: &str,
    value_json: &str,
) -> Payload {
    let text = format!(r#"{{"features":{{"{flag}":{{"defaultValue":{value_json}}}}}}}"#);
    Payload::from_json(&text).expect("valid features document")
}

/// Fetcher answering every call with the current payload, or a 503 once
/// switched to failing. Counts calls and can hold each one for `delay`.
pub(crate) struct CountingFetcher {
    calls: AtomicUsize,
    response: Mutex<Option<Payload>>,
    delay: Duration,
}

impl CountingFetcher {
    pub(crate) fn new(payload: Payload) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            response: Mutex::new(Some(payload)),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            response: Mutex::new(None),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn with_delay(
        mut self,
        delay: Duration,
    ) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn respond_with(
        &self,
        payload: Payload,
    ) {
        *self.response.lock() = Some(payload);
    }

    pub(crate) fn fail(&self) {
        *self.response.lock() = None;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeatureFetcher for CountingFetcher {
    async fn fetch(
        &self,
        key: &ConfigKey,
    ) -> Result<Payload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = self.response.lock().clone();
        response.ok_or_else(|| {
            FetchError::Status {
                url: key.to_string(),
                status: 503,
            }
            .into()
        })
    }
}

/// Transport whose connections are fed by the test through [`Self::send`].
#[derive(Default)]
pub(crate) struct ChannelTransportFactory {
    senders: Mutex<HashMap<ConfigKey, mpsc::UnboundedSender<Result<StreamEvent>>>>,
    connects: AtomicUsize,
}

impl ChannelTransportFactory {
    /// Pushes one event into the open connection for `key`. Returns false
    /// when no connection is open.
    pub(crate) fn send(
        &self,
        key: &ConfigKey,
        event_type: &str,
        body: &str,
    ) -> bool {
        self.senders
            .lock()
            .get(key)
            .map(|tx| tx.send(Ok(StreamEvent::new(event_type, body))).is_ok())
            .unwrap_or(false)
    }

    /// Ends the open connection for `key` as if the server hung up
    pub(crate) fn disconnect(
        &self,
        key: &ConfigKey,
    ) {
        self.senders.lock().remove(key);
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Whether the consumer side of the connection for `key` is still alive
    pub(crate) fn is_open(
        &self,
        key: &ConfigKey,
    ) -> bool {
        self.senders.lock().get(key).map(|tx| !tx.is_closed()).unwrap_or(false)
    }
}

#[async_trait]
impl TransportFactory for ChannelTransportFactory {
    async fn connect(
        &self,
        key: &ConfigKey,
    ) -> Result<EventStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().insert(key.clone(), tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

/// Polls `condition` every millisecond until it holds or `within` elapses
pub(crate) async fn eventually<F>(
    within: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
