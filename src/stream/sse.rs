use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::EventStream;
use super::StreamEvent;
use super::TransportFactory;
use crate::constants::DEFAULT_MAX_EVENT_BYTES;
use crate::constants::SSE_DEFAULT_EVENT;
use crate::utils::async_task::spawn_detached;
use crate::BackoffPolicy;
use crate::ConfigKey;
use crate::Result;
use crate::StreamConfig;
use crate::StreamError;

/// Incremental `text/event-stream` decoder.
///
/// Bytes are buffered until a full line is available, so chunk boundaries may
/// fall anywhere, including inside a multi-byte character.
///
/// A line or an event body longer than `max_event_bytes` is discarded along
/// with the rest of its event; decoding resumes with the next event.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event_type: Option<String>,
    data: Vec<String>,
    data_len: usize,
    max_event_bytes: usize,
    /// Dropping bytes up to the next newline
    skipping_line: bool,
    /// Dropping fields up to the next blank line
    skipping_event: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_EVENT_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_event_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            event_type: None,
            data: Vec::new(),
            data_len: 0,
            max_event_bytes,
            skipping_line: false,
            skipping_event: false,
        }
    }

    /// Bytes held for the line currently being read
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds one chunk and returns every event it completed
    pub fn push(
        &mut self,
        mut chunk: &[u8],
    ) -> Vec<StreamEvent> {
        if self.skipping_line {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    chunk = &chunk[pos + 1..];
                    self.skipping_line = false;
                }
                None => return Vec::new(),
            }
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(event) = self.process_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }

        if self.buffer.len() > self.max_event_bytes {
            warn!(
                buffered = self.buffer.len(),
                limit = self.max_event_bytes,
                "sse line exceeds size limit, discarding event"
            );
            self.buffer = Vec::new();
            self.skipping_line = true;
            self.discard_event();
        }
        events
    }

    fn discard_event(&mut self) {
        self.event_type = None;
        self.data = Vec::new();
        self.data_len = 0;
        self.skipping_event = true;
    }

    fn process_line(
        &mut self,
        line: &str,
    ) -> Option<StreamEvent> {
        if line.is_empty() {
            if self.skipping_event {
                self.skipping_event = false;
                return None;
            }
            return self.dispatch();
        }
        if self.skipping_event {
            return None;
        }
        if line.len() > self.max_event_bytes {
            warn!(
                size = line.len(),
                limit = self.max_event_bytes,
                "sse line exceeds size limit, discarding event"
            );
            self.discard_event();
            return None;
        }
        if line.starts_with(':') {
            trace!("sse comment: {}", line);
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => {
                self.data_len += value.len() + 1;
                if self.data_len > self.max_event_bytes {
                    warn!(
                        size = self.data_len,
                        limit = self.max_event_bytes,
                        "sse event body exceeds size limit, discarding event"
                    );
                    self.discard_event();
                } else {
                    self.data.push(value.to_string());
                }
            }
            // id and retry are not used: reconnects always resume from a full payload
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<StreamEvent> {
        let event_type = self.event_type.take();
        if self.data.is_empty() {
            return None;
        }
        self.data_len = 0;
        let body = std::mem::take(&mut self.data).join("\n");
        let event_type = match event_type {
            Some(t) if !t.is_empty() => t,
            _ => SSE_DEFAULT_EVENT.to_string(),
        };
        Some(StreamEvent::new(event_type, body))
    }
}

/// Server-sent events over HTTP at `{api_host}{subscribe_path}/{client_key}`.
///
/// `connect` fails if the first connection cannot be opened. After that a
/// reader task owns the connection and reconnects with `StreamConfig::reconnect`
/// whenever it drops; exhausting that policy ends the stream with
/// [`StreamError::ReconnectExhausted`].
#[derive(Debug, Clone)]
pub struct SseTransportFactory {
    client: reqwest::Client,
    config: StreamConfig,
}

impl SseTransportFactory {
    pub fn new(config: StreamConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(
        client: reqwest::Client,
        config: StreamConfig,
    ) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl TransportFactory for SseTransportFactory {
    async fn connect(
        &self,
        key: &ConfigKey,
    ) -> Result<EventStream> {
        let url = key.endpoint(&self.config.subscribe_path);
        let response = open(&self.client, &url, &self.config.reconnect).await?;
        info!(%key, "stream connected");

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let connection = SseConnection {
            client: self.client.clone(),
            url,
            policy: self.config.reconnect,
            max_event_bytes: self.config.max_event_bytes,
            tx,
        };
        spawn_detached("sse reader", connection.run(response));

        Ok(ReceiverStream::new(rx).boxed())
    }
}

async fn open(
    client: &reqwest::Client,
    url: &str,
    policy: &BackoffPolicy,
) -> Result<reqwest::Response> {
    debug!(url, "opening event stream");
    let request = client.get(url).header(ACCEPT, "text/event-stream").send();
    let response = timeout(policy.timeout(), request)
        .await
        .map_err(|_| StreamError::Timeout(policy.timeout()))?
        .map_err(|source| StreamError::Connect {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
        .into());
    }
    Ok(response)
}

/// Reader side of one SSE subscription; lives until the consumer drops the
/// stream or reconnecting is given up.
struct SseConnection {
    client: reqwest::Client,
    url: String,
    policy: BackoffPolicy,
    max_event_bytes: usize,
    tx: mpsc::Sender<Result<StreamEvent>>,
}

impl SseConnection {
    async fn run(
        self,
        first: reqwest::Response,
    ) -> Result<()> {
        let mut response = first;
        loop {
            if !self.read(response).await {
                debug!(url = %self.url, "event stream consumer gone");
                return Ok(());
            }
            response = match self.reconnect().await {
                Some(response) => response,
                None => return Ok(()),
            };
        }
    }

    /// Forwards events until the connection drops. Returns false once the
    /// consumer is gone.
    async fn read(
        &self,
        response: reqwest::Response,
    ) -> bool {
        let mut decoder = SseDecoder::with_limit(self.max_event_bytes);
        let mut body = response.bytes_stream();
        loop {
            tokio::select! {
                _ = self.tx.closed() => return false,
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for event in decoder.push(&bytes) {
                            if self.tx.send(Ok(event)).await.is_err() {
                                return false;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(url = %self.url, "event stream interrupted: {}", e);
                        return true;
                    }
                    None => {
                        info!(url = %self.url, "event stream closed by server");
                        return true;
                    }
                }
            }
        }
    }

    /// Reopens the connection with capped exponential backoff. `None` when
    /// the consumer is gone or the policy is exhausted; the latter is
    /// reported on the stream first.
    async fn reconnect(&self) -> Option<reqwest::Response> {
        let mut attempts = 0usize;
        loop {
            if !self.policy.allows(attempts) {
                warn!(url = %self.url, attempts, "giving up on event stream");
                let _ = self.tx.send(Err(StreamError::ReconnectExhausted { attempts }.into())).await;
                return None;
            }

            tokio::select! {
                _ = self.tx.closed() => return None,
                _ = sleep(self.policy.delay_for(attempts as u32)) => {}
            }
            attempts += 1;

            match open(&self.client, &self.url, &self.policy).await {
                Ok(response) => {
                    info!(url = %self.url, attempts, "event stream reconnected");
                    return Some(response);
                }
                Err(e) => warn!(url = %self.url, attempts, "event stream reconnect failed: {}", e),
            }
        }
    }
}
