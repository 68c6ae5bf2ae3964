use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;
use tracing::Instrument;

use super::EventStream;
use super::StreamEvent;
use super::StreamMessage;
use super::TransportFactory;
use crate::constants::FEATURES_EVENT;
use crate::metrics::ACTIVE_STREAMS;
use crate::metrics::STREAM_EVENTS;
use crate::ClientId;
use crate::ConfigKey;
use crate::Payload;

/// Receives every decoded `features` payload of a subscription
pub type UpdateSink = Arc<dyn Fn(&ConfigKey, Payload) + Send + Sync>;

struct StreamSubscription {
    interested: HashSet<ClientId>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StreamSubscription {
    fn close(self) {
        self.cancel.cancel();
        ACTIVE_STREAMS.dec();
    }
}

/// Keeps at most one realtime subscription per key, shared by every client
/// interested in it.
///
/// A subscription opens on first interest and closes when the last
/// interested client is released. If its connection ended on its own (the
/// transport gave up), the next `ensure_stream` for the key opens a new one.
pub struct StreamManager {
    factory: Arc<dyn TransportFactory>,
    subscriptions: Mutex<HashMap<ConfigKey, StreamSubscription>>,
}

impl std::fmt::Debug for StreamManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

impl StreamManager {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Records `client`'s interest in `key`, opening a subscription that
    /// feeds `sink` if none is running. Returns whether a connection was
    /// started. Must be called inside a tokio runtime.
    pub fn ensure_stream(
        &self,
        key: &ConfigKey,
        client: ClientId,
        sink: UpdateSink,
    ) -> bool {
        let mut subscriptions = self.subscriptions.lock();

        if let Some(subscription) = subscriptions.get_mut(key) {
            subscription.interested.insert(client);
            if !subscription.task.is_finished() {
                trace!(%key, %client, "joined running stream");
                return false;
            }
            debug!(%key, "previous stream connection ended, reopening");
            subscription.cancel = CancellationToken::new();
            subscription.task = self.spawn_subscription(key, sink, subscription.cancel.clone());
            return true;
        }

        let cancel = CancellationToken::new();
        let task = self.spawn_subscription(key, sink, cancel.clone());
        subscriptions.insert(
            key.clone(),
            StreamSubscription {
                interested: HashSet::from([client]),
                cancel,
                task,
            },
        );
        ACTIVE_STREAMS.inc();
        info!(%key, %client, "stream subscription opened");
        true
    }

    /// Drops `client`'s interest in `key`. Returns whether that closed the
    /// subscription. Unknown keys or clients are ignored.
    pub fn release_interest(
        &self,
        key: &ConfigKey,
        client: ClientId,
    ) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let Some(subscription) = subscriptions.get_mut(key) else {
            return false;
        };
        if !subscription.interested.remove(&client) || !subscription.interested.is_empty() {
            return false;
        }

        if let Some(subscription) = subscriptions.remove(key) {
            subscription.close();
            info!(%key, "stream subscription closed");
        }
        true
    }

    /// Drops `client`'s interest everywhere. Returns how many subscriptions
    /// closed as a result.
    pub fn release_client(
        &self,
        client: ClientId,
    ) -> usize {
        let keys: Vec<ConfigKey> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|(_, s)| s.interested.contains(&client))
            .map(|(k, _)| k.clone())
            .collect();

        keys.iter().filter(|key| self.release_interest(key, client)).count()
    }

    pub fn interest_count(
        &self,
        key: &ConfigKey,
    ) -> usize {
        self.subscriptions
            .lock()
            .get(key)
            .map(|s| s.interested.len())
            .unwrap_or(0)
    }

    /// Whether a connection task is currently running for `key`
    pub fn is_streaming(
        &self,
        key: &ConfigKey,
    ) -> bool {
        self.subscriptions
            .lock()
            .get(key)
            .map(|s| !s.task.is_finished())
            .unwrap_or(false)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Closes every subscription. Returns how many were open.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<StreamSubscription> = self.subscriptions.lock().drain().map(|(_, s)| s).collect();
        let closed = drained.len();
        drained.into_iter().for_each(StreamSubscription::close);
        if closed > 0 {
            info!(closed, "stream subscriptions shut down");
        }
        closed
    }

    fn spawn_subscription(
        &self,
        key: &ConfigKey,
        sink: UpdateSink,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(run_subscription(self.factory.clone(), key.clone(), sink, cancel).in_current_span())
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        for (_, subscription) in self.subscriptions.get_mut().drain() {
            subscription.close();
        }
    }
}

async fn run_subscription(
    factory: Arc<dyn TransportFactory>,
    key: ConfigKey,
    sink: UpdateSink,
    cancel: CancellationToken,
) {
    let mut events: EventStream = tokio::select! {
        _ = cancel.cancelled() => return,
        connected = factory.connect(&key) => match connected {
            Ok(events) => events,
            Err(e) => {
                warn!(%key, "stream connect failed: {}", e);
                return;
            }
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%key, "stream connection released");
                return;
            }
            next = events.next() => match next {
                Some(Ok(event)) => dispatch(&key, event, &sink),
                Some(Err(e)) => {
                    warn!(%key, "stream ended with error: {}", e);
                    return;
                }
                None => {
                    info!(%key, "stream ended");
                    return;
                }
            }
        }
    }
}

fn dispatch(
    key: &ConfigKey,
    event: StreamEvent,
    sink: &UpdateSink,
) {
    match StreamMessage::decode(&event) {
        Ok(StreamMessage::Features(payload)) => {
            STREAM_EVENTS.with_label_values(&[FEATURES_EVENT]).inc();
            debug!(%key, "features event received");
            sink(key, payload);
        }
        Ok(StreamMessage::Unknown(event_type)) => {
            STREAM_EVENTS.with_label_values(&["other"]).inc();
            trace!(%key, %event_type, "ignoring stream event");
        }
        Err(e) => {
            STREAM_EVENTS.with_label_values(&["undecodable"]).inc();
            warn!(%key, "dropping undecodable stream event: {}", e);
        }
    }
}
