//! Public entry point of the sync client.
//!
//! A [`Repository`] ties the cache, the fetch coordinator, the stream
//! manager and the subscriber registry together. Every clone is a handle to
//! the same state.
//!
//! ## Load path
//! - **Cold** (no entry): awaits one coalesced fetch. This is the only path
//!   that blocks on the network.
//! - **Warm, stale**: returns the cached payload and starts a coalesced
//!   background refresh before returning.
//! - **Warm, fresh**: returns the cached payload.
//!
//! Every update (fetch result or stream event) replaces the cache entry and
//! then notifies all callbacks bound to the key.
mod builder;

pub use builder::*;


use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::metrics::CACHE_LOOKUPS;
use crate::model::ClientIdGenerator;
use crate::CacheEntry;
use crate::CacheState;
use crate::CacheStore;
use crate::ClientId;
use crate::ConfigKey;
use crate::FeatureFetcher;
use crate::FetchCoordinator;
use crate::Payload;
use crate::Result;
use crate::StreamManager;
use crate::SubscriberRegistry;
use crate::UpdateCallback;
use crate::UpdateSink;

/// Per-call options of [`Repository::load`]
#[derive(Clone, Default)]
pub struct LoadOptions {
    /// Keep a realtime subscription open for the key
    pub streaming: bool,
    /// TTL for entries written by this load instead of the default
    pub ttl_override: Option<Duration>,
    /// Bound to the client for later updates of the key
    pub on_update: Option<UpdateCallback>,
}

impl std::fmt::Debug for LoadOptions {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoadOptions")
            .field("streaming", &self.streaming)
            .field("ttl_override", &self.ttl_override)
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streaming(
        mut self,
        streaming: bool,
    ) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn ttl_override(
        mut self,
        ttl: Duration,
    ) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    pub fn on_update<F>(
        mut self,
        callback: F,
    ) -> Self
    where
        F: Fn(Arc<Payload>) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(callback));
        self
    }
}

pub(crate) struct RepositoryInner {
    pub(crate) cache: CacheStore,
    pub(crate) coordinator: FetchCoordinator,
    pub(crate) streams: StreamManager,
    pub(crate) registry: SubscriberRegistry,
    pub(crate) fetcher: Arc<dyn FeatureFetcher>,
    pub(crate) clients: ClientIdGenerator,
    /// Serializes put and fan-out per key
    pub(crate) write_locks: DashMap<ConfigKey, Arc<Mutex<()>>>,
}

impl RepositoryInner {
    /// Single write path for fetched and streamed payloads.
    ///
    /// Writers of one key are serialized through put and notify, so the last
    /// payload every callback sees is the one left in the cache.
    fn apply_update(
        &self,
        key: &ConfigKey,
        payload: Arc<Payload>,
        ttl: Option<Duration>,
    ) -> Arc<CacheEntry> {
        let lock = self.write_locks.entry(key.clone()).or_default().clone();
        let _guard = lock.lock();
        let entry = self.cache.put(key, payload.clone(), ttl);
        self.registry.notify_all(key, &payload);
        entry
    }
}

#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepositoryInner>,
}

impl std::fmt::Debug for Repository {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("cache", &self.inner.cache)
            .field("coordinator", &self.inner.coordinator)
            .field("streams", &self.inner.streams)
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl Repository {
    pub(crate) fn from_inner(inner: RepositoryInner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    /// Issues a handle identifying one consumer
    pub fn new_client(&self) -> ClientId {
        self.inner.clients.next_id()
    }

    /// Returns the best known payload for `key`, fetching it if nothing is
    /// cached, and wires up streaming and the update callback from
    /// `options`.
    ///
    /// `None` means the key was cold and the fetch failed. In that case no
    /// stream is opened and no callback is bound.
    pub async fn load(
        &self,
        client: ClientId,
        key: &ConfigKey,
        options: LoadOptions,
    ) -> Option<Arc<Payload>> {
        let LoadOptions {
            streaming,
            ttl_override,
            on_update,
        } = options;

        let entry = self.inner.cache.get(key);
        let state = CacheState::of(entry.as_deref());
        CACHE_LOOKUPS.with_label_values(&[state.as_label()]).inc();
        trace!(%key, %client, ?state, "load");

        let payload = match entry {
            None => match self.fetch_and_store(key, ttl_override).await {
                Some(payload) => payload,
                None => {
                    debug!(%key, %client, "cold load failed, nothing to serve");
                    return None;
                }
            },
            Some(entry) => {
                if state == CacheState::WarmStale {
                    self.start_background_refresh(key, ttl_override);
                }
                entry.payload().clone()
            }
        };

        if streaming {
            self.inner.streams.ensure_stream(key, client, self.stream_sink());
        }
        if let Some(callback) = on_update {
            self.inner.registry.register(client, key, callback);
        }
        Some(payload)
    }

    /// Binds `callback` to `key` for `client`, replacing any earlier binding
    pub fn on_update<F>(
        &self,
        client: ClientId,
        key: &ConfigKey,
        callback: F,
    ) where
        F: Fn(Arc<Payload>) + Send + Sync + 'static,
    {
        self.inner.registry.register(client, key, Arc::new(callback));
    }

    /// Removes `client`'s callback and its interest in every stream.
    /// Calling it again, or for an unknown client, does nothing.
    pub fn off_update(
        &self,
        client: ClientId,
    ) {
        self.inner.registry.unregister(client);
        let closed = self.inner.streams.release_client(client);
        if closed > 0 {
            debug!(%client, closed, "client release closed stream subscriptions");
        }
    }

    /// Fetches `key` now (joining any fetch already in flight) and returns
    /// the result, or `None` if the fetch failed.
    pub async fn refresh(
        &self,
        key: &ConfigKey,
    ) -> Option<Arc<Payload>> {
        self.fetch_and_store(key, None).await
    }

    pub fn state(
        &self,
        key: &ConfigKey,
    ) -> CacheState {
        self.inner.cache.state(key)
    }

    /// Cached payload for `key` without any network activity
    pub fn cached(
        &self,
        key: &ConfigKey,
    ) -> Option<Arc<Payload>> {
        self.inner.cache.get(key).map(|entry| entry.payload().clone())
    }

    pub fn is_fetching(
        &self,
        key: &ConfigKey,
    ) -> bool {
        self.inner.coordinator.is_in_flight(key)
    }

    pub fn is_streaming(
        &self,
        key: &ConfigKey,
    ) -> bool {
        self.inner.streams.is_streaming(key)
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    /// Closes every stream subscription. Cached data and callbacks stay.
    pub fn shutdown(&self) {
        let closed = self.inner.streams.shutdown();
        info!(closed, "repository shut down");
    }

    async fn fetch_and_store(
        &self,
        key: &ConfigKey,
        ttl: Option<Duration>,
    ) -> Option<Arc<Payload>> {
        let work = self.fetch_work(key, ttl);
        self.inner.coordinator.fetch(key, work).await
    }

    fn start_background_refresh(
        &self,
        key: &ConfigKey,
        ttl: Option<Duration>,
    ) {
        let work = self.fetch_work(key, ttl);
        if self.inner.coordinator.refresh_in_background(key, work) {
            debug!(%key, "stale entry served, refreshing in background");
        }
    }

    /// One network fetch whose result is written and fanned out exactly
    /// once, however many callers share it.
    fn fetch_work(
        &self,
        key: &ConfigKey,
        ttl: Option<Duration>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Arc<Payload>>> {
        let inner = self.inner.clone();
        let key = key.clone();
        move || {
            async move {
                let payload = Arc::new(inner.fetcher.fetch(&key).await?);
                inner.apply_update(&key, payload.clone(), ttl);
                Ok(payload)
            }
            .boxed()
        }
    }

    /// Stream events reset staleness with the default TTL
    fn stream_sink(&self) -> UpdateSink {
        let inner: Weak<RepositoryInner> = Arc::downgrade(&self.inner);
        Arc::new(move |key: &ConfigKey, payload: Payload| {
            if let Some(inner) = inner.upgrade() {
                inner.apply_update(key, Arc::new(payload), None);
            }
        })
    }
}
