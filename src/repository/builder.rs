//! Assembles a [`Repository`] from [`Settings`].
//!
//! Collaborators default to the production implementations (`HttpFetcher`,
//! `SseTransportFactory`, the durable store selected by `storage.backend`)
//! and can each be replaced before `build()`.
//!
//! ## Example
//! ```ignore
//! let repository = RepositoryBuilder::new(Settings::new()?)
//!     .durable_store(Arc::new(MemoryStore::new())) // optional override
//!     .build()?;
//! ```

use std::sync::Arc;

use dashmap::DashMap;

use tracing::info;
use tracing::warn;

use super::Repository;
use super::RepositoryInner;
use crate::model::ClientIdGenerator;
use crate::open_durable_store;
use crate::CacheStore;
use crate::DurableStore;
use crate::FeatureFetcher;
use crate::FetchCoordinator;
use crate::HttpFetcher;
use crate::Result;
use crate::Settings;
use crate::SseTransportFactory;
use crate::StreamManager;
use crate::SubscriberRegistry;
use crate::TransportFactory;

pub struct RepositoryBuilder {
    settings: Settings,
    fetcher: Option<Arc<dyn FeatureFetcher>>,
    transport: Option<Arc<dyn TransportFactory>>,
    durable_store: Option<Arc<dyn DurableStore>>,
    http_client: Option<reqwest::Client>,
}

impl Repository {
    pub fn builder(settings: Settings) -> RepositoryBuilder {
        RepositoryBuilder::new(settings)
    }
}

impl RepositoryBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            fetcher: None,
            transport: None,
            durable_store: None,
            http_client: None,
        }
    }

    /// Sets a custom fetch implementation
    pub fn fetcher(
        mut self,
        fetcher: Arc<dyn FeatureFetcher>,
    ) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets a custom realtime transport
    pub fn transport(
        mut self,
        transport: Arc<dyn TransportFactory>,
    ) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the durable store instead of opening `storage.backend`
    pub fn durable_store(
        mut self,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        self.durable_store = Some(store);
        self
    }

    /// HTTP client shared by the default fetcher and transport
    pub fn http_client(
        mut self,
        client: reqwest::Client,
    ) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Validates the settings, wires every component and seeds the cache
    /// from durable storage.
    ///
    /// A durable store that cannot be opened is logged and the cache runs in
    /// memory only.
    pub fn build(self) -> Result<Repository> {
        let settings = self.settings.validate()?;
        let client = self.http_client.unwrap_or_default();

        let fetcher = self.fetcher.unwrap_or_else(|| {
            Arc::new(HttpFetcher::with_client(client.clone(), settings.fetch.clone())) as Arc<dyn FeatureFetcher>
        });
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(SseTransportFactory::with_client(client, settings.stream.clone())) as Arc<dyn TransportFactory>
        });

        let durable = match self.durable_store {
            Some(store) => Some(store),
            None if settings.cache.persist => match open_durable_store(&settings.storage) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!("durable storage unavailable, cache runs in memory only: {}", e);
                    None
                }
            },
            None => None,
        };

        let cache = CacheStore::new(&settings.cache, durable);
        let seeded = cache.load_from_durable_storage();
        info!(seeded, persisting = cache.is_persisting(), "repository ready");

        Ok(Repository::from_inner(RepositoryInner {
            cache,
            coordinator: FetchCoordinator::new(),
            streams: StreamManager::new(transport),
            registry: SubscriberRegistry::new(),
            fetcher,
            clients: ClientIdGenerator::default(),
            write_locks: DashMap::new(),
        }))
    }
}
