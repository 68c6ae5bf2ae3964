//! Payload cache with time-based staleness and a durable mirror.
//!
//! Staleness is advisory: a stale entry stays readable until it is replaced,
//! and callers decide whether to revalidate it.
mod cache_store;
mod snapshot;

pub use cache_store::*;


use std::sync::Arc;
use std::time::Duration;

use crate::utils::time::millis_after;
use crate::utils::time::now_millis;
use crate::Payload;

/// One cached payload. Replaced on every update, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    payload: Arc<Payload>,
    stale_at: u64,
}

impl CacheEntry {
    /// Entry that turns stale `ttl` from now
    pub fn new(
        payload: Arc<Payload>,
        ttl: Duration,
    ) -> Self {
        Self::with_stale_at(payload, millis_after(ttl))
    }

    pub(crate) fn with_stale_at(
        payload: Arc<Payload>,
        stale_at: u64,
    ) -> Self {
        Self { payload, stale_at }
    }

    pub fn payload(&self) -> &Arc<Payload> {
        &self.payload
    }

    /// Epoch millisecond at which the entry turns stale
    pub fn stale_at_millis(&self) -> u64 {
        self.stale_at
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(now_millis())
    }

    pub fn is_stale_at(
        &self,
        now_millis: u64,
    ) -> bool {
        now_millis >= self.stale_at
    }
}

/// Lifecycle of one key in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No entry
    Cold,
    /// Entry present and within its TTL
    WarmFresh,
    /// Entry present and past its TTL; still served
    WarmStale,
}

impl CacheState {
    pub fn of(entry: Option<&CacheEntry>) -> Self {
        match entry {
            None => CacheState::Cold,
            Some(e) if e.is_stale() => CacheState::WarmStale,
            Some(_) => CacheState::WarmFresh,
        }
    }

    pub(crate) fn as_label(&self) -> &'static str {
        match self {
            CacheState::Cold => "cold",
            CacheState::WarmFresh => "fresh",
            CacheState::WarmStale => "stale",
        }
    }
}
