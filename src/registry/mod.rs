//! Client update callbacks.
//!
//! Each client binds at most one callback to one key. Fan-out snapshots the
//! matching callbacks first and invokes them with no map shard held, so a
//! callback may itself register or unregister clients.
#[cfg(test)]
mod registry_test;

use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::metrics::CALLBACK_FAILURES;
use crate::ClientId;
use crate::ConfigKey;
use crate::Payload;

/// Invoked with the new payload whenever the bound key is updated
pub type UpdateCallback = Arc<dyn Fn(Arc<Payload>) + Send + Sync>;

struct Registration {
    key: ConfigKey,
    callback: UpdateCallback,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    registrations: DashMap<ClientId, Registration>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `callback` for `client`, replacing any earlier binding. Returns
    /// the key previously bound, if any.
    pub fn register(
        &self,
        client: ClientId,
        key: &ConfigKey,
        callback: UpdateCallback,
    ) -> Option<ConfigKey> {
        let previous = self.registrations.insert(
            client,
            Registration {
                key: key.clone(),
                callback,
            },
        );
        debug!(%client, %key, "update callback registered");
        previous.map(|r| r.key)
    }

    /// Removes `client`'s binding. Returns the key it was bound to.
    pub fn unregister(
        &self,
        client: ClientId,
    ) -> Option<ConfigKey> {
        let removed = self.registrations.remove(&client).map(|(_, r)| r.key);
        if let Some(key) = &removed {
            debug!(%client, %key, "update callback removed");
        }
        removed
    }

    pub fn bound_key(
        &self,
        client: ClientId,
    ) -> Option<ConfigKey> {
        self.registrations.get(&client).map(|r| r.value().key.clone())
    }

    /// Calls every callback bound to `key` with `payload`. A panicking
    /// callback is logged and skipped. Returns how many callbacks completed.
    pub fn notify_all(
        &self,
        key: &ConfigKey,
        payload: &Arc<Payload>,
    ) -> usize {
        let targets: Vec<(ClientId, UpdateCallback)> = self
            .registrations
            .iter()
            .filter(|r| &r.value().key == key)
            .map(|r| (*r.key(), r.value().callback.clone()))
            .collect();

        let mut delivered = 0;
        for (client, callback) in targets {
            let payload = payload.clone();
            match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    CALLBACK_FAILURES.inc();
                    error!(%client, %key, "update callback panicked");
                }
            }
        }
        trace!(%key, delivered, "update fan-out done");
        delivered
    }

    pub fn count_for(
        &self,
        key: &ConfigKey,
    ) -> usize {
        self.registrations.iter().filter(|r| &r.value().key == key).count()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
