mod key;
mod payload;

pub use key::*;
pub use payload::*;

#[cfg(test)]
mod payload_test;

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Opaque handle for one consumer of the repository.
///
/// Issued by [`crate::Repository::new_client`]; used to bind and later
/// release update callbacks and stream interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Monotonic source of [`ClientId`]s
#[derive(Debug, Default)]
pub(crate) struct ClientIdGenerator {
    next: AtomicU64,
}

impl ClientIdGenerator {
    pub(crate) fn next_id(&self) -> ClientId {
        ClientId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
