//! Network fetches of the features document.
//!
//! [`FeatureFetcher`] performs one logical request (with its own retries);
//! [`FetchCoordinator`] makes sure at most one such request runs per key.
mod coordinator;
mod fetcher;

pub use coordinator::*;
pub use fetcher::*;

#[cfg(test)]
mod coordinator_test;
