//! Feature-flag synchronization client.
//!
//! Keeps remote features documents in a local TTL cache mirrored to durable
//! storage, collapses concurrent fetches of the same source, optionally keeps
//! a server-sent-events stream open per source and notifies registered
//! consumers whenever a document changes.
//!
//! ```ignore
//! let repository = Repository::builder(Settings::new()?).build()?;
//! let client = repository.new_client();
//! let key = ConfigKey::new("https://cdn.example.com", "sdk-abc123");
//! let features = repository
//!     .load(client, &key, LoadOptions::new().streaming(true).on_update(|p| println!("{p:?}")))
//!     .await;
//! ```
mod cache;
mod config;
pub(crate) mod constants;
mod errors;
mod fetch;
pub mod metrics;
mod model;
mod registry;
mod repository;
mod storage;
mod stream;
pub(crate) mod utils;

pub use cache::*;
pub use config::*;
pub use constants::FEATURES_EVENT;
pub use errors::*;
pub use fetch::*;
pub use model::*;
pub use registry::*;
pub use repository::*;
pub use storage::*;
pub use stream::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
