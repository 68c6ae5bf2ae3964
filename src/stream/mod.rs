//! Realtime update channel.
//!
//! [`TransportFactory`] opens raw event streams (server-sent events by
//! default); [`StreamManager`] shares one subscription per key among the
//! clients interested in it and forwards decoded `features` payloads.
mod event;
mod manager;
mod sse;
mod transport;

pub use event::*;
pub use manager::*;
pub use sse::*;
pub use transport::*;

#[cfg(test)]
mod sse_test;
