use async_trait::async_trait;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;

use super::StreamEvent;
use crate::ConfigKey;
use crate::Result;

/// Events of one realtime connection. Dropping the stream closes it.
///
/// An `Err` item is terminal: the transport gave up and the stream ends.
pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

/// Opens realtime connections for a key.
///
/// Reconnecting after an interruption is the transport's business; the
/// returned stream only ends when the transport gives up or is dropped.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    async fn connect(
        &self,
        key: &ConfigKey,
    ) -> Result<EventStream>;
}
