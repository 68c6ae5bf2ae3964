//! Feature Synchronization Error Hierarchy
//!
//! Defines the error types surfaced by the sync client, grouped by the
//! collaborator that produced them. None of these ever reach a caller of
//! [`crate::Repository::load`]; they are logged at the boundary and turned into
//! stale data or absence there.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote features endpoint failures (transport, status, timeouts)
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Payloads that do not match the wire contract
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Durable key-value storage failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Realtime channel failures
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Request could not be sent or the body could not be read
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status code
    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Single attempt exceeded its deadline
    #[error("Fetch timeout after {0:?}")]
    Timeout(Duration),

    /// Retry policy exhaustion
    #[error("Fetch failed after {attempts} attempts: {last}")]
    RetryExhausted { attempts: usize, last: String },

    /// Background fetch task panicked or was aborted
    #[error("Fetch task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Body is not valid JSON or does not match the payload shape
    #[error("Invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Persisted or wire key could not be parsed
    #[error("Invalid config key: {0}")]
    InvalidKey(String),

    /// Event body is not UTF-8
    #[error("Event body is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(#[from] sled::Error),

    /// Disk I/O failures
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Snapshot could not be serialized
    #[error("Snapshot serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Stored snapshot is unreadable
    #[error("Data corruption detected in {location}: {reason}")]
    DataCorruption { location: String, reason: String },

    /// Snapshot written by an incompatible format version
    #[error("Unsupported snapshot version {found}, expected {expected}")]
    VersionMismatch { found: String, expected: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Connection to the realtime endpoint could not be established
    #[error("Stream connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Realtime endpoint answered with a non-success status code
    #[error("Stream endpoint {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Connection establishment exceeded its deadline
    #[error("Stream connect timeout after {0:?}")]
    Timeout(Duration),

    /// Reconnection policy exhaustion
    #[error("Stream reconnect gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: usize },
}

impl Error {
    /// Whether repeating the operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Fetch(e) => e.is_transient(),
            Error::Stream(_) => true,
            _ => false,
        }
    }
}

impl FetchError {
    /// Transport failures, timeouts, 408, 429 and 5xx are transient; other
    /// statuses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request { .. } | FetchError::Timeout(_) => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            FetchError::RetryExhausted { .. } | FetchError::TaskFailed(_) => false,
        }
    }
}
