//! Prometheus collectors for the sync client.
//!
//! Collectors are process-wide and registered into [`REGISTRY`] on first use
//! of [`gather_metrics`] or [`register_custom_metrics`].

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;


lazy_static! {
    /// Cache lookups by resulting state (cold / fresh / stale)
    pub static ref CACHE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("flagsync_cache_lookups", "cache lookups by state"),
        &["state"]
    )
    .expect("metric can not be created");

    /// Settled network fetches by outcome (ok / error)
    pub static ref FETCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("flagsync_fetches", "settled feature fetches by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    /// Callers that joined an already in-flight fetch
    pub static ref FETCHES_COALESCED: IntCounter = IntCounter::new(
        "flagsync_fetches_coalesced",
        "callers served by an already in-flight fetch"
    )
    .expect("metric can not be created");

    /// Stream events received by event type
    pub static ref STREAM_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("flagsync_stream_events", "stream events by type"),
        &["event_type"]
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_STREAMS: IntGauge = IntGauge::new(
        "flagsync_active_streams",
        "open stream subscriptions"
    )
    .expect("metric can not be created");

    /// Durable mirror writes or reads that failed
    pub static ref PERSISTENCE_FAILURES: IntCounter = IntCounter::new(
        "flagsync_persistence_failures",
        "durable storage failures"
    )
    .expect("metric can not be created");

    /// Update callbacks that panicked
    pub static ref CALLBACK_FAILURES: IntCounter = IntCounter::new(
        "flagsync_callback_failures",
        "update callbacks that panicked"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(CACHE_LOOKUPS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(FETCHES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(FETCHES_COALESCED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(STREAM_EVENTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ACTIVE_STREAMS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(PERSISTENCE_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(CALLBACK_FAILURES.clone()))
        .expect("collector can be registered");
}

/// Renders every collector in the Prometheus text format
pub fn gather_metrics() -> String {
    REGISTER.call_once(|| register_custom_metrics(&REGISTRY));

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}

/// Serves [`gather_metrics`] on `GET /metrics` until `shutdown_signal` fires
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let metrics_route = warp::path!("metrics").and(warp::get()).map(gather_metrics);

    let (addr, server) = warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
        let _ = shutdown_signal.changed().await;
    });
    info!(%addr, "metrics server listening");
    server.await;
}
