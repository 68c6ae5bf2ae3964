use std::time::Duration;

use flagsync::metrics;
use flagsync::ConfigKey;
use flagsync::Error;
use flagsync::LoadOptions;
use flagsync::Repository;
use flagsync::Result;
use flagsync::Settings;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = Settings::new()?.validate()?;

    // Initializing Logs
    init_observability();

    let key = ConfigKey::try_new(&settings.client.api_host, &settings.client.client_key).map_err(|e| {
        Error::Fatal(format!("client.api_host and client.client_key must be configured: {}", e))
    })?;

    // Initializing Shutdown Signal
    let (graceful_tx, mut graceful_rx) = watch::channel(());

    if settings.monitoring.prometheus_enabled {
        let port = settings.monitoring.prometheus_port;
        let shutdown = graceful_rx.clone();
        tokio::spawn(async move {
            metrics::start_server(port, shutdown).await;
        });
    }

    let mut options = LoadOptions::new()
        .streaming(settings.client.streaming)
        .on_update(|payload| {
            info!(features = payload.features().len(), "features updated");
        });
    if let Some(ttl_ms) = settings.client.ttl_override_ms {
        options = options.ttl_override(Duration::from_millis(ttl_ms));
    }

    let repository = Repository::builder(settings).build()?;
    let client = repository.new_client();

    match repository.load(client, &key, options).await {
        Some(payload) => info!(%key, features = payload.features().len(), "features loaded"),
        None => warn!(%key, "features could not be loaded; waiting for updates"),
    }

    info!("Application started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    let _ = graceful_rx.changed().await;
    repository.off_update(client);
    repository.shutdown();

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(e.to_string()))?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(e.to_string()))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability() {
    let base_subscriber = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();
}
