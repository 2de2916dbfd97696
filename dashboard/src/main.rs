use anyhow::Context;
use axum::{routing::get, Router};
use clap::Parser;
use dashboard::cache::WindCache;
use dashboard::config::Config;
use dashboard::rest::{self, AppState};
use dashboard::{metrics, DeviceStore, Dispatcher, HttpApi, Poller, RemoteApi, TableController};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    config.validate().context("Invalid configuration")?;

    info!("Starting environment dashboard");
    info!("Remote service: {}", config.api_url);
    info!("View: {:?}, HTTP server: {}", config.view, config.http_addr);

    metrics::init_metrics().context("Failed to register metrics")?;

    let api: Arc<dyn RemoteApi> = Arc::new(
        HttpApi::new(config.api_url.clone(), config.request_timeout()).context("Failed to build HTTP client")?,
    );
    let devices = DeviceStore::new();
    let dispatcher = Dispatcher::new(Arc::clone(&api), devices.clone());

    let mut poller = Poller::new(Arc::clone(&api), config.poller(), devices);
    if let Some(dir) = &config.cache_dir {
        poller = poller.with_cache(WindCache::in_dir(dir));
        if let Err(e) = poller.restore().await {
            warn!("Ignoring unreadable wind cache: {}", e);
        }
    }
    poller.start();

    // Surface rolled-back commands to whoever is watching the logs.
    let mut notices = dispatcher.subscribe_notices();
    let notice_handle = tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => warn!("NOTICE: {}", notice.message),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} notices", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let state = AppState {
        api: Arc::clone(&api),
        telemetry: poller.subscribe(),
        dispatcher,
        sensor_log: Arc::new(TableController::spawn(Arc::clone(&api), config.debounce())),
        device_log: Arc::new(TableController::spawn(Arc::clone(&api), config.debounce())),
    };

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(state));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = notice_handle => {
            error!("Notice task terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    poller.stop();
    info!("Shutting down");
    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
