mod api;
mod store;
mod telemetry;

use anyhow::Context;
use api::AppState;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use store::{Store, WARNING_LIGHT};
use telemetry::Switch;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "simulator", about = "Stand-in sensor/actuator service")]
struct Config {
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8080")]
    http_addr: String,

    /// How often a new reading is generated.
    #[arg(long, env = "RATE_MS", default_value_t = 1000)]
    rate_ms: u64,

    /// Probability in [0, 1] that a device command is rejected.
    #[arg(long, env = "FAIL_RATE", default_value_t = 0.0)]
    fail_rate: f64,

    /// Rows kept in memory per log (sensor readings and device activity).
    #[arg(long, env = "HISTORY_LIMIT", default_value_t = 10_000)]
    history_limit: usize,

    /// Wind speed above which the warning light switches on by itself.
    #[arg(long, env = "WIND_WARNING_THRESHOLD", default_value_t = 70.0)]
    wind_warning_threshold: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if !(0.0..=1.0).contains(&config.fail_rate) {
        anyhow::bail!("FAIL_RATE must be within [0, 1], got {}", config.fail_rate);
    }
    if config.rate_ms == 0 {
        anyhow::bail!("RATE_MS must be positive");
    }

    info!("Starting sensor simulator");
    info!(
        "Rate: every {} ms, command failure rate: {}, listening on {}",
        config.rate_ms, config.fail_rate, config.http_addr
    );

    let store = Arc::new(RwLock::new(Store::new(config.history_limit)));

    let generator = tokio::spawn(generate_readings(
        Arc::clone(&store),
        Duration::from_millis(config.rate_ms),
        config.wind_warning_threshold,
    ));

    let app = api::create_router(AppState {
        store,
        fail_rate: config.fail_rate,
    });

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
        _ = generator => {
            error!("Reading generator terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}

async fn generate_readings(store: Arc<RwLock<Store>>, every: Duration, wind_warning_threshold: f64) {
    let mut ticker = tokio::time::interval(every);
    let mut counter = 0u64;

    loop {
        ticker.tick().await;

        let mut guard = store.write().await;
        let id = guard.next_reading_id();
        let reading = telemetry::generate_reading(&mut rand::thread_rng(), id, telemetry::now());

        // The node drives its own warning light from the wind sensor.
        let high_wind = reading.wind.is_some_and(|wind| wind > wind_warning_threshold);
        if guard.status().warning != Switch::from(high_wind) {
            if let Err(e) = guard.set_device(WARNING_LIGHT, high_wind, reading.timestamp) {
                error!("Failed to switch warning light: {}", e.0);
            }
        }

        debug!("Reading #{}: {:?}", id, reading);
        guard.record_reading(reading);
        counter += 1;

        // Log progress periodically
        if counter % 100 == 0 {
            info!("Generated {} readings", counter);
        }
    }
}
