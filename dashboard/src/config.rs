use crate::errors::{Error, Result};
use crate::poller::PollerConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Which dashboard view the process backs. Each has its own cadence and chart length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ViewProfile {
    /// All four readings, 5 s cadence, 5-point chart.
    Overview,
    /// Wind and warning light, 1 s cadence, 10-point chart.
    Wind,
}

impl ViewProfile {
    pub fn interval(&self) -> Duration {
        match self {
            ViewProfile::Overview => Duration::from_millis(5000),
            ViewProfile::Wind => Duration::from_millis(1000),
        }
    }

    pub fn window_capacity(&self) -> usize {
        match self {
            ViewProfile::Overview => 5,
            ViewProfile::Wind => 10,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "dashboard", about = "Environmental sensor dashboard backend")]
pub struct Config {
    /// Base URL of the sensor/actuator service.
    #[arg(long, env = "API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Address the view server listens on.
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:3000")]
    pub http_addr: String,

    #[arg(long, env = "VIEW", value_enum, default_value_t = ViewProfile::Overview)]
    pub view: ViewProfile,

    /// Overrides the view's poll interval.
    #[arg(long, env = "POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Overrides the view's chart length.
    #[arg(long, env = "WINDOW_CAPACITY")]
    pub window_capacity: Option<usize>,

    #[arg(long, env = "WIND_WARNING_THRESHOLD", default_value_t = 70.0)]
    pub wind_warning_threshold: f64,

    #[arg(long, env = "DEBOUNCE_MS", default_value_t = 500)]
    pub debounce_ms: u64,

    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 3000)]
    pub request_timeout_ms: u64,

    /// Directory for the wind-history cache. Unset disables it.
    #[arg(long, env = "CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(Error::Validation(format!(
                "API URL {} must start with http:// or https://",
                self.api_url
            )));
        }
        if self.poll_interval_ms == Some(0) {
            return Err(Error::Validation("Poll interval must be positive".to_string()));
        }
        if self.window_capacity == Some(0) {
            return Err(Error::Validation("Window capacity must be at least 1".to_string()));
        }
        if self.debounce_ms == 0 {
            return Err(Error::Validation("Debounce must be positive".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Validation("Request timeout must be positive".to_string()));
        }
        Ok(())
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.view.interval()),
            window_capacity: self.window_capacity.unwrap_or_else(|| self.view.window_capacity()),
            poll_devices: true,
            wind_warning_threshold: self.wind_warning_threshold,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
