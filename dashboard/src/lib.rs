//! Telemetry synchronization and device-control layer of the environment dashboard.

pub mod cache;
pub mod client;
pub mod config;
pub mod devices;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod poller;
pub mod query;
pub mod rest;
pub mod table;
pub mod validate;
pub mod window;

pub use client::{HttpApi, RemoteApi};
pub use devices::{CommandOutcome, DeviceStore, Dispatcher, Notice};
pub use errors::{Error, Result};
pub use poller::{Poller, PollerConfig, TelemetryState};
pub use table::{DeviceLog, SensorLog, TableController, TableInput, TableView};
pub use window::TimeSeriesWindow;
