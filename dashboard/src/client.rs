//! Client for the sensor/actuator HTTP service.
//!
//! The synchronization layer only sees [`RemoteApi`]; [`HttpApi`] is the
//! production implementation over [`reqwest`].

use crate::errors::{Error, Result};
use crate::metrics::REQUEST_LATENCY_SECONDS;
use crate::model::{
    ControlCommand, DeviceLogEntry, DeviceStatusReport, LatestReading, PageResponse, PageResult,
    SensorLogEntry, WarningCount,
};
use crate::query::PageQuery;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::debug;

/// Operations the dashboard consumes from the remote service.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// `GET /sensor/latest`
    async fn latest_reading(&self) -> Result<LatestReading>;

    /// `GET /led/status`
    async fn device_status(&self) -> Result<DeviceStatusReport>;

    /// `POST /led/control`, returning the service's acknowledgement text.
    async fn control(&self, command: &ControlCommand) -> Result<String>;

    /// `GET /sensor`
    async fn sensor_log(&self, query: &PageQuery) -> Result<PageResult<SensorLogEntry>>;

    /// `GET /led`
    async fn device_log(&self, query: &PageQuery) -> Result<PageResult<DeviceLogEntry>>;

    /// `GET /led/warningCount`
    async fn warning_count(&self) -> Result<u64>;
}

pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    /// Every request is bounded by `timeout` so no call can hang forever.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(String, String)]) -> Result<T> {
        let start = Instant::now();
        let response = self.client.get(self.url(path)).query(params).send().await?;
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        let elapsed = start.elapsed().as_secs_f64();
        REQUEST_LATENCY_SECONDS.observe(elapsed);
        debug!("GET {} answered in {:.3}s", path, elapsed);

        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn latest_reading(&self) -> Result<LatestReading> {
        self.get_json("/sensor/latest", &[]).await
    }

    async fn device_status(&self) -> Result<DeviceStatusReport> {
        self.get_json("/led/status", &[]).await
    }

    async fn control(&self, command: &ControlCommand) -> Result<String> {
        let start = Instant::now();
        let response = self
            .client
            .post(self.url("/led/control"))
            .json(command)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let ack = response.text().await?;
        REQUEST_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());

        Ok(ack)
    }

    async fn sensor_log(&self, query: &PageQuery) -> Result<PageResult<SensorLogEntry>> {
        let response: PageResponse<SensorLogEntry> = self.get_json("/sensor", &query.to_params()).await?;
        Ok(PageResult::from_response(response, query.page(), query.page_size))
    }

    async fn device_log(&self, query: &PageQuery) -> Result<PageResult<DeviceLogEntry>> {
        let response: PageResponse<DeviceLogEntry> = self.get_json("/led", &query.to_params()).await?;
        Ok(PageResult::from_response(response, query.page(), query.page_size))
    }

    async fn warning_count(&self) -> Result<u64> {
        let count: WarningCount = self.get_json("/led/warningCount", &[]).await?;
        Ok(count.count)
    }
}
