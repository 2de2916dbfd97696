use crate::client::RemoteApi;
use crate::devices::{DeviceBoard, Dispatcher};
use crate::errors::Error;
use crate::model::{ControlIntent, DeviceId, DeviceLogEntry, SensorLogEntry};
use crate::poller::TelemetryState;
use crate::table::{DeviceLog, SensorLog, TableController, TableInput, TableView};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn RemoteApi>,
    pub telemetry: watch::Receiver<TelemetryState>,
    pub dispatcher: Dispatcher,
    pub sensor_log: Arc<TableController<SensorLog>>,
    pub device_log: Arc<TableController<DeviceLog>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SwitchRequest {
    /// Absent means toggle.
    on: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct WarningCountResponse {
    count: u64,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/telemetry", get(get_telemetry))
        .route("/api/v1/devices", get(get_devices))
        .route("/api/v1/devices/:device", post(switch_device))
        .route(
            "/api/v1/sensor-log",
            get(get_sensor_log).post(post_sensor_log),
        )
        .route(
            "/api/v1/device-log",
            get(get_device_log).post(post_device_log),
        )
        .route("/api/v1/warnings/today", get(get_warning_count))
        .with_state(state)
}

async fn get_telemetry(State(state): State<AppState>) -> Json<TelemetryState> {
    Json(state.telemetry.borrow().clone())
}

async fn get_devices(State(state): State<AppState>) -> Json<DeviceBoard> {
    Json(state.dispatcher.devices().current())
}

async fn switch_device(
    State(state): State<AppState>,
    Path(device): Path<String>,
    body: Option<Json<SwitchRequest>>,
) -> Result<(StatusCode, Json<ControlIntent>), AppError> {
    let device: DeviceId = device.parse()?;
    let request = body.map(|Json(request)| request).unwrap_or_default();

    // Resolution happens in the background; clients watch /api/v1/devices.
    let (intent, _resolution) = match request.on {
        Some(on) => state.dispatcher.set(device, on)?,
        None => state.dispatcher.toggle(device)?,
    };

    Ok((StatusCode::ACCEPTED, Json(intent)))
}

async fn get_sensor_log(State(state): State<AppState>) -> Json<TableView<SensorLogEntry>> {
    Json(state.sensor_log.view())
}

async fn post_sensor_log(
    State(state): State<AppState>,
    Json(input): Json<TableInput>,
) -> Result<StatusCode, AppError> {
    state.sensor_log.send(input).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn get_device_log(State(state): State<AppState>) -> Json<TableView<DeviceLogEntry>> {
    Json(state.device_log.view())
}

async fn post_device_log(
    State(state): State<AppState>,
    Json(input): Json<TableInput>,
) -> Result<StatusCode, AppError> {
    state.device_log.send(input).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn get_warning_count(State(state): State<AppState>) -> Result<Json<WarningCountResponse>, AppError> {
    let count = state.api.warning_count().await?;
    Ok(Json(WarningCountResponse { count }))
}

struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Busy(_) => StatusCode::CONFLICT,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::ChannelSend => StatusCode::SERVICE_UNAVAILABLE,
            e if e.is_upstream() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("API error: {}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
