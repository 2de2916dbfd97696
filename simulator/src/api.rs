use crate::store::{BadRequest, DeviceStatus, Page, Store};
use crate::telemetry::{self, DeviceActivity, SensorReading, Switch};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<Store>>,
    /// Probability that a device command is rejected.
    pub fail_rate: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    device_name: String,
    active: Switch,
}

#[derive(Debug, Serialize)]
pub struct WarningCount {
    count: usize,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/sensor/latest", get(latest_reading))
        .route("/sensor", get(sensor_log))
        .route("/led/status", get(device_status))
        .route("/led/control", post(control))
        .route("/led", get(device_log))
        .route("/led/warningCount", get(warning_count))
        .with_state(state)
}

async fn latest_reading(State(state): State<AppState>) -> Result<Json<SensorReading>, StatusCode> {
    state
        .store
        .read()
        .await
        .latest()
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn sensor_log(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<SensorReading>>, BadRequest> {
    Ok(Json(state.store.read().await.sensor_log(&params)?))
}

async fn device_status(State(state): State<AppState>) -> Json<DeviceStatus> {
    Json(state.store.read().await.status())
}

async fn control(State(state): State<AppState>, Json(request): Json<ControlRequest>) -> Result<String, Response> {
    let rejected = rand::thread_rng().gen_bool(state.fail_rate);
    if rejected {
        warn!("Injected failure for {} -> {:?}", request.device_name, request.active);
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "Device did not acknowledge the command").into_response());
    }

    let on = request.active == Switch::On;
    state
        .store
        .write()
        .await
        .set_device(&request.device_name, on, telemetry::now())
        .map_err(IntoResponse::into_response)?;

    info!("{} switched {:?}", request.device_name, request.active);
    Ok(format!("Successfully controlled : {}", request.device_name))
}

async fn device_log(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page<DeviceActivity>>, BadRequest> {
    Ok(Json(state.store.read().await.device_log(&params)?))
}

async fn warning_count(State(state): State<AppState>) -> Json<WarningCount> {
    let today = telemetry::now().date();
    Json(WarningCount {
        count: state.store.read().await.warning_count(today),
    })
}

impl IntoResponse for BadRequest {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.0).into_response()
    }
}
