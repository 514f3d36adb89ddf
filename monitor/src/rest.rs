use crate::alerts::{self, AlertSummary, FleetStats, DEFAULT_LOW_BATTERY_THRESHOLD};
use crate::broadcast::run_feed;
use crate::errors::Error;
use crate::model::{Device, DeviceUpdate, ListParams, NewDevice};
use crate::registry::ConnectionRegistry;
use crate::store::DeviceStore;
use crate::validate::{validate_new, validate_update};
use axum::{
    extract::{rejection::JsonRejection, ws::WebSocketUpgrade, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DeviceStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub feed_interval: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn DeviceStore>, feed_interval: Duration) -> Self {
        Self {
            store,
            registry: Arc::new(ConnectionRegistry::new()),
            feed_interval,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ThresholdQuery {
    threshold: Option<f64>,
}

impl ThresholdQuery {
    fn threshold(&self) -> f64 {
        self.threshold.unwrap_or(DEFAULT_LOW_BATTERY_THRESHOLD)
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/devices", get(list_devices).post(create_device))
        .route(
            "/devices/:id",
            get(get_device).put(update_device).delete(delete_device),
        )
        .route("/alerts/low-battery", get(low_battery_alerts))
        .route("/alerts/offline", get(offline_alerts))
        .route("/alerts/critical", get(critical_alerts))
        .route("/alerts/summary", get(alert_summary))
        .route("/stats", get(fleet_stats))
        .route("/ws", get(feed))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Fleet Monitoring API",
        "status": "running",
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "subscribers": state.registry.len(),
    }))
}

async fn list_devices(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Device>>, AppError> {
    Ok(Json(state.store.list(params).await?))
}

async fn create_device(
    State(state): State<AppState>,
    payload: Result<Json<NewDevice>, JsonRejection>,
) -> Result<Json<Device>, AppError> {
    let new = json_body(payload)?;
    validate_new(&new)?;
    let device = state.store.create(new).await?;
    info!("Created device {} ({})", device.id, device.name);
    Ok(Json(device))
}

async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Device>, AppError> {
    Ok(Json(state.store.get(id).await?))
}

async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<DeviceUpdate>, JsonRejection>,
) -> Result<Json<Device>, AppError> {
    let update = json_body(payload)?;
    validate_update(&update)?;
    Ok(Json(state.store.update(id, update).await?))
}

async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let device = state.store.delete(id).await?;
    info!("Deleted device {} ({})", device.id, device.name);
    Ok(Json(json!({ "message": "Device deleted successfully" })))
}

async fn low_battery_alerts(
    State(state): State<AppState>,
    Query(query): Query<ThresholdQuery>,
) -> Result<Json<Vec<Device>>, AppError> {
    let devices = state.store.list_all().await?;
    Ok(Json(alerts::low_battery(devices, query.threshold())))
}

async fn offline_alerts(State(state): State<AppState>) -> Result<Json<Vec<Device>>, AppError> {
    let devices = state.store.list_all().await?;
    Ok(Json(alerts::offline(devices)))
}

async fn critical_alerts(State(state): State<AppState>) -> Result<Json<Vec<Device>>, AppError> {
    let devices = state.store.list_all().await?;
    Ok(Json(alerts::critical(devices)))
}

async fn alert_summary(
    State(state): State<AppState>,
    Query(query): Query<ThresholdQuery>,
) -> Result<Json<AlertSummary>, AppError> {
    let devices = state.store.list_all().await?;
    Ok(Json(alerts::summary(&devices, query.threshold())))
}

async fn fleet_stats(State(state): State<AppState>) -> Result<Json<FleetStats>, AppError> {
    let devices = state.store.list_all().await?;
    Ok(Json(FleetStats::from_devices(&devices)))
}

async fn feed(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        run_feed(socket, state.store, state.registry, state.feed_interval).await;
    })
}

// Malformed bodies get the same `{"detail": ..}` shape as validation errors.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError(Error::Validation(rejection.body_text())))
}

pub struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "Device not found".to_string()),
            Error::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            other => {
                error!("API error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
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
