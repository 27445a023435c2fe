use crate::fanout::FanoutHub;
use crate::ingest::IngestService;
use crate::model::{
    DevicePatch, GroupPatch, IngestStatus, LocationPatch, NewDevice, NewGroup, NewLocation,
};
use crate::mqtt::BusCredentials;
use crate::registry::{DeviceRegistry, PgRegistry};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub registry: PgRegistry,
    pub ingest: Arc<IngestService>,
    pub hub: Arc<FanoutHub>,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/locations", get(list_locations).post(create_location))
        .route(
            "/api/locations/:id",
            get(get_location).patch(update_location).delete(delete_location),
        )
        .route("/api/groups", get(list_groups).post(create_group))
        .route(
            "/api/groups/:id",
            get(get_group).patch(update_group).delete(delete_group),
        )
        .route("/api/devices", get(list_devices).post(create_device))
        .route(
            "/api/devices/:id",
            get(get_device).patch(update_device).delete(delete_device),
        )
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread", get(unread_notifications))
        .route("/api/notifications/:id/read", patch(mark_notification_read))
        .route(
            "/api/notifications/:id",
            axum::routing::delete(delete_notification),
        )
        .route("/api/mqtt/configure", post(configure_mqtt))
        .route("/api/mqtt/status", get(mqtt_status))
}

// ==================== LOCATIONS ====================

async fn list_locations(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(Json(state.registry.locations().await?).into_response())
}

async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    match state.registry.location(id).await? {
        Some(location) => Ok(Json(location).into_response()),
        None => Ok(not_found("Location not found")),
    }
}

async fn create_location(
    State(state): State<AppState>,
    Json(new): Json<NewLocation>,
) -> Result<Response, AppError> {
    let location = state.registry.create_location(&new).await?;
    Ok((StatusCode::CREATED, Json(location)).into_response())
}

async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<LocationPatch>,
) -> Result<Response, AppError> {
    match state.registry.update_location(id, &patch).await? {
        Some(location) => Ok(Json(location).into_response()),
        None => Ok(not_found("Location not found")),
    }
}

async fn delete_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    if state.registry.delete_location(id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(not_found("Location not found"))
    }
}

// ==================== GROUPS ====================

async fn list_groups(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(Json(state.registry.groups().await?).into_response())
}

async fn get_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    match state.registry.group(id).await? {
        Some(group) => Ok(Json(group).into_response()),
        None => Ok(not_found("Group not found")),
    }
}

async fn create_group(
    State(state): State<AppState>,
    Json(new): Json<NewGroup>,
) -> Result<Response, AppError> {
    let group = state.registry.create_group(&new).await?;
    Ok((StatusCode::CREATED, Json(group)).into_response())
}

async fn update_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<GroupPatch>,
) -> Result<Response, AppError> {
    match state.registry.update_group(id, &patch).await? {
        Some(group) => Ok(Json(group).into_response()),
        None => Ok(not_found("Group not found")),
    }
}

async fn delete_group(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    if state.registry.delete_group(id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(not_found("Group not found"))
    }
}

// ==================== DEVICES ====================

async fn list_devices(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(Json(state.registry.devices().await?).into_response())
}

async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    match state.registry.device(id).await? {
        Some(device) => Ok(Json(device).into_response()),
        None => Ok(not_found("Device not found")),
    }
}

async fn create_device(
    State(state): State<AppState>,
    Json(new): Json<NewDevice>,
) -> Result<Response, AppError> {
    let device = state.registry.create_device(&new).await?;
    Ok((StatusCode::CREATED, Json(device)).into_response())
}

async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<DevicePatch>,
) -> Result<Response, AppError> {
    match state.registry.update_device(id, &patch).await? {
        Some(device) => Ok(Json(device).into_response()),
        None => Ok(not_found("Device not found")),
    }
}

async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    if state.registry.delete_device(id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(not_found("Device not found"))
    }
}

// ==================== NOTIFICATIONS ====================

async fn list_notifications(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(Json(state.registry.notifications().await?).into_response())
}

async fn unread_notifications(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(Json(state.registry.unread_notifications().await?).into_response())
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    if state.registry.mark_notification_read(id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(not_found("Notification not found"))
    }
}

async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    if state.registry.delete_notification(id).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(not_found("Notification not found"))
    }
}

// ==================== MQTT CONFIGURATION ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigureRequest {
    endpoint: Option<String>,
    cert_path: Option<String>,
    key_path: Option<String>,
    ca_path: Option<String>,
    client_id: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
}

async fn configure_mqtt(
    State(state): State<AppState>,
    Json(request): Json<ConfigureRequest>,
) -> Result<Response, AppError> {
    let (Some(endpoint), Some(cert_path), Some(key_path), Some(ca_path), Some(client_id)) = (
        request.endpoint,
        request.cert_path,
        request.key_path,
        request.ca_path,
        request.client_id,
    ) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing required bus configuration" })),
        )
            .into_response());
    };

    let credentials = BusCredentials {
        endpoint,
        cert_path,
        key_path,
        ca_path,
        client_id,
    };
    let success = state.ingest.configure(credentials, &request.topics).await;

    Ok(Json(json!({ "success": success, "status": state.ingest.status() })).into_response())
}

async fn mqtt_status(State(state): State<AppState>) -> Json<IngestStatus> {
    Json(state.ingest.status())
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
