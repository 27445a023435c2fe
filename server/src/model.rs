use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operational state of a turret. Stored as text; serialized kebab-case
/// (`pre-soaking`) to match the client protocol.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum DeviceStatus {
    Online,
    #[default]
    Offline,
    Warning,
    Emergency,
    PreSoaking,
    Maintenance,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Warning => "warning",
            DeviceStatus::Emergency => "emergency",
            DeviceStatus::PreSoaking => "pre-soaking",
            DeviceStatus::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum FireStatus {
    #[default]
    Safe,
    Warning,
    Fire,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum OperatingMode {
    #[default]
    Automatic,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum NotificationKind {
    Emergency,
    Warning,
    Info,
}

/// A fire-suppression turret and its latest telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: Uuid,
    pub name: String,
    pub serial_number: String,
    pub group_id: Uuid,
    pub location_id: Uuid,
    pub status: DeviceStatus,
    pub mode: OperatingMode,
    pub fire_status: FireStatus,
    pub battery_level: f64,
    pub pressure_level: f64,
    pub co2_level: f64,
    pub particulate_matter: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub height: f64,
    pub last_maintenance: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub aws_thing_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub location_id: Uuid,
}

/// An alert raised from telemetry, or by user-facing flows. Immutable except
/// for the `read` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub device_id: Option<Uuid>,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLocation {
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPatch {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    pub name: String,
    pub location_id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPatch {
    pub name: Option<String>,
    pub location_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub name: String,
    pub serial_number: String,
    pub group_id: Uuid,
    pub location_id: Uuid,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default)]
    pub mode: OperatingMode,
    #[serde(default)]
    pub fire_status: FireStatus,
    #[serde(default)]
    pub battery_level: f64,
    #[serde(default)]
    pub pressure_level: f64,
    #[serde(default)]
    pub co2_level: f64,
    #[serde(default)]
    pub particulate_matter: f64,
    #[serde(default)]
    pub wind_speed: f64,
    #[serde(default)]
    pub wind_direction: f64,
    #[serde(default)]
    pub height: f64,
    pub last_maintenance: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub aws_thing_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub device_id: Option<Uuid>,
    #[serde(default)]
    pub read: bool,
}

/// Field-level update set for a device. An absent field means "no change",
/// never "set to zero", so applying the same patch twice is idempotent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePatch {
    pub name: Option<String>,
    pub serial_number: Option<String>,
    pub group_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub status: Option<DeviceStatus>,
    pub mode: Option<OperatingMode>,
    pub fire_status: Option<FireStatus>,
    pub battery_level: Option<f64>,
    pub pressure_level: Option<f64>,
    pub co2_level: Option<f64>,
    pub particulate_matter: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub height: Option<f64>,
    pub last_maintenance: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub aws_thing_name: Option<String>,
}

impl DevicePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.serial_number.is_none()
            && self.group_id.is_none()
            && self.location_id.is_none()
            && self.status.is_none()
            && self.mode.is_none()
            && self.fire_status.is_none()
            && self.battery_level.is_none()
            && self.pressure_level.is_none()
            && self.co2_level.is_none()
            && self.particulate_matter.is_none()
            && self.wind_speed.is_none()
            && self.wind_direction.is_none()
            && self.height.is_none()
            && self.last_maintenance.is_none()
            && self.x.is_none()
            && self.y.is_none()
            && self.aws_thing_name.is_none()
    }
}

/// Decoded payload of one bus message. Every field is optional; devices
/// report only what changed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestMessage {
    pub thing_name: Option<String>,
    pub status: Option<DeviceStatus>,
    pub fire_status: Option<FireStatus>,
    pub battery_level: Option<f64>,
    pub pressure_level: Option<f64>,
    pub co2_level: Option<f64>,
    pub particulate_matter: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
}

/// Server-to-client frames on the push channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    DeviceUpdate { device: Device },
    MqttStatus { connected: bool },
    Pong,
}

/// Client-to-server frames on the push channel.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsRequest {
    Ping,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStatus {
    pub connected: bool,
    pub subscriber_count: usize,
}
