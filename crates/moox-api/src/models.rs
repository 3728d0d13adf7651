// MOOX API response types
//
// Models for the server's plain-JSON endpoints. Fields use
// `#[serde(default)]` liberally because the server omits fields that are
// unset, and every object carries an open-ended `attributes` map of
// server-defined keys that is passed through opaquely. Undocumented
// top-level fields land in `extra`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tracker status as reported by `GET /api/devices`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Tracker device from `GET /api/devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub status: DeviceStatus,
    /// Geofences the device is currently inside. Entries are kept raw --
    /// some server versions mix integers and strings in this list.
    #[serde(default, rename = "geofenceIds")]
    pub geofence_ids: Option<Vec<Value>>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Latest GPS fix from `GET /api/positions`. One per device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "deviceId")]
    pub device_id: i64,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
    /// Reported error radius in meters. 0 when the server has no estimate.
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub course: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default, rename = "geofenceIds")]
    pub geofence_ids: Option<Vec<Value>>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Named area from `GET /api/geofences`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geofence {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    /// WKT area definition (circle or polygon).
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Event from `GET /api/reports/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, rename = "deviceId")]
    pub device_id: Option<i64>,
    #[serde(default, rename = "type")]
    pub event_type: String,
    #[serde(default, rename = "eventTime")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Server information from `GET /api/server`.
///
/// Fetched only to validate credentials -- none of it is merged into
/// tracking data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
