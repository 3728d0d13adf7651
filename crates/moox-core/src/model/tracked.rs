// ── Merged per-device state ──

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use moox_api::{Device, Geofence, Position};

use super::alerts;

/// The complete tracking state, keyed by device id.
///
/// Replaced wholesale on every successful poll (or held unchanged on
/// degraded polls); consumers never observe a partially-merged state.
/// Every device from the latest device list appears exactly once, with
/// a position only when one passed the accuracy filter.
pub type Snapshot = HashMap<i64, TrackedDevice>;

/// One device's merged view: the device record, its current position
/// (if any fix passed the accuracy filter), the first matching
/// geofence, and the configured custom attributes.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedDevice {
    pub device: Device,
    pub geofence: Option<Geofence>,
    pub position: Option<Position>,
    pub attributes: Map<String, Value>,
}

impl TrackedDevice {
    /// Name of the matched geofence, if any.
    pub fn geofence_name(&self) -> Option<&str> {
        self.geofence.as_ref().map(|g| g.name.as_str())
    }

    /// Active alarms decoded from the position's attribute map.
    pub fn alarms(&self) -> Vec<String> {
        self.position
            .as_ref()
            .map_or_else(Vec::new, |p| alerts::detect_alarms(&p.attributes))
    }

    /// Warning conditions decoded from the position's attribute map.
    pub fn warnings(&self) -> Vec<String> {
        self.position
            .as_ref()
            .map_or_else(Vec::new, |p| alerts::detect_warnings(&p.attributes))
    }
}
