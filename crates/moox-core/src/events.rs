// ── Event notifications ──
//
// Remote events are transient: fetched for a time window, translated,
// broadcast, and not retained. Known event types get stable names from
// the translation table; anything else is derived from the raw
// identifier's casing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Notification emitted for one imported remote event.
#[derive(Debug, Clone, Serialize)]
pub struct EventNotification {
    pub device_id: i64,
    /// Resolved from the snapshot at import time, if the device is known.
    pub device_name: Option<String>,
    /// Human-readable event name (translated or derived).
    pub event_name: String,
    /// The server's raw event type identifier.
    pub raw_type: String,
    pub server_time: Option<DateTime<Utc>>,
    pub attributes: Map<String, Value>,
}

/// Server event types with fixed display names.
const EVENT_NAMES: &[(&str, &str)] = &[
    ("deviceMoving", "device_moving"),
    ("commandResult", "command_result"),
    ("deviceFuelDrop", "device_fuel_drop"),
    ("deviceFuelIncrease", "device_fuel_increase"),
    ("geofenceEnter", "geofence_enter"),
    ("deviceOffline", "device_offline"),
    ("deviceInactive", "device_inactive"),
    ("driverChanged", "driver_changed"),
    ("geofenceExit", "geofence_exit"),
    ("deviceOverspeed", "device_overspeed"),
    ("deviceOnline", "device_online"),
    ("deviceStopped", "device_stopped"),
    ("maintenance", "maintenance"),
    ("alarm", "alarm"),
    ("textMessage", "text_message"),
    ("deviceUnknown", "device_unknown"),
    ("ignitionOff", "ignition_off"),
    ("ignitionOn", "ignition_on"),
    ("queuedCommandSent", "queued_command_sent"),
    ("media", "media"),
];

/// Display name for a raw event type: translation table first,
/// camelCase-to-snake_case otherwise.
pub fn event_display_name(raw: &str) -> String {
    EVENT_NAMES
        .iter()
        .find(|(key, _)| *key == raw)
        .map_or_else(|| to_snake_case(raw), |(_, name)| (*name).to_owned())
}

/// Convert camelCase to snake_case.
pub(crate) fn to_snake_case(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for (i, ch) in camel.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_use_the_table() {
        assert_eq!(event_display_name("geofenceEnter"), "geofence_enter");
        assert_eq!(event_display_name("alarm"), "alarm");
    }

    #[test]
    fn unknown_types_fall_back_to_snake_case() {
        assert_eq!(event_display_name("batteryLowDetected"), "battery_low_detected");
        assert_eq!(event_display_name("already_snake"), "already_snake");
        assert_eq!(event_display_name("X"), "x");
        assert_eq!(event_display_name(""), "");
    }
}
