// ── Alarm and warning decoding ──
//
// Trackers report alarms and diagnostic conditions through the
// free-form attribute map on each position. These helpers turn the
// known keys into display text; unknown alarm codes fall back to a
// title-cased rendering of the raw value.

use serde_json::{Map, Value};

/// Known alarm codes and their display text. Lookup is
/// case-insensitive: firmwares disagree on the casing of e.g. `fallDown`.
fn alarm_description(alarm: &str) -> Option<&'static str> {
    Some(match alarm {
        "general" => "General Alarm",
        "sos" => "SOS",
        "vibration" => "Vibration",
        "movement" => "Movement",
        "lowspeed" => "Low Speed",
        "overspeed" => "Overspeed",
        "falldown" => "Possible Fall Detected",
        "lowpower" => "Battery Voltage Below Limit",
        "lowbattery" => "GPS Battery Is Low",
        "fault" => "Vehicle Failure Code Detected",
        "poweroff" => "Ignition Off",
        "poweron" => "Ignition On",
        "door" => "Door",
        "lock" => "Lock",
        "unlock" => "Unlock",
        "geofence" => "Area",
        "geofenceenter" => "Enter Area",
        "geofenceexit" => "Exit Area",
        "gpsantennacut" => "GPS Antenna Removed",
        "accident" => "Possible Accident Detected",
        "tow" => "Possible Vehicle Towing Detected",
        "idle" => "Excessive Idling",
        "highrpm" => "High RPM",
        "hardacceleration" => "Harsh Acceleration Detected",
        "hardbraking" => "Harsh Braking Detected",
        "hardcornering" => "Harsh Steering Detected",
        "lanechange" => "Lane Change Detected",
        "fatiguedriving" => "Tired Driver",
        "powercut" => "GPS Disconnected From Battery",
        "powerrestored" => "Alarm Cleared, GPS Connected To Battery",
        "jamming" => "Possible Jamming Attempt Detected",
        "temperature" => "Temperature",
        "parking" => "Parking",
        "shock" => "Impact",
        "bonnet" => "Bonnet",
        "footbrake" => "Foot Brake",
        "fuelleak" => "Fuel Leak",
        "tampering" => "Tampering",
        "removing" => "Removing",
        _ => return None,
    })
}

/// Active alarms from an attribute map.
pub fn detect_alarms(attributes: &Map<String, Value>) -> Vec<String> {
    let Some(alarm) = attributes.get("alarm") else {
        return Vec::new();
    };
    if is_unset(alarm) {
        return Vec::new();
    }

    let raw = value_to_string(alarm);
    match alarm_description(&raw.to_lowercase()) {
        Some(description) => vec![description.to_owned()],
        None => vec![title_case(&raw)],
    }
}

/// Warning conditions from an attribute map.
///
/// Checked in priority order: a received configuration result wins,
/// then a cell-only fix ("Approximate Position": no satellites but a
/// live RSSI), then sleep mode. Sleep mode suppresses the first two --
/// a sleeping tracker legitimately reports no satellites.
pub fn detect_warnings(attributes: &Map<String, Value>) -> Vec<String> {
    let is_sleep_mode = attributes.get("io200").is_some_and(|v| !is_unset(v));

    let has_result = attributes.get("result").is_some_and(|v| !is_unset(v));
    if has_result && !is_sleep_mode {
        return vec!["Configuration Received".to_owned()];
    }

    let no_satellites = attributes
        .get("sat")
        .is_none_or(|v| is_zero(value_as_f64(v).unwrap_or(0.0)));
    let rssi = attributes.get("rssi").and_then(value_as_f64);
    if no_satellites && rssi.is_some_and(|r| r > 0.0) && !is_sleep_mode {
        return vec!["Approximate Position".to_owned()];
    }

    if is_sleep_mode {
        return vec!["Sleep Mode Active".to_owned()];
    }

    Vec::new()
}

// ── Value helpers ────────────────────────────────────────────────────

/// Null, `false`, `0`, and `""` all mean "not set" in tracker payloads.
fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(is_zero),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[allow(clippy::float_cmp)]
fn is_zero(value: f64) -> bool {
    value == 0.0
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
