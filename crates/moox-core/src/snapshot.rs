// ── Snapshot assembly ──
//
// Pure merge logic for one poll cycle's fetched collections. Two
// passes: positions are matched to their devices, filtered by accuracy,
// and enriched with geofence membership and custom attributes; then
// every device without a surviving position is added with an empty one
// so a device stays visible even without a location fix.

use std::collections::HashSet;

use serde_json::{Map, Value};

use moox_api::{Device, Geofence, Position};

use crate::config::TrackerConfig;
use crate::model::{Snapshot, TrackedDevice};

/// Resolve a device by id.
fn find_device(device_id: i64, devices: &[Device]) -> Option<&Device> {
    devices.iter().find(|d| d.id == device_id)
}

/// Normalize a raw geofence-id list to integers, skipping entries that
/// are neither numbers nor numeric strings.
fn normalize_id_list(raw: Option<&Vec<Value>>) -> Vec<i64> {
    raw.map(|ids| ids.iter().filter_map(value_as_id).collect())
        .unwrap_or_default()
}

fn value_as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Geofence ids for a device/position pair. The position's list takes
/// precedence over the device's, even when empty.
pub(crate) fn geofence_ids(device: &Device, position: &Position) -> Vec<i64> {
    if position.geofence_ids.is_some() {
        return normalize_id_list(position.geofence_ids.as_ref());
    }
    normalize_id_list(device.geofence_ids.as_ref())
}

/// First geofence (in fetch order) whose id is in `target`.
pub(crate) fn first_geofence<'a>(
    geofences: &'a [Geofence],
    target: &[i64],
) -> Option<&'a Geofence> {
    if target.is_empty() || geofences.is_empty() {
        return None;
    }
    let target: HashSet<i64> = target.iter().copied().collect();
    geofences.iter().find(|g| target.contains(&g.id))
}

/// Compute the configured custom attributes for a device/position pair,
/// or `None` when the position fails the accuracy filter.
///
/// The device's attribute value wins over the position's; a configured
/// name missing from both maps is surfaced as JSON null. Naming any
/// attribute from the skip set bypasses the accuracy filter for the
/// pair, and a `max_accuracy` of 0 disables filtering entirely.
pub(crate) fn custom_attributes_if_accurate(
    config: &TrackerConfig,
    device: &Device,
    position: &Position,
) -> Option<Map<String, Value>> {
    let mut attributes = Map::new();
    let mut skip_accuracy_filter = false;

    for name in &config.custom_attributes {
        if config.skip_accuracy_filter_for.contains(name) {
            skip_accuracy_filter = true;
        }
        let value = device
            .attributes
            .get(name)
            .or_else(|| position.attributes.get(name))
            .cloned()
            .unwrap_or(Value::Null);
        attributes.insert(name.clone(), value);
    }

    if !skip_accuracy_filter
        && config.max_accuracy > 0.0
        && position.accuracy > config.max_accuracy
    {
        return None;
    }
    Some(attributes)
}

/// Merge one cycle's fetches into a fresh snapshot.
pub(crate) fn build_snapshot(
    devices: &[Device],
    positions: &[Position],
    geofences: &[Geofence],
    config: &TrackerConfig,
) -> Snapshot {
    let mut data = Snapshot::new();

    for position in positions {
        let Some(device) = find_device(position.device_id, devices) else {
            continue;
        };
        let Some(attributes) = custom_attributes_if_accurate(config, device, position) else {
            continue;
        };

        let ids = geofence_ids(device, position);
        let geofence = first_geofence(geofences, &ids).cloned();
        data.insert(
            position.device_id,
            TrackedDevice {
                device: device.clone(),
                geofence,
                position: Some(position.clone()),
                attributes,
            },
        );
    }

    // Devices without a usable position stay visible, just without one.
    for device in devices {
        data.entry(device.id).or_insert_with(|| TrackedDevice {
            device: device.clone(),
            geofence: None,
            position: None,
            attributes: Map::new(),
        });
    }

    data
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn device(id: i64, name: &str) -> Device {
        serde_json::from_value(json!({"id": id, "name": name})).unwrap()
    }

    fn position(device_id: i64, accuracy: f64) -> Position {
        serde_json::from_value(json!({
            "deviceId": device_id,
            "latitude": 45.46,
            "longitude": 9.19,
            "accuracy": accuracy,
        }))
        .unwrap()
    }

    fn geofence(id: i64, name: &str) -> Geofence {
        serde_json::from_value(json!({"id": id, "name": name, "area": "CIRCLE (45 9, 100)"}))
            .unwrap()
    }

    fn config() -> TrackerConfig {
        TrackerConfig::default()
    }

    #[test]
    fn every_listed_device_appears_exactly_once() {
        let devices = vec![device(1, "Van"), device(2, "Car"), device(3, "Truck")];
        let positions = vec![position(1, 10.0), position(2, 20.0)];

        let snapshot = build_snapshot(&devices, &positions, &[], &config());

        assert_eq!(snapshot.len(), 3);
        assert!(snapshot[&1].position.is_some());
        assert!(snapshot[&2].position.is_some());
        assert!(snapshot[&3].position.is_none());
    }

    #[test]
    fn position_without_device_is_skipped() {
        let devices = vec![device(1, "Van")];
        let positions = vec![position(1, 10.0), position(99, 10.0)];

        let snapshot = build_snapshot(&devices, &positions, &[], &config());

        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot.contains_key(&99));
    }

    #[test]
    fn accuracy_zero_disables_the_filter() {
        // Accuracy 50 with max_accuracy 0 passes through.
        let devices = vec![device(1, "Van")];
        let positions = vec![position(1, 50.0)];
        let cfg = TrackerConfig {
            max_accuracy: 0.0,
            ..config()
        };

        let snapshot = build_snapshot(&devices, &positions, &[], &cfg);
        assert!(snapshot[&1].position.is_some());
    }

    #[test]
    fn inaccurate_position_falls_back_to_positionless_entry() {
        // Accuracy 200 over a 100 threshold is dropped, but the device
        // stays in the snapshot.
        let devices = vec![device(1, "Van")];
        let positions = vec![position(1, 200.0)];
        let cfg = TrackerConfig {
            max_accuracy: 100.0,
            ..config()
        };

        let snapshot = build_snapshot(&devices, &positions, &[], &cfg);
        assert!(snapshot[&1].position.is_none());
        assert!(snapshot[&1].attributes.is_empty());
    }

    #[test]
    fn accuracy_filter_boundary_is_inclusive() {
        let devices = vec![device(1, "Van")];
        let positions = vec![position(1, 100.0)];
        let cfg = TrackerConfig {
            max_accuracy: 100.0,
            ..config()
        };

        // accuracy == max_accuracy is allowed; only strictly above is dropped.
        let snapshot = build_snapshot(&devices, &positions, &[], &cfg);
        assert!(snapshot[&1].position.is_some());
    }

    #[test]
    fn skip_set_bypasses_the_accuracy_filter() {
        let devices = vec![device(1, "Van")];
        let positions = vec![position(1, 500.0)];
        let cfg = TrackerConfig {
            max_accuracy: 100.0,
            custom_attributes: vec!["battery".into()],
            skip_accuracy_filter_for: vec!["battery".into()],
            ..config()
        };

        let snapshot = build_snapshot(&devices, &positions, &[], &cfg);
        assert!(snapshot[&1].position.is_some());
    }

    #[test]
    fn position_geofence_list_takes_precedence() {
        // Position carries [5], device carries [7] -- geofence 5 wins.
        let mut dev = device(1, "Van");
        dev.geofence_ids = Some(vec![json!(7)]);
        let mut pos = position(1, 10.0);
        pos.geofence_ids = Some(vec![json!(5)]);
        let fences = vec![geofence(7, "Depot"), geofence(5, "Yard")];

        let snapshot = build_snapshot(&[dev], &[pos], &fences, &config());
        assert_eq!(snapshot[&1].geofence.as_ref().unwrap().id, 5);
    }

    #[test]
    fn device_geofence_list_is_the_fallback() {
        let mut dev = device(1, "Van");
        dev.geofence_ids = Some(vec![json!(7)]);
        let pos = position(1, 10.0);
        let fences = vec![geofence(7, "Depot")];

        let snapshot = build_snapshot(&[dev], &[pos], &fences, &config());
        assert_eq!(snapshot[&1].geofence.as_ref().unwrap().id, 7);
    }

    #[test]
    fn first_matching_geofence_in_fetch_order_wins() {
        let dev = device(1, "Van");
        let mut pos = position(1, 10.0);
        pos.geofence_ids = Some(vec![json!(5), json!(7)]);
        let fences = vec![geofence(7, "Depot"), geofence(5, "Yard")];

        let snapshot = build_snapshot(&[dev], &[pos], &fences, &config());
        // Fetch order, not id-list order, decides.
        assert_eq!(snapshot[&1].geofence.as_ref().unwrap().id, 7);
    }

    #[test]
    fn junk_geofence_ids_are_skipped() {
        let dev = device(1, "Van");
        let mut pos = position(1, 10.0);
        pos.geofence_ids = Some(vec![json!(null), json!("not-a-number"), json!("5")]);
        let fences = vec![geofence(5, "Yard")];

        let snapshot = build_snapshot(&[dev], &[pos], &fences, &config());
        assert_eq!(snapshot[&1].geofence.as_ref().unwrap().id, 5);
    }

    #[test]
    fn device_attribute_value_overrides_position() {
        let mut dev = device(1, "Van");
        dev.attributes.insert("battery".into(), json!(80));
        let mut pos = position(1, 10.0);
        pos.attributes.insert("battery".into(), json!(60));
        pos.attributes.insert("odometer".into(), json!(12345));
        let cfg = TrackerConfig {
            custom_attributes: vec!["battery".into(), "odometer".into(), "fuel".into()],
            ..config()
        };

        let snapshot = build_snapshot(&[dev], &[pos], &[], &cfg);
        let attrs = &snapshot[&1].attributes;
        assert_eq!(attrs["battery"], json!(80));
        assert_eq!(attrs["odometer"], json!(12345));
        // Configured but absent everywhere: surfaced as null.
        assert_eq!(attrs["fuel"], Value::Null);
    }

    #[test]
    fn empty_position_geofence_list_still_shadows_device() {
        let mut dev = device(1, "Van");
        dev.geofence_ids = Some(vec![json!(7)]);
        let mut pos = position(1, 10.0);
        pos.geofence_ids = Some(vec![]);
        let fences = vec![geofence(7, "Depot")];

        let snapshot = build_snapshot(&[dev], &[pos], &fences, &config());
        assert!(snapshot[&1].geofence.is_none());
    }
}
