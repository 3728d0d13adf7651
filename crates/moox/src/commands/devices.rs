//! `moox devices` -- one-shot poll and device listing.

use tabled::{Table, Tabled, settings::Style};

use moox_core::{Coordinator, TrackedDevice};

use crate::error::CliError;

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "POSITION")]
    position: String,
    #[tabled(rename = "SPEED")]
    speed: String,
    #[tabled(rename = "GEOFENCE")]
    geofence: String,
    #[tabled(rename = "ALERTS")]
    alerts: String,
}

impl DeviceRow {
    fn from_entry(id: i64, entry: &TrackedDevice) -> Self {
        let position = entry.position.as_ref().map_or_else(
            || "-".to_owned(),
            |p| format!("{:.5}, {:.5}", p.latitude, p.longitude),
        );
        let speed = entry
            .position
            .as_ref()
            .map_or_else(|| "-".to_owned(), |p| format!("{:.1} kn", p.speed));

        let mut alerts = entry.alarms();
        alerts.extend(entry.warnings());

        Self {
            id,
            name: entry.device.name.clone(),
            status: entry.device.status.to_string(),
            position,
            speed,
            geofence: entry.geofence_name().unwrap_or("-").to_owned(),
            alerts: if alerts.is_empty() {
                "-".to_owned()
            } else {
                alerts.join(", ")
            },
        }
    }
}

pub async fn run(coordinator: &Coordinator) -> Result<(), CliError> {
    let snapshot = coordinator.poll_once().await.map_err(CliError::from)?;

    let mut rows: Vec<DeviceRow> = snapshot
        .iter()
        .map(|(id, entry)| DeviceRow::from_entry(*id, entry))
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{table}");
    Ok(())
}
