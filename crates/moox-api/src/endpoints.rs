// Typed MOOX API endpoints
//
// Thin inherent methods over `MooxClient::request`. The event report is
// the odd one out: it is best-effort by contract, so failures collapse
// to an empty list instead of propagating.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use tracing::debug;

use crate::client::MooxClient;
use crate::error::Error;
use crate::models::{Device, Event, Geofence, Position, Server};

impl MooxClient {
    /// List all tracker devices.
    ///
    /// `GET /api/devices`
    pub async fn get_devices(&self) -> Result<Vec<Device>, Error> {
        debug!("listing devices");
        self.request(Method::GET, "devices", &[]).await
    }

    /// Latest known position for every device.
    ///
    /// `GET /api/positions`
    pub async fn get_positions(&self) -> Result<Vec<Position>, Error> {
        debug!("listing positions");
        self.request(Method::GET, "positions", &[]).await
    }

    /// List all geofences visible to the account.
    ///
    /// `GET /api/geofences`
    pub async fn get_geofences(&self) -> Result<Vec<Geofence>, Error> {
        debug!("listing geofences");
        self.request(Method::GET, "geofences", &[]).await
    }

    /// Server information.
    ///
    /// `GET /api/server` -- used solely to validate credentials.
    pub async fn get_server(&self) -> Result<Server, Error> {
        debug!("fetching server info");
        self.request(Method::GET, "server", &[]).await
    }

    /// Events for the given devices in `(from, to]`.
    ///
    /// `GET /api/reports/events` with one `deviceId` parameter per
    /// device, ISO-8601 UTC bounds (`from` omitted on the first import),
    /// and a comma-joined `type` filter.
    ///
    /// Best-effort: an empty device list short-circuits to an empty
    /// result, and any API failure is swallowed into an empty list.
    pub async fn get_reports_events(
        &self,
        device_ids: &[i64],
        from: Option<DateTime<Utc>>,
        to: DateTime<Utc>,
        event_types: &[String],
    ) -> Result<Vec<Event>, Error> {
        if device_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut params: Vec<(&str, String)> = device_ids
            .iter()
            .map(|id| ("deviceId", id.to_string()))
            .collect();
        params.push(("to", to.to_rfc3339_opts(SecondsFormat::Micros, true)));
        if let Some(from) = from {
            params.push(("from", from.to_rfc3339_opts(SecondsFormat::Micros, true)));
        }

        let types: Vec<&str> = event_types
            .iter()
            .map(String::as_str)
            .filter(|t| !t.is_empty())
            .collect();
        if !types.is_empty() {
            params.push(("type", types.join(",")));
        }

        debug!(devices = device_ids.len(), "fetching event report");
        match self
            .request::<Vec<Event>>(Method::GET, "reports/events", &params)
            .await
        {
            Ok(events) => Ok(events),
            Err(err) => {
                debug!(error = %err, "event report fetch failed -- returning empty");
                Ok(Vec::new())
            }
        }
    }
}
