// ── Runtime tracker configuration ──
//
// Describes *how* to reach the MOOX server and *what* to derive from
// its data. Carries credential data and tuning, but never touches disk.
// The CLI (via moox-config) constructs a `TrackerConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;

/// Enforced floor for the poll interval. Anything configured below this
/// is clamped up with a one-time warning.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Cadence of the event import timer.
pub const EVENT_IMPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for tracking a single MOOX account.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Use HTTPS.
    pub ssl: bool,
    /// Verify the server certificate.
    pub verify_ssl: bool,
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: SecretString,
    /// How often to poll devices/positions/geofences.
    pub poll_interval: Duration,
    /// Positions with a reported accuracy above this (meters) are
    /// dropped. `0.0` disables the filter.
    pub max_accuracy: f64,
    /// Server attribute names to surface per device.
    pub custom_attributes: Vec<String>,
    /// Subset of `custom_attributes` that exempts a device from the
    /// accuracy filter.
    pub skip_accuracy_filter_for: Vec<String>,
    /// Remote event type names to import. Empty disables event import.
    pub event_types: Vec<String>,
    /// How often to import events.
    pub event_import_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            host: "app.moox.it".into(),
            port: 443,
            ssl: true,
            verify_ssl: true,
            email: String::new(),
            password: SecretString::from(String::new()),
            poll_interval: MIN_POLL_INTERVAL,
            max_accuracy: 0.0,
            custom_attributes: Vec::new(),
            skip_accuracy_filter_for: Vec::new(),
            event_types: Vec::new(),
            event_import_interval: EVENT_IMPORT_INTERVAL,
        }
    }
}
