//! Configuration for the MOOX Track CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `moox_core::TrackerConfig`. The core crate never
//! reads disk -- everything it needs arrives through this translation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use moox_core::TrackerConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Named tracker profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            profiles: HashMap::new(),
        }
    }
}

/// A named tracker profile.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Server hostname.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub ssl: bool,

    #[serde(default = "default_true")]
    pub verify_ssl: bool,

    /// Account email.
    pub email: String,

    /// Password (plaintext -- prefer keyring or `MOOX_PASSWORD`).
    pub password: Option<String>,

    /// Poll interval in seconds (floor 30, enforced by the core).
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Accuracy threshold in meters. 0 disables filtering.
    #[serde(default)]
    pub max_accuracy: f64,

    /// Server attribute names surfaced per device.
    #[serde(default)]
    pub custom_attributes: Vec<String>,

    /// Attributes exempting a device from the accuracy filter.
    #[serde(default)]
    pub skip_accuracy_filter_for: Vec<String>,

    /// Remote event types to import. Empty disables event import.
    #[serde(default)]
    pub events: Vec<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ssl: true,
            verify_ssl: true,
            email: String::new(),
            password: None,
            poll_interval: default_poll_interval(),
            max_accuracy: 0.0,
            custom_attributes: Vec::new(),
            skip_accuracy_filter_for: Vec::new(),
            events: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "app.moox.it".into()
}
fn default_port() -> u16 {
    443
}
fn default_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    30
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("it", "moox", "mooxtrack")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Per-profile state directory for durable facts (the first-failure
/// timestamp lives here).
pub fn state_dir(profile_name: &str) -> PathBuf {
    let base = project_dirs().map_or_else(dirs_fallback, |dirs| {
        dirs.state_dir()
            .unwrap_or_else(|| dirs.data_local_dir())
            .to_path_buf()
    });
    base.join(profile_name)
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("mooxtrack");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = config_path();

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("MOOX_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

/// The profile to use: explicit choice, config default, or "default".
pub fn active_profile_name(explicit: Option<&str>, cfg: &Config) -> String {
    explicit
        .map(str::to_owned)
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the account password: env var, then keyring, then plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Environment
    if let Ok(pw) = std::env::var("MOOX_PASSWORD") {
        return Ok(SecretString::from(pw));
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new("mooxtrack", &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Build a `TrackerConfig` from a profile.
pub fn profile_to_tracker_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<TrackerConfig, ConfigError> {
    if profile.email.is_empty() {
        return Err(ConfigError::Validation {
            field: "email".into(),
            reason: "account email is required".into(),
        });
    }
    if profile.host.is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: "server host is required".into(),
        });
    }
    if profile.max_accuracy < 0.0 {
        return Err(ConfigError::Validation {
            field: "max_accuracy".into(),
            reason: format!("must be >= 0, got {}", profile.max_accuracy),
        });
    }

    let password = resolve_password(profile, profile_name)?;

    Ok(TrackerConfig {
        host: profile.host.clone(),
        port: profile.port,
        ssl: profile.ssl,
        verify_ssl: profile.verify_ssl,
        email: profile.email.clone(),
        password,
        poll_interval: Duration::from_secs(profile.poll_interval),
        max_accuracy: profile.max_accuracy,
        custom_attributes: profile.custom_attributes.clone(),
        skip_accuracy_filter_for: profile.skip_accuracy_filter_for.clone(),
        event_types: profile.events.clone(),
        ..TrackerConfig::default()
    })
}
