//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use moox_core::CoreError;

/// Exit codes for process termination.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication required: {message}")]
    #[diagnostic(
        code(moox::auth_required),
        help(
            "The server rejected the account credentials.\n\
             Update the password in your profile, the system keyring,\n\
             or the MOOX_PASSWORD environment variable, then retry with: moox check"
        )
    )]
    AuthRequired { message: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(moox::no_credentials),
        help("Set MOOX_PASSWORD, add the password to the keyring, or put it in the profile.")
    )]
    NoCredentials { profile: String },

    // ── Updates ──────────────────────────────────────────────────────
    #[error("Update failed: {message}")]
    #[diagnostic(
        code(moox::update_failed),
        help("The server could not be reached or returned an unexpected response.")
    )]
    UpdateFailed { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(moox::validation))]
    Validation { field: String, reason: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(moox::config))]
    Config { message: String },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthRequired { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::UpdateFailed { .. } => exit_code::CONNECTION,
            Self::Validation { .. } => exit_code::USAGE,
            Self::Config { .. } => exit_code::GENERAL,
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationRequired { message } => Self::AuthRequired { message },
            CoreError::UpdateFailed { message } => Self::UpdateFailed { message },
            CoreError::Config { message } => Self::Config { message },
            CoreError::Storage(e) => Self::Config {
                message: e.to_string(),
            },
        }
    }
}

impl From<moox_config::ConfigError> for CliError {
    fn from(err: moox_config::ConfigError) -> Self {
        match err {
            moox_config::ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            moox_config::ConfigError::Validation { field, reason } => {
                Self::Validation { field, reason }
            }
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}
