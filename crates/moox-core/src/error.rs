// ── Core error types ──
//
// User-facing errors from moox-core. Consumers never see HTTP status
// codes: by the time an error crosses this boundary it has already been
// through client-level retries and the coordinator's grace period, so
// the only question left is "re-enter credentials or wait it out".

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Credentials are rejected or were never known to work -- the user
    /// must re-enter them.
    #[error("Authentication required: {message}")]
    AuthenticationRequired { message: String },

    /// A poll cycle failed past the grace window, or hit a
    /// non-retriable API error. Credentials are believed good; the next
    /// scheduled cycle retries.
    #[error("Update failed: {message}")]
    UpdateFailed { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("State storage error: {0}")]
    Storage(#[from] crate::persist::StoreError),
}

impl From<moox_api::Error> for CoreError {
    fn from(err: moox_api::Error) -> Self {
        match err {
            moox_api::Error::Authentication { message } => {
                CoreError::AuthenticationRequired { message }
            }
            moox_api::Error::SessionExpired => CoreError::AuthenticationRequired {
                message: "session expired and re-authentication failed".into(),
            },
            other => CoreError::UpdateFailed {
                message: other.to_string(),
            },
        }
    }
}
