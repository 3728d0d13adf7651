use thiserror::Error;

/// Top-level error type for the `moox-api` crate.
///
/// Failures are classified at the transport layer so callers never
/// inspect HTTP status codes. The distinction between
/// [`Authentication`](Error::Authentication) and
/// [`SessionExpired`](Error::SessionExpired) is load-bearing: the first
/// means the credentials themselves were rejected, the second that a
/// previously-good session went stale and a re-login is worth trying.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The server rejected the credentials (invalid email or password).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// A previously-valid session was invalidated by the server.
    /// Surfaced only after internal re-login attempts are exhausted.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// Transient network or server failure (timeout, connect error,
    /// 5xx), surfaced after bounded retries.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// TLS setup or HTTP client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── API ─────────────────────────────────────────────────────────
    /// Non-retriable API error (malformed request, unexpected status).
    #[error("API error: {message}")]
    Api { status: Option<u16>, message: String },

    /// A 2xx response whose body was not valid JSON for the expected shape.
    #[error("Invalid response body: {message}")]
    InvalidResponse { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns `true` if this error relates to authentication state.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::SessionExpired)
    }
}
