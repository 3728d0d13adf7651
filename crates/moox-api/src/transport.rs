// Transport configuration and session cookie storage.
//
// The MOOX server tracks sessions via a cookie set by POST /api/session.
// Session expiry requires dropping that cookie wholesale, and
// `reqwest::cookie::Jar` has no clear operation, so `SessionJar` wraps
// a replaceable inner jar behind the `CookieStore` trait.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use url::Url;

use crate::error::Error;

/// Shared transport configuration for building the HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Use HTTPS (plain HTTP otherwise).
    pub ssl: bool,
    /// Verify the server certificate. Ignored when `ssl` is off.
    pub verify_ssl: bool,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Total per-request timeout.
    pub total_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ssl: true,
            verify_ssl: true,
            connect_timeout: Duration::from_secs(10),
            total_timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// URL scheme implied by the TLS setting.
    pub fn scheme(&self) -> &'static str {
        if self.ssl { "https" } else { "http" }
    }

    /// Build a `reqwest::Client` backed by the given cookie jar.
    pub fn build_client(&self, jar: Arc<SessionJar>) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.total_timeout)
            .user_agent(concat!("moox-api/", env!("CARGO_PKG_VERSION")))
            .cookie_provider(jar);

        if self.ssl && !self.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

/// Cookie store whose contents can be dropped wholesale.
///
/// Cleared on session expiry and before re-login attempts so a stale
/// session cookie never shadows a fresh one.
#[derive(Default)]
pub struct SessionJar {
    inner: RwLock<Jar>,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all stored cookies.
    pub fn clear(&self) {
        *self.inner.write().expect("cookie jar lock poisoned") = Jar::default();
    }
}

impl CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.inner
            .read()
            .expect("cookie jar lock poisoned")
            .set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.inner
            .read()
            .expect("cookie jar lock poisoned")
            .cookies(url)
    }
}
