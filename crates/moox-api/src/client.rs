// MOOX HTTP client
//
// Wraps `reqwest::Client` with the session lifecycle: cookie login,
// re-authentication on session expiry, exponential backoff between
// login attempts, and bounded retries for transient failures. Endpoint
// methods live in `endpoints.rs` as inherent methods to keep this
// module focused on transport mechanics.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{SessionJar, TransportConfig};

/// Base delay between login attempts.
const LOGIN_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Backoff multiplier applied per failed login attempt.
const LOGIN_BACKOFF_MULTIPLIER: f64 = 1.5;
/// Cap on the login backoff exponent.
const MAX_BACKOFF_EXPONENT: u32 = 5;
/// Transient-failure retries inside a single login attempt.
const AUTH_INTERNAL_RETRIES: u32 = 3;
/// Attempts for an authenticated request.
const REQUEST_RETRIES: u32 = 3;
/// Server error code embedded in 400 bodies meaning invalid credentials.
const CREDENTIAL_ERROR_CODE: &str = "ERROR_004";

/// Error body shape used by the server for 400 responses.
#[derive(serde::Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Returns the server message when `text` carries the invalid-credential code.
fn credential_error(text: &str) -> Option<String> {
    let body: ApiErrorBody = serde_json::from_str(text).ok()?;
    (body.error.as_deref() == Some(CREDENTIAL_ERROR_CODE))
        .then(|| body.message.unwrap_or_else(|| "Invalid email or password".into()))
}

/// Sleep between internal login attempts: 1s, 2s, 4s, capped at 5s.
fn login_retry_sleep(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt).min(5))
}

/// Sleep between request attempts: 1s, 2s, 4s, capped at 10s.
fn request_retry_sleep(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt).min(10))
}

/// Client-internal session state.
///
/// `ever_authenticated` is sticky: once the credentials have worked,
/// later rejections are treated as session trouble rather than proof
/// the password is wrong.
#[derive(Debug, Default)]
struct SessionState {
    authenticated: bool,
    ever_authenticated: bool,
    session_expiry_in_progress: bool,
    /// Set after a credential rejection on an account that never
    /// authenticated: no further login attempts until the credentials
    /// change (a new client instance).
    credential_failure: Option<String>,
    login_attempt_count: u32,
    last_login_attempt: Option<Instant>,
}

/// Async client for the MOOX Track server.
///
/// All endpoint methods authenticate transparently. Concurrent callers
/// needing a login await the same attempt through an internal lock --
/// the fan-out of a poll cycle produces exactly one login request.
pub struct MooxClient {
    http: reqwest::Client,
    base_url: Url,
    email: String,
    password: SecretString,
    jar: Arc<SessionJar>,
    /// Serializes login attempts. Held across the whole attempt so
    /// concurrent requests piggyback instead of double-logging-in.
    auth_lock: AsyncMutex<()>,
    state: Mutex<SessionState>,
}

impl MooxClient {
    /// Create a client for `{scheme}://{host}:{port}/api`.
    ///
    /// Does not perform any I/O -- the first request triggers the login.
    pub fn new(
        host: &str,
        port: u16,
        email: impl Into<String>,
        password: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let jar = Arc::new(SessionJar::new());
        let http = transport.build_client(Arc::clone(&jar))?;
        let base_url = Url::parse(&format!("{}://{host}:{port}/api", transport.scheme()))?;

        Ok(Self {
            http,
            base_url,
            email: email.into(),
            password,
            jar,
            auth_lock: AsyncMutex::new(()),
            state: Mutex::new(SessionState::default()),
        })
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `true` once the credentials have worked at least once.
    pub fn ever_authenticated(&self) -> bool {
        self.state().ever_authenticated
    }

    // ── Session state transitions ────────────────────────────────────

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state lock poisoned")
    }

    fn mark_session_authenticated(&self) {
        let mut s = self.state();
        s.authenticated = true;
        s.ever_authenticated = true;
        s.session_expiry_in_progress = false;
        s.login_attempt_count = 0;
    }

    /// Drop the session but keep authentication history for re-login.
    fn clear_auth_state_for_reauth(&self) {
        {
            let mut s = self.state();
            s.authenticated = false;
            s.session_expiry_in_progress = true;
        }
        self.jar.clear();
    }

    /// Full reset after a confirmed credential failure. Latches the
    /// failure: this client will not log in again until the caller
    /// supplies new credentials (by constructing a new client).
    fn reset_for_credential_failure(&self, message: &str) {
        {
            let mut s = self.state();
            s.authenticated = false;
            s.ever_authenticated = false;
            s.session_expiry_in_progress = false;
            s.credential_failure = Some(message.to_owned());
        }
        self.jar.clear();
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Wait out the login rate limit, measured from the previous attempt.
    async fn wait_for_login_retry(&self) {
        let (count, last) = {
            let s = self.state();
            (s.login_attempt_count, s.last_login_attempt)
        };
        let Some(last) = last else { return };

        let exponent = count.saturating_sub(2).min(MAX_BACKOFF_EXPONENT);
        let delay = LOGIN_RETRY_DELAY.mul_f64(LOGIN_BACKOFF_MULTIPLIER.powf(f64::from(exponent)));
        let elapsed = last.elapsed();
        if elapsed < delay {
            tokio::time::sleep(delay - elapsed).await;
        }
    }

    /// Establish a session if there is none.
    ///
    /// `POST /api/session` with the account credentials. Transient
    /// failures are retried internally; a 400 carrying the credential
    /// error code surfaces as [`Error::Authentication`] immediately,
    /// with session state reset according to authentication history.
    /// A hard credential failure latches: later calls fail without
    /// touching the server until a new client is constructed.
    #[allow(clippy::cognitive_complexity, clippy::too_many_lines)]
    async fn authenticate(&self, skip_rate_limit: bool, is_reauth: bool) -> Result<(), Error> {
        if self.state().authenticated {
            return Ok(());
        }

        let _guard = self.auth_lock.lock().await;
        // Re-check: another caller may have logged in (or hit a hard
        // credential failure) while we waited.
        {
            let s = self.state();
            if s.authenticated {
                return Ok(());
            }
            if let Some(message) = s.credential_failure.clone() {
                return Err(Error::Authentication { message });
            }
        }

        self.state().login_attempt_count += 1;
        if !skip_rate_limit {
            self.wait_for_login_retry().await;
        }
        self.state().last_login_attempt = Some(Instant::now());

        let url = self.endpoint_url("session");
        debug!(%url, "logging in");

        let mut last_error: Option<Error> = None;

        for attempt in 0..AUTH_INTERNAL_RETRIES {
            if is_reauth || attempt > 0 {
                self.jar.clear();
            }

            let payload = json!({
                "email": self.email,
                "password": self.password.expose_secret(),
                "remember_me": "true",
            });

            match self.http.post(url.clone()).json(&payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        debug!("login successful");
                        self.mark_session_authenticated();
                        return Ok(());
                    }

                    let text = resp.text().await.unwrap_or_default();

                    if status == StatusCode::BAD_REQUEST {
                        if let Some(message) = credential_error(&text) {
                            if self.state().ever_authenticated {
                                // Credentials worked before: drop the
                                // session but keep the sticky flag so the
                                // caller may retry later.
                                self.state().authenticated = false;
                                self.jar.clear();
                            } else {
                                self.reset_for_credential_failure(&message);
                            }
                            return Err(Error::Authentication { message });
                        }
                        last_error = Some(Error::Api {
                            status: Some(status.as_u16()),
                            message: format!("authentication failed: {text}"),
                        });
                    } else if status.is_server_error() {
                        last_error = Some(Error::Connection {
                            message: format!("server error {status} during login"),
                        });
                    } else {
                        last_error = Some(Error::Api {
                            status: Some(status.as_u16()),
                            message: format!("authentication failed ({status}): {text}"),
                        });
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_error = Some(Error::Connection {
                        message: format!("login transport error: {e}"),
                    });
                }
                Err(e) => {
                    return Err(Error::Api {
                        status: e.status().map(|s| s.as_u16()),
                        message: format!("client error during login: {e}"),
                    });
                }
            }

            if attempt + 1 < AUTH_INTERNAL_RETRIES {
                tokio::time::sleep(login_retry_sleep(attempt)).await;
            }
        }

        {
            let mut s = self.state();
            s.authenticated = false;
            s.session_expiry_in_progress = false;
        }
        self.jar.clear();

        Err(last_error.unwrap_or_else(|| Error::Api {
            status: None,
            message: "authentication failed".into(),
        }))
    }

    // ── Requests ─────────────────────────────────────────────────────

    pub(crate) fn endpoint_url(&self, endpoint: &str) -> Url {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{endpoint}")).expect("invalid endpoint URL")
    }

    /// Perform an authenticated request and deserialize the JSON body.
    ///
    /// Classification per attempt: 2xx parses or fails as
    /// [`Error::InvalidResponse`]; a 400 with the credential code is a
    /// session expiry (re-login once, bypassing the rate limit, then
    /// replay) unless no session was ever established, in which case it
    /// is a credential failure; other 400s and unexpected statuses are
    /// not retried; 5xx and transport errors are retried with backoff.
    #[allow(clippy::cognitive_complexity, clippy::too_many_lines)]
    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.endpoint_url(endpoint);

        let request_had_valid_session = {
            let s = self.state();
            s.authenticated || s.ever_authenticated
        };

        let mut needs_reauth = false;
        let mut last_error: Option<Error> = None;

        for attempt in 0..REQUEST_RETRIES {
            match self.authenticate(needs_reauth, needs_reauth).await {
                Ok(()) => {}
                Err(e @ Error::Authentication { .. }) => return Err(e),
                Err(e) if e.is_transient() && attempt + 1 < REQUEST_RETRIES => {
                    last_error = Some(e);
                    tokio::time::sleep(request_retry_sleep(attempt)).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
            needs_reauth = false;

            let mut builder = self.http.request(method.clone(), url.clone());
            if !params.is_empty() {
                builder = builder.query(params);
            }

            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        self.state().session_expiry_in_progress = false;
                        let body = resp.text().await.map_err(|e| Error::Connection {
                            message: format!("failed to read response body: {e}"),
                        })?;
                        return serde_json::from_str(&body).map_err(|e| Error::InvalidResponse {
                            message: e.to_string(),
                            body,
                        });
                    }

                    let text = resp.text().await.unwrap_or_default();

                    if status == StatusCode::BAD_REQUEST {
                        if let Some(message) = credential_error(&text) {
                            let session_was_valid = request_had_valid_session || {
                                let s = self.state();
                                s.authenticated
                                    || s.ever_authenticated
                                    || s.session_expiry_in_progress
                            };

                            if session_was_valid {
                                // A stale-but-previously-good session is
                                // not a credential failure.
                                self.clear_auth_state_for_reauth();
                                if attempt + 1 < REQUEST_RETRIES {
                                    debug!(endpoint, "session expired -- re-authenticating");
                                    needs_reauth = true;
                                    last_error = Some(Error::SessionExpired);
                                    tokio::time::sleep(request_retry_sleep(attempt)).await;
                                    continue;
                                }
                                return Err(Error::SessionExpired);
                            }

                            self.reset_for_credential_failure(&message);
                            return Err(Error::Authentication { message });
                        }
                        return Err(Error::Api {
                            status: Some(status.as_u16()),
                            message: format!("API error 400: {text}"),
                        });
                    }

                    if status.is_server_error() {
                        if attempt + 1 < REQUEST_RETRIES {
                            last_error = Some(Error::Connection {
                                message: format!("server error {status}"),
                            });
                            tokio::time::sleep(request_retry_sleep(attempt)).await;
                            continue;
                        }
                        return Err(Error::Connection {
                            message: format!(
                                "server error after {REQUEST_RETRIES} attempts: {status}"
                            ),
                        });
                    }

                    return Err(Error::Api {
                        status: Some(status.as_u16()),
                        message: format!("API error {status}: {text}"),
                    });
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if attempt + 1 < REQUEST_RETRIES {
                        last_error = Some(Error::Connection {
                            message: format!("transport error: {e}"),
                        });
                        tokio::time::sleep(request_retry_sleep(attempt)).await;
                        continue;
                    }
                    return Err(Error::Connection {
                        message: format!("transport error after {REQUEST_RETRIES} attempts: {e}"),
                    });
                }
                Err(e) => {
                    return Err(Error::Api {
                        status: e.status().map(|s| s.as_u16()),
                        message: format!("client error: {e}"),
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Api {
            status: None,
            message: "request failed".into(),
        }))
    }
}
