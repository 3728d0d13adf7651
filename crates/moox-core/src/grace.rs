// ── Failure grace period ──
//
// Converts a stream of failure classifications into a binary decision:
// keep serving cached data silently, or escalate to the caller. The
// window is anchored to the *first* failure of the current outage, and
// that timestamp is persisted so a restart mid-outage does not reset
// the clock.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::persist::StateStore;

/// Grace window when the credentials have worked before: the server may
/// simply be down for a while.
const AUTH_FAILURE_GRACE_PERIOD_HOURS: i64 = 12;

/// Grace window when the credentials have NEVER worked: could be a bad
/// password or a down server, so prompt for credentials much sooner.
const AUTH_NEVER_WORKED_GRACE_PERIOD_HOURS: i64 = 1;

/// Storage key for the persisted first-failure timestamp.
const FIRST_FAILURE_KEY: &str = "first_auth_failure";

/// Failure classification for a poll cycle, ordered by severity: when
/// several calls fail in one cycle, only the highest-severity kind
/// drives the grace decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureKind {
    /// Non-retriable API failure (malformed request, unexpected status,
    /// invalid body). Never graced -- escalates immediately.
    Api,
    /// Transient network or server failure.
    Connection,
    /// Session invalidated and re-login did not recover within the
    /// client's bounded retries.
    SessionExpired,
    /// Credentials rejected by the server.
    Authentication,
}

/// Outcome of a grace evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceDecision {
    /// Keep serving the previous snapshot; polling continues silently.
    ServeStale,
    /// Surface the failure to the caller.
    Escalate,
}

#[derive(Default)]
struct GraceState {
    /// Best-effort load-once guard for the persisted timestamp.
    loaded: bool,
    first_failure: Option<DateTime<Utc>>,
    seen_success: bool,
}

/// Grace-period policy around one tracker instance's poll failures.
///
/// Single-writer: the coordinator is the only caller, so persistence
/// happens outside the state lock without read-modify-write races.
pub struct GracePolicy {
    store: Arc<dyn StateStore>,
    state: Mutex<GraceState>,
}

impl GracePolicy {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            state: Mutex::new(GraceState::default()),
        }
    }

    /// Decide whether a classified failure escalates now.
    ///
    /// A credential failure on an account that has never authenticated
    /// escalates immediately -- there is nothing to wait for. Everything
    /// else opens (or continues) a grace window measured from the first
    /// failure of the outage: 12h when the credentials are known-good,
    /// 1h when they never worked. Crossing the window closes it and
    /// escalates; the next failure starts a fresh window.
    pub fn evaluate(&self, kind: FailureKind, ever_authenticated: bool) -> GraceDecision {
        self.evaluate_at(kind, ever_authenticated, Utc::now())
    }

    fn evaluate_at(
        &self,
        kind: FailureKind,
        ever_authenticated: bool,
        now: DateTime<Utc>,
    ) -> GraceDecision {
        if kind == FailureKind::Authentication && !ever_authenticated {
            debug!("credential failure without prior success -- escalating immediately");
            return GraceDecision::Escalate;
        }

        let (decision, persist) = {
            let mut state = self.lock_state();
            self.ensure_loaded(&mut state);

            match state.first_failure {
                None => {
                    state.first_failure = Some(now);
                    debug!(?kind, "first failure of outage -- grace window opened");
                    (GraceDecision::ServeStale, Some(Some(now)))
                }
                Some(first) => {
                    let hours = if ever_authenticated {
                        AUTH_FAILURE_GRACE_PERIOD_HOURS
                    } else {
                        AUTH_NEVER_WORKED_GRACE_PERIOD_HOURS
                    };
                    if now - first < Duration::hours(hours) {
                        (GraceDecision::ServeStale, None)
                    } else {
                        state.first_failure = None;
                        info!(
                            ?kind,
                            elapsed_hours = (now - first).num_hours(),
                            "grace window exceeded -- escalating"
                        );
                        (GraceDecision::Escalate, Some(None))
                    }
                }
            }
        };

        if let Some(value) = persist {
            self.persist(value);
        }
        decision
    }

    /// Record a successful poll: closes any open grace window.
    pub fn on_success(&self) {
        let had_failure = {
            let mut state = self.lock_state();
            self.ensure_loaded(&mut state);
            let had = state.first_failure.take().is_some();
            if !had && !state.seen_success {
                debug!("first successful poll for this instance");
            }
            state.seen_success = true;
            had
        };

        if had_failure {
            self.persist(None);
            info!("outage resolved -- grace window cleared");
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn lock_state(&self) -> MutexGuard<'_, GraceState> {
        self.state.lock().expect("grace state lock poisoned")
    }

    fn ensure_loaded(&self, state: &mut GraceState) {
        if state.loaded {
            return;
        }
        state.loaded = true;

        match self.store.load(FIRST_FAILURE_KEY) {
            Ok(Some(Value::String(raw))) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(first) => {
                    state.first_failure = Some(first.with_timezone(&Utc));
                    debug!(%raw, "resumed grace window from storage");
                }
                Err(e) => warn!(%raw, error = %e, "discarding unparsable first-failure marker"),
            },
            Ok(Some(other)) => {
                warn!(?other, "discarding malformed first-failure marker");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to load first-failure marker"),
        }
    }

    /// Persist or clear the first-failure marker. Best-effort: a failed
    /// write costs at most one grace-period decision after a restart.
    fn persist(&self, first_failure: Option<DateTime<Utc>>) {
        let result = match first_failure {
            Some(at) => self
                .store
                .save(FIRST_FAILURE_KEY, &Value::String(at.to_rfc3339())),
            None => self.store.remove(FIRST_FAILURE_KEY),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist first-failure marker");
        }
    }
}
