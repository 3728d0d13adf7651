// ── Polling coordinator ──
//
// Runs the poll cycle against a MooxClient: fan out the three data
// fetches, classify what failed, consult the grace policy, and publish
// a wholesale-replaced snapshot. Event import runs on its own timer and
// is deliberately decoupled from the failure policy -- it is
// best-effort by contract.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use moox_api::{MooxClient, TransportConfig};

use crate::config::{MIN_POLL_INTERVAL, TrackerConfig};
use crate::error::CoreError;
use crate::events::{EventNotification, event_display_name};
use crate::grace::{FailureKind, GraceDecision, GracePolicy};
use crate::model::Snapshot;
use crate::persist::StateStore;
use crate::snapshot::build_snapshot;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Outcome of the most recent poll cycle, observable by consumers.
///
/// An escalated status is per-cycle: the next scheduled poll starts
/// fresh and may return to `Fresh` or `Stale`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorStatus {
    /// No poll has run yet.
    Idle,
    /// The last poll rebuilt the snapshot.
    Fresh,
    /// The last poll failed inside the grace window; the previous
    /// snapshot is being served unchanged.
    Stale,
    /// Credentials are rejected or were never verified -- user action
    /// required.
    AuthRequired { message: String },
    /// The last poll failed past the grace window or hit a fatal API
    /// error; the next cycle retries.
    UpdateFailed { message: String },
}

/// Build a `MooxClient` from tracker configuration.
pub fn build_client(config: &TrackerConfig) -> Result<MooxClient, CoreError> {
    let transport = TransportConfig {
        ssl: config.ssl,
        verify_ssl: config.verify_ssl,
        ..TransportConfig::default()
    };
    MooxClient::new(
        &config.host,
        config.port,
        config.email.clone(),
        config.password.clone(),
        &transport,
    )
    .map_err(|e| CoreError::Config {
        message: e.to_string(),
    })
}

/// Coordinates polling, failure damping, and event import for one
/// tracker account.
///
/// Cheaply cloneable via `Arc`. Consumers observe state through watch
/// channels: the snapshot is replaced atomically, so a subscriber sees
/// either the prior complete snapshot or the new complete one, never a
/// partial merge.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    client: MooxClient,
    config: TrackerConfig,
    grace: GracePolicy,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    status_tx: watch::Sender<CoordinatorStatus>,
    event_tx: broadcast::Sender<EventNotification>,
    /// Watermark for event import: advances only when events arrive, so
    /// an empty window is re-fetched next time. Absent on first import.
    last_event_import: Mutex<Option<DateTime<Utc>>>,
    cancel: CancellationToken,
    task_handles: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    /// Create a coordinator, building the HTTP client from `config`.
    pub fn new(config: TrackerConfig, store: Arc<dyn StateStore>) -> Result<Self, CoreError> {
        let client = build_client(&config)?;
        Ok(Self::with_client(client, config, store))
    }

    /// Create a coordinator around an existing client.
    pub fn with_client(
        client: MooxClient,
        mut config: TrackerConfig,
        store: Arc<dyn StateStore>,
    ) -> Self {
        if config.poll_interval < MIN_POLL_INTERVAL {
            warn!(
                configured_secs = config.poll_interval.as_secs(),
                floor_secs = MIN_POLL_INTERVAL.as_secs(),
                "poll interval below minimum -- clamping"
            );
            config.poll_interval = MIN_POLL_INTERVAL;
        }

        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::new()));
        let (status_tx, _) = watch::channel(CoordinatorStatus::Idle);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Self {
            inner: Arc::new(CoordinatorInner {
                client,
                config,
                grace: GracePolicy::new(store),
                snapshot_tx,
                status_tx,
                event_tx,
                last_event_import: Mutex::new(None),
                cancel: CancellationToken::new(),
                task_handles: AsyncMutex::new(Vec::new()),
            }),
        }
    }

    // ── Observability ────────────────────────────────────────────────

    /// The underlying API client.
    pub fn client(&self) -> &MooxClient {
        &self.inner.client
    }

    /// Effective poll interval after clamping.
    pub fn poll_interval(&self) -> Duration {
        self.inner.config.poll_interval
    }

    /// The current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshot replacements.
    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.snapshot_tx.subscribe()
    }

    /// The most recent poll outcome.
    pub fn status(&self) -> CoordinatorStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Subscribe to poll outcome changes.
    pub fn subscribe_status(&self) -> watch::Receiver<CoordinatorStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Subscribe to imported event notifications.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventNotification> {
        self.inner.event_tx.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Run an initial poll, then spawn the background poll and event
    /// import tasks.
    ///
    /// The initial poll propagates escalations so a misconfigured or
    /// credential-less setup fails fast instead of silently looping.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.poll_once().await?;

        let mut handles = self.inner.task_handles.lock().await;
        let cancel = self.inner.cancel.clone();
        handles.push(tokio::spawn(poll_task(
            self.clone(),
            self.inner.config.poll_interval,
            cancel.clone(),
        )));
        if self.inner.config.event_types.is_empty() {
            debug!("no event types subscribed -- event import disabled");
        } else {
            handles.push(tokio::spawn(event_import_task(
                self.clone(),
                self.inner.config.event_import_interval,
                cancel,
            )));
        }
        Ok(())
    }

    /// Cancel background tasks and wait for them to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("coordinator shut down");
    }

    // ── Poll cycle ───────────────────────────────────────────────────

    /// Run one poll cycle and publish the outcome.
    ///
    /// Returns the snapshot now being served (fresh or stale). An
    /// escalation is returned as an error after the status channel has
    /// been updated; it does not stop subsequent cycles.
    pub async fn poll_once(&self) -> Result<Arc<Snapshot>, CoreError> {
        match self.poll_cycle().await {
            Ok(Some(snapshot)) => {
                let snapshot = Arc::new(snapshot);
                info!(devices = snapshot.len(), "snapshot rebuilt");
                self.inner.snapshot_tx.send_replace(Arc::clone(&snapshot));
                self.inner.status_tx.send_replace(CoordinatorStatus::Fresh);
                Ok(snapshot)
            }
            Ok(None) => {
                self.inner.status_tx.send_replace(CoordinatorStatus::Stale);
                Ok(self.snapshot())
            }
            Err(err) => {
                let status = match &err {
                    CoreError::AuthenticationRequired { message } => {
                        CoordinatorStatus::AuthRequired {
                            message: message.clone(),
                        }
                    }
                    other => CoordinatorStatus::UpdateFailed {
                        message: other.to_string(),
                    },
                };
                warn!(status = ?status, "poll cycle escalated");
                self.inner.status_tx.send_replace(status);
                Err(err)
            }
        }
    }

    /// Fetch, classify, and merge. `Ok(None)` means "serve the previous
    /// snapshot unchanged" (degraded poll inside the grace window).
    async fn poll_cycle(&self) -> Result<Option<Snapshot>, CoreError> {
        let (devices_res, positions_res, geofences_res) = tokio::join!(
            self.inner.client.get_devices(),
            self.inner.client.get_positions(),
            self.inner.client.get_geofences(),
        );

        let mut worst: Option<FailureKind> = None;
        let mut fatal: Option<String> = None;

        let devices = collect("devices", devices_res, &mut worst, &mut fatal);
        let positions = collect("positions", positions_res, &mut worst, &mut fatal);
        let geofences = match geofences_res {
            Ok(list) => list,
            Err(err) => {
                let kind = classify(&err);
                if kind == FailureKind::Api {
                    // Geofences are enrichment: a fatal fetch error here
                    // degrades to "no geofences" instead of failing the cycle.
                    debug!(error = %err, "geofence fetch failed -- continuing without");
                } else {
                    worst = worst.max(Some(kind));
                }
                Vec::new()
            }
        };

        if let Some(kind) = worst {
            let ever_authenticated = self.inner.client.ever_authenticated();
            return match self.inner.grace.evaluate(kind, ever_authenticated) {
                GraceDecision::ServeStale => {
                    debug!(?kind, "degraded poll -- serving previous snapshot");
                    Ok(None)
                }
                GraceDecision::Escalate => Err(escalation_error(kind, ever_authenticated)),
            };
        }

        if let Some(message) = fatal {
            return Err(CoreError::UpdateFailed { message });
        }

        self.inner.grace.on_success();
        Ok(Some(build_snapshot(
            &devices,
            &positions,
            &geofences,
            &self.inner.config,
        )))
    }

    // ── Event import ─────────────────────────────────────────────────

    /// Import remote events since the watermark and broadcast them.
    ///
    /// Best-effort and decoupled from the poll cycle's failure policy:
    /// failures are swallowed, nothing escalates, and the watermark only
    /// advances when events actually arrive.
    pub async fn import_events(&self) {
        if self.inner.config.event_types.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return;
        }

        let end = Utc::now();
        let start = *self
            .inner
            .last_event_import
            .lock()
            .expect("event watermark lock poisoned");

        let mut device_ids: Vec<i64> = snapshot.keys().copied().collect();
        device_ids.sort_unstable();

        let Ok(events) = self
            .inner
            .client
            .get_reports_events(&device_ids, start, end, &self.inner.config.event_types)
            .await
        else {
            return;
        };
        if events.is_empty() {
            return;
        }

        *self
            .inner
            .last_event_import
            .lock()
            .expect("event watermark lock poisoned") = Some(end);

        for event in events {
            let Some(device_id) = event.device_id else {
                continue;
            };
            if event.event_type.is_empty() {
                continue;
            }
            let Some(entry) = snapshot.get(&device_id) else {
                continue;
            };

            let notification = EventNotification {
                device_id,
                device_name: Some(entry.device.name.clone()).filter(|n| !n.is_empty()),
                event_name: event_display_name(&event.event_type),
                raw_type: event.event_type,
                server_time: event.event_time,
                attributes: event.attributes,
            };
            debug!(device_id, event = %notification.event_name, "event imported");
            let _ = self.inner.event_tx.send(notification);
        }
    }
}

// ── Failure classification ───────────────────────────────────────────

fn classify(error: &moox_api::Error) -> FailureKind {
    match error {
        moox_api::Error::Authentication { .. } => FailureKind::Authentication,
        moox_api::Error::SessionExpired => FailureKind::SessionExpired,
        moox_api::Error::Connection { .. } => FailureKind::Connection,
        _ => FailureKind::Api,
    }
}

/// Record a fetch result, folding graced failures into `worst` and
/// fatal ones into `fatal` (first wins).
fn collect<T>(
    what: &str,
    result: Result<Vec<T>, moox_api::Error>,
    worst: &mut Option<FailureKind>,
    fatal: &mut Option<String>,
) -> Vec<T> {
    match result {
        Ok(list) => list,
        Err(err) => {
            let kind = classify(&err);
            if kind == FailureKind::Api {
                if fatal.is_none() {
                    *fatal = Some(format!("error fetching {what}: {err}"));
                }
            } else {
                debug!(error = %err, what, "fetch failed");
                *worst = (*worst).max(Some(kind));
            }
            Vec::new()
        }
    }
}

/// Map an escalated failure onto the caller-facing signal: credential
/// trouble (or a never-verified account) asks for credentials, a
/// sustained outage on a known-good account reports an update failure.
fn escalation_error(kind: FailureKind, ever_authenticated: bool) -> CoreError {
    match kind {
        FailureKind::Connection if ever_authenticated => CoreError::UpdateFailed {
            message: "server unreachable past the grace period".into(),
        },
        FailureKind::Connection => CoreError::AuthenticationRequired {
            message: "server unreachable and credentials were never verified".into(),
        },
        FailureKind::SessionExpired => CoreError::AuthenticationRequired {
            message: "session could not be re-established".into(),
        },
        FailureKind::Authentication => CoreError::AuthenticationRequired {
            message: "credentials rejected by the server".into(),
        },
        FailureKind::Api => CoreError::UpdateFailed {
            message: "API failure".into(),
        },
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn poll_task(coordinator: Coordinator, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                // Escalations are already published on the status
                // channel; the loop itself keeps going.
                let _ = coordinator.poll_once().await;
            }
        }
    }
}

async fn event_import_task(coordinator: Coordinator, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                coordinator.import_events().await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::persist::MemoryStateStore;
    use secrecy::SecretString;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{method, path, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &Url) -> TrackerConfig {
        TrackerConfig {
            host: url.host_str().unwrap().to_owned(),
            port: url.port().unwrap(),
            ssl: false,
            email: "fleet@example.com".into(),
            password: SecretString::from("pw".to_owned()),
            ..TrackerConfig::default()
        }
    }

    fn coordinator_for(server: &MockServer, config: impl FnOnce(&Url) -> TrackerConfig) -> Coordinator {
        let url = Url::parse(&server.uri()).unwrap();
        let config = config(&url);
        let store = Arc::new(MemoryStateStore::new());
        Coordinator::new(config, store).unwrap()
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(server)
            .await;
    }

    async fn mount_collections(
        server: &MockServer,
        devices: serde_json::Value,
        positions: serde_json::Value,
        geofences: serde_json::Value,
    ) {
        for (endpoint, body) in [
            ("devices", devices),
            ("positions", positions),
            ("geofences", geofences),
        ] {
            Mock::given(method("GET"))
                .and(path(format!("/api/{endpoint}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(server)
                .await;
        }
    }

    #[test]
    fn poll_interval_is_clamped_to_the_floor() {
        let config = TrackerConfig {
            poll_interval: Duration::from_secs(5),
            ..TrackerConfig::default()
        };
        let client = build_client(&config).unwrap();
        let coordinator =
            Coordinator::with_client(client, config, Arc::new(MemoryStateStore::new()));
        assert_eq!(coordinator.poll_interval(), MIN_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn successful_poll_publishes_a_fresh_snapshot() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        mount_collections(
            &server,
            json!([{"id": 1, "name": "Van", "status": "online"}, {"id": 2, "name": "Car"}]),
            json!([{"deviceId": 1, "latitude": 45.0, "longitude": 9.0, "accuracy": 10.0}]),
            json!([]),
        )
        .await;

        let coordinator = coordinator_for(&server, test_config);
        let snapshot = coordinator.poll_once().await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot[&1].position.is_some());
        assert!(snapshot[&2].position.is_none());
        assert_eq!(coordinator.status(), CoordinatorStatus::Fresh);
    }

    #[tokio::test]
    async fn credential_failure_escalates_on_the_first_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/session"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": "ERROR_004", "message": "bad password"})),
            )
            .mount(&server)
            .await;

        let coordinator = coordinator_for(&server, test_config);
        let result = coordinator.poll_once().await;

        assert!(
            matches!(result, Err(CoreError::AuthenticationRequired { .. })),
            "expected AuthenticationRequired, got: {result:?}"
        );
        assert!(matches!(
            coordinator.status(),
            CoordinatorStatus::AuthRequired { .. }
        ));
    }

    #[tokio::test]
    async fn degraded_poll_serves_the_previous_snapshot() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        // First cycle succeeds, then the data endpoints start failing.
        for endpoint in ["devices", "positions", "geofences"] {
            Mock::given(method("GET"))
                .and(path(format!("/api/{endpoint}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(
                    if endpoint == "devices" {
                        json!([{"id": 1, "name": "Van"}])
                    } else {
                        json!([])
                    },
                ))
                .up_to_n_times(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path(format!("/api/{endpoint}")))
                .respond_with(ResponseTemplate::new(503))
                .mount(&server)
                .await;
        }

        let coordinator = coordinator_for(&server, test_config);
        let first = coordinator.poll_once().await.unwrap();
        assert_eq!(first.len(), 1);

        // The outage starts; grace keeps the old snapshot in service.
        let second = coordinator.poll_once().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(coordinator.status(), CoordinatorStatus::Stale);
    }

    #[tokio::test]
    async fn geofence_api_errors_degrade_without_failing_the_cycle() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        for (endpoint, body) in [
            ("devices", json!([{"id": 1, "name": "Van"}])),
            ("positions", json!([{"deviceId": 1, "latitude": 45.0, "longitude": 9.0}])),
        ] {
            Mock::given(method("GET"))
                .and(path(format!("/api/{endpoint}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/api/geofences"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let coordinator = coordinator_for(&server, test_config);
        let snapshot = coordinator.poll_once().await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[&1].geofence.is_none());
        assert_eq!(coordinator.status(), CoordinatorStatus::Fresh);
    }

    #[tokio::test]
    async fn fatal_device_fetch_error_escalates_immediately() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/devices"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;
        for endpoint in ["positions", "geofences"] {
            Mock::given(method("GET"))
                .and(path(format!("/api/{endpoint}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
                .mount(&server)
                .await;
        }

        let coordinator = coordinator_for(&server, test_config);
        let result = coordinator.poll_once().await;

        assert!(
            matches!(result, Err(CoreError::UpdateFailed { .. })),
            "expected UpdateFailed, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn events_are_imported_translated_and_broadcast() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        mount_collections(
            &server,
            json!([{"id": 7, "name": "Van"}]),
            json!([{"deviceId": 7, "latitude": 45.0, "longitude": 9.0}]),
            json!([]),
        )
        .await;
        // First import carries no lower bound.
        Mock::given(method("GET"))
            .and(path("/api/reports/events"))
            .and(query_param_is_missing("from"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "deviceId": 7,
                    "type": "geofenceEnter",
                    "eventTime": "2026-07-01T10:00:00.000+00:00",
                    "attributes": {"geofenceId": 5},
                },
                // Unknown device ids are dropped.
                {"deviceId": 99, "type": "alarm"},
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let coordinator = coordinator_for(&server, |url| TrackerConfig {
            event_types: vec!["geofenceEnter".into(), "alarm".into()],
            ..test_config(url)
        });
        let mut events = coordinator.subscribe_events();

        coordinator.poll_once().await.unwrap();
        coordinator.import_events().await;

        let notification = events.recv().await.unwrap();
        assert_eq!(notification.device_id, 7);
        assert_eq!(notification.device_name.as_deref(), Some("Van"));
        assert_eq!(notification.event_name, "geofence_enter");
        assert_eq!(notification.raw_type, "geofenceEnter");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn event_import_is_a_noop_without_subscriptions_or_data() {
        let server = MockServer::start().await;
        // No mocks mounted: the import must return before any request.
        let coordinator = coordinator_for(&server, |url| TrackerConfig {
            event_types: vec!["alarm".into()],
            ..test_config(url)
        });
        let mut events = coordinator.subscribe_events();

        // Snapshot is empty -- nothing to import.
        coordinator.import_events().await;
        assert!(events.try_recv().is_err());
    }
}
