#![allow(clippy::unwrap_used)]
// Integration tests for `MooxClient` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use moox_api::{Error, MooxClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, MooxClient) {
    let server = MockServer::start().await;
    let url = Url::parse(&server.uri()).unwrap();
    let transport = TransportConfig {
        ssl: false,
        ..TransportConfig::default()
    };
    let client = MooxClient::new(
        url.host_str().unwrap(),
        url.port().unwrap(),
        "fleet@example.com",
        SecretString::from("test-password".to_owned()),
        &transport,
    )
    .unwrap();
    (server, client)
}

fn login_ok() -> Mock {
    Mock::given(method("POST"))
        .and(path("/api/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn login_success_then_devices() {
    let (server, client) = setup().await;

    login_ok().expect(1).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "Van", "status": "online"},
        ])))
        .mount(&server)
        .await;

    let devices = client.get_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "Van");
    assert!(client.ever_authenticated());
}

#[tokio::test]
async fn login_sends_credentials_payload() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/session"))
        .and(body_partial_json(json!({
            "email": "fleet@example.com",
            "password": "test-password",
            "remember_me": "true",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    client.get_devices().await.unwrap();
}

#[tokio::test]
async fn credential_rejection_on_first_login_is_not_retried() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/session"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "ERROR_004",
            "message": "Invalid email or password",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.get_devices().await;
    match result {
        Err(Error::Authentication { message }) => {
            assert_eq!(message, "Invalid email or password");
        }
        other => panic!("expected Authentication error, got: {other:?}"),
    }
    assert!(!client.ever_authenticated());
}

#[tokio::test]
async fn hard_credential_failure_latches_without_further_logins() {
    let (server, client) = setup().await;

    // expect(1): the second call must not reach the server at all.
    Mock::given(method("POST"))
        .and(path("/api/session"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "ERROR_004"})))
        .expect(1)
        .mount(&server)
        .await;

    let first = client.get_devices().await;
    assert!(matches!(first, Err(Error::Authentication { .. })));

    let second = client.get_positions().await;
    assert!(
        matches!(second, Err(Error::Authentication { .. })),
        "expected latched Authentication error, got: {second:?}"
    );
}

#[tokio::test]
async fn concurrent_requests_share_one_login() {
    let (server, client) = setup().await;

    // Delay the login so all three fetches are in flight before it lands.
    Mock::given(method("POST"))
        .and(path("/api/session"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    for endpoint in ["devices", "positions", "geofences"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/{endpoint}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
    }

    let (devices, positions, geofences) = tokio::join!(
        client.get_devices(),
        client.get_positions(),
        client.get_geofences(),
    );
    devices.unwrap();
    positions.unwrap();
    geofences.unwrap();
}

// ── Session expiry ──────────────────────────────────────────────────

#[tokio::test]
async fn expired_session_reauthenticates_and_replays() {
    let (server, client) = setup().await;

    login_ok().expect(2).mount(&server).await;

    // First devices call hits a stale session, second (post-relogin) works.
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "ERROR_004"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 9, "name": "Scooter"},
        ])))
        .mount(&server)
        .await;

    // Prime the session so the 400 counts as expiry, not bad credentials.
    let first = client.get_devices().await.unwrap();
    assert_eq!(first[0].id, 9);
    assert!(client.ever_authenticated());
}

#[tokio::test]
async fn persistent_session_rejection_surfaces_session_expired() {
    let (server, client) = setup().await;

    login_ok().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/positions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "ERROR_004"})))
        .mount(&server)
        .await;

    // Establish the session first via a working endpoint.
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    client.get_devices().await.unwrap();

    let result = client.get_positions().await;
    assert!(
        matches!(result, Err(Error::SessionExpired)),
        "expected SessionExpired, got: {result:?}"
    );
    // The sticky flag survives -- this was session trouble, not a bad password.
    assert!(client.ever_authenticated());
}

// ── Transient and permanent failures ────────────────────────────────

#[tokio::test]
async fn server_errors_are_retried_then_surfaced() {
    let (server, client) = setup().await;

    login_ok().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let result = client.get_devices().await;
    assert!(
        matches!(result, Err(Error::Connection { .. })),
        "expected Connection error, got: {result:?}"
    );
}

#[tokio::test]
async fn plain_bad_request_is_not_retried() {
    let (server, client) = setup().await;

    login_ok().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(400).set_body_string("missing parameter"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.get_devices().await;
    match result {
        Err(Error::Api { status, message }) => {
            assert_eq!(status, Some(400));
            assert!(message.contains("missing parameter"), "got: {message}");
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn non_json_success_body_is_invalid_response() {
    let (server, client) = setup().await;

    login_ok().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let result = client.get_devices().await;
    assert!(
        matches!(result, Err(Error::InvalidResponse { .. })),
        "expected InvalidResponse, got: {result:?}"
    );
}

// ── Event reports ───────────────────────────────────────────────────

#[tokio::test]
async fn event_report_with_no_devices_skips_the_request() {
    let (server, client) = setup().await;

    // No login should even be attempted.
    login_ok().expect(0).mount(&server).await;

    let events = client
        .get_reports_events(&[], None, chrono::Utc::now(), &[])
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn event_report_sends_range_and_type_filter() {
    let (server, client) = setup().await;

    login_ok().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/reports/events"))
        .and(query_param("deviceId", "7"))
        .and(query_param("type", "geofenceEnter,geofenceExit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"deviceId": 7, "type": "geofenceEnter", "eventTime": "2026-07-01T10:00:00.000+00:00"},
        ])))
        .mount(&server)
        .await;

    let events = client
        .get_reports_events(
            &[7],
            None,
            chrono::Utc::now(),
            &["geofenceEnter".to_owned(), "geofenceExit".to_owned()],
        )
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "geofenceEnter");
}

#[tokio::test]
async fn event_report_failures_collapse_to_empty() {
    let (server, client) = setup().await;

    login_ok().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/reports/events"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let events = client
        .get_reports_events(&[1, 2], None, chrono::Utc::now(), &[])
        .await
        .unwrap();
    assert!(events.is_empty());
}
