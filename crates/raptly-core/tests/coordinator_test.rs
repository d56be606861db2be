#![allow(clippy::unwrap_used)]
// Integration tests for `Coordinator`, driven through a real `RaptClient`
// pointed at a wiremock server (zero rate gap, so suites stay fast).

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use raptly_core::{Coordinator, CoreError, DeviceCategory, DeviceRecord, RaptClient};

// ── Helpers ─────────────────────────────────────────────────────────

fn client_for(server: &MockServer) -> RaptClient {
    let token_url = Url::parse(&format!("{}/connect/token", server.uri())).unwrap();
    let base_url = Url::parse(&format!("{}/api", server.uri())).unwrap();
    let secret: SecretString = "super-secret".to_string().into();
    RaptClient::with_client(reqwest::Client::new(), token_url, base_url, "brewer", secret)
        .with_min_request_gap(Duration::ZERO)
}

/// Coordinator with a zero update interval: no background task, every
/// poll is explicit.
async fn setup() -> (MockServer, Coordinator) {
    let server = MockServer::start().await;
    let coordinator = Coordinator::with_client(client_for(&server), Duration::ZERO);
    mount_token_endpoint(&server).await;
    (server, coordinator)
}

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

fn category_path(category: DeviceCategory) -> String {
    format!("/api{}", category.endpoint_path())
}

/// Mount one full pass over the four endpoints. With `once` set, each
/// endpoint answers a single time and then falls through to whatever is
/// mounted after it.
async fn mount_pass(server: &MockServer, bodies: [Value; 4], once: bool) {
    for (category, body) in DeviceCategory::ALL.into_iter().zip(bodies) {
        let mock = Mock::given(method("GET"))
            .and(path(category_path(category)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body));
        let mock = if once { mock.up_to_n_times(1) } else { mock };
        mock.mount(server).await;
    }
}

/// Register a callback that appends every delivery to a shared log.
async fn record_discoveries(coordinator: &Coordinator) -> Arc<Mutex<Vec<Vec<DeviceRecord>>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    coordinator
        .register_discovery_callback(move |devices| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().await.push(devices);
            }
        })
        .await;
    log
}

fn ids(records: &[DeviceRecord]) -> Vec<&str> {
    records.iter().filter_map(DeviceRecord::id).collect()
}

// ── Refresh tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_replaces_the_snapshot() {
    let (server, coordinator) = setup().await;
    mount_pass(
        &server,
        [
            json!([{"id": "c1", "name": "Ferm fridge"}]),
            json!([{"id": "h1"}, {"id": "h2"}]),
            json!([]),
            json!([]),
        ],
        false,
    )
    .await;

    assert!(coordinator.snapshot().is_none());
    assert!(!coordinator.last_update_success());
    assert!(coordinator.data_age().is_none());

    let snapshot = coordinator.refresh().await.unwrap();

    assert_eq!(ids(&snapshot.devices), ["c1", "h1", "h2"]);
    assert_eq!(snapshot.category(DeviceCategory::Hydrometer).len(), 2);
    assert_eq!(snapshot.device("c1").unwrap().name(), Some("Ferm fridge"));
    assert!(coordinator.last_update_success());
    assert!(coordinator.data_age().unwrap() < chrono::Duration::seconds(5));
    assert_eq!(
        coordinator.snapshot().unwrap().observed_at,
        snapshot.observed_at
    );
}

#[tokio::test]
async fn test_scheduled_refresh_tracks_devices_without_firing_discovery() {
    let (server, coordinator) = setup().await;
    mount_pass(
        &server,
        [json!([{"id": "a"}]), json!([{"id": "b"}]), json!([]), json!([])],
        false,
    )
    .await;
    let discoveries = record_discoveries(&coordinator).await;

    // Two polls over the same device set.
    coordinator.refresh().await.unwrap();
    coordinator.refresh().await.unwrap();

    assert_eq!(coordinator.known_device_ids().await, ["a", "b"]);
    assert!(discoveries.lock().await.is_empty());

    // Every returned device is already known, so a manual discovery over
    // the same set stays silent too.
    coordinator.discover_devices().await;
    assert!(discoveries.lock().await.is_empty());
}

#[tokio::test]
async fn test_failed_poll_keeps_the_previous_snapshot() {
    let (server, coordinator) = setup().await;
    mount_pass(&server, [json!([{"id": "a"}]), json!([]), json!([]), json!([])], true).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let first = coordinator.refresh().await.unwrap();

    let result = coordinator.refresh().await;
    match result {
        Err(CoreError::UpdateFailed(_)) => {}
        other => panic!("expected UpdateFailed, got: {other:?}"),
    }
    let err = coordinator.refresh().await.unwrap_err();
    assert!(err.is_transient());

    // Stale snapshot retained wholesale, health flag lowered.
    let current = coordinator.snapshot().unwrap();
    assert_eq!(current.observed_at, first.observed_at);
    assert_eq!(ids(&current.devices), ["a"]);
    assert!(!coordinator.last_update_success());
}

// ── Discovery tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_discovery_fires_once_with_only_the_new_devices() {
    let (server, coordinator) = setup().await;
    // First pass: {a, b}. Afterwards the cloud reports an extra hydrometer.
    mount_pass(
        &server,
        [json!([{"id": "a"}]), json!([{"id": "b"}]), json!([]), json!([])],
        true,
    )
    .await;
    mount_pass(
        &server,
        [
            json!([{"id": "a"}]),
            json!([{"id": "b"}, {"id": "c", "name": "New Pill"}]),
            json!([]),
            json!([]),
        ],
        false,
    )
    .await;
    let discoveries = record_discoveries(&coordinator).await;

    coordinator.refresh().await.unwrap();
    coordinator.discover_devices().await;

    let deliveries = discoveries.lock().await;
    assert_eq!(deliveries.len(), 1, "callback must fire exactly once");
    assert_eq!(ids(&deliveries[0]), ["c"]);
    assert_eq!(deliveries[0][0].name(), Some("New Pill"));
    drop(deliveries);

    assert_eq!(coordinator.known_device_ids().await, ["a", "b", "c"]);

    // The trailing refresh ran: the snapshot already includes the newcomer.
    let snapshot = coordinator.snapshot().unwrap();
    assert_eq!(ids(&snapshot.devices), ["a", "b", "c"]);
}

#[tokio::test]
async fn test_discovery_callbacks_run_in_registration_order() {
    let (server, coordinator) = setup().await;
    mount_pass(&server, [json!([{"id": "a"}]), json!([]), json!([]), json!([])], false).await;

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second"] {
        let sink = Arc::clone(&order);
        coordinator
            .register_discovery_callback(move |_devices| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().await.push(tag);
                }
            })
            .await;
    }

    coordinator.discover_devices().await;

    assert_eq!(*order.lock().await, ["first", "second"]);
}

#[tokio::test]
async fn test_handlers_may_call_back_into_the_coordinator() {
    let (server, coordinator) = setup().await;
    mount_pass(&server, [json!([{"id": "a"}]), json!([]), json!([]), json!([])], false).await;

    // A handler that registers another handler mid-event must not hang on
    // the coordinator's internal state.
    let reentrant = coordinator.clone();
    coordinator
        .register_discovery_callback(move |_devices| {
            let reentrant = reentrant.clone();
            async move {
                reentrant
                    .register_discovery_callback(|_devices| async {})
                    .await;
            }
        })
        .await;

    tokio::time::timeout(Duration::from_secs(5), coordinator.discover_devices())
        .await
        .expect("discovery event blocked a handler calling back into the coordinator");

    assert_eq!(coordinator.known_device_ids().await, ["a"]);
}

#[tokio::test]
async fn test_records_without_id_never_trigger_discovery() {
    let (server, coordinator) = setup().await;
    mount_pass(
        &server,
        [
            json!([{"name": "unregistered", "temperature": 19.0}, {"id": "c1"}]),
            json!([]),
            json!([]),
            json!([]),
        ],
        false,
    )
    .await;
    let discoveries = record_discoveries(&coordinator).await;

    coordinator.discover_devices().await;

    // Only the id-bearing record is discoverable or tracked...
    {
        let deliveries = discoveries.lock().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(ids(&deliveries[0]), ["c1"]);
    }
    assert_eq!(coordinator.known_device_ids().await, ["c1"]);

    // ...but the anonymous record still appears in the snapshot.
    let snapshot = coordinator.snapshot().unwrap();
    assert_eq!(snapshot.devices.len(), 2);
    assert_eq!(snapshot.devices[0].name(), Some("unregistered"));

    // Lacking an identifier, it can never be "seen": a second discovery
    // still treats it as nothing new.
    coordinator.discover_devices().await;
    assert_eq!(discoveries.lock().await.len(), 1);
}

#[tokio::test]
async fn test_discovery_swallows_fetch_errors() {
    let server = MockServer::start().await;
    let coordinator = Coordinator::with_client(client_for(&server), Duration::ZERO);
    mount_token_endpoint(&server).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    let discoveries = record_discoveries(&coordinator).await;

    // Best-effort path: no panic, no error, no event.
    coordinator.discover_devices().await;

    assert!(discoveries.lock().await.is_empty());
    assert!(coordinator.snapshot().is_none());
    assert!(coordinator.known_device_ids().await.is_empty());
}

// ── Lifecycle tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_start_polls_immediately_and_then_on_the_interval() {
    let server = MockServer::start().await;
    let coordinator =
        Coordinator::with_client(client_for(&server), Duration::from_millis(100));
    mount_token_endpoint(&server).await;
    mount_pass(&server, [json!([{"id": "a"}]), json!([]), json!([]), json!([])], false).await;

    coordinator.start().await.unwrap();

    // The initial refresh completed before start() returned.
    assert_eq!(ids(&coordinator.snapshot().unwrap().devices), ["a"]);

    // The background task replaces the snapshot on its own cadence.
    let mut updates = coordinator.subscribe();
    tokio::time::timeout(Duration::from_secs(5), updates.changed())
        .await
        .expect("no scheduled refresh within 5s")
        .unwrap();

    coordinator.shutdown().await;
    coordinator.shutdown().await; // idempotent

    // A joined task issues no further requests.
    let before = server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let after = server.received_requests().await.unwrap().len();
    assert_eq!(before, after, "background task still polling after shutdown");
}

#[tokio::test]
async fn test_start_propagates_the_initial_refresh_error() {
    let server = MockServer::start().await;
    let coordinator =
        Coordinator::with_client(client_for(&server), Duration::from_millis(100));
    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
        .mount(&server)
        .await;

    let err = coordinator.start().await.unwrap_err();

    assert!(err.is_auth_failure(), "expected auth failure, got: {err:?}");
    assert!(coordinator.snapshot().is_none());

    // No background task was spawned after the failed initial refresh.
    let before = server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let after = server.received_requests().await.unwrap().len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_health_subscription_follows_poll_outcomes() {
    let (server, coordinator) = setup().await;
    mount_pass(&server, [json!([]), json!([]), json!([]), json!([])], true).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let health = coordinator.subscribe_health();
    assert!(!*health.borrow());

    coordinator.refresh().await.unwrap();
    assert!(*health.borrow());

    coordinator.refresh().await.unwrap_err();
    assert!(!*health.borrow());
}
