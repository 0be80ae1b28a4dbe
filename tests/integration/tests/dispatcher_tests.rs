//! Rate limiting and pending request delivery scenarios
//!
//! Run with: cargo test -p integration-tests --test dispatcher_tests

use chat_client::{ClientError, Entity, Lookup, Snowflake};
use chat_rest::HttpResponse;
use integration_tests::{
    channel_payload, rate_limited, test_client, test_client_on, test_client_with, test_config, unique_id, user_payload,
    MockGateway, MockHttp,
};
use tokio::runtime::Handle;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Records every callback invocation
#[derive(Default)]
struct Deliveries {
    successes: Mutex<Vec<Option<Entity>>>,
    errors: Mutex<Vec<String>>,
}

impl Deliveries {
    fn total(&self) -> usize {
        self.successes.lock().len() + self.errors.lock().len()
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// Buckets
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_same_bucket_waits_for_reset() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);
    http.set_latency(Duration::from_millis(50));

    let (first_id, second_id) = (unique_id(), unique_id());
    http.respond(
        HttpResponse::json(200, &user_payload(first_id, "first"))
            .with_header("X-RateLimit-Limit", 1)
            .with_header("X-RateLimit-Remaining", 0)
            .with_header("X-RateLimit-Reset-After", 1),
    );
    http.respond_json(user_payload(second_id, "second"));

    let first = client.lookup_user(Snowflake::new(first_id), Lookup::Rest);
    let second = client.lookup_user(Snowflake::new(second_id), Lookup::Rest);
    let (first, second) = tokio::join!(first.result(), second.result());

    assert_eq!(first.unwrap().unwrap().get_str("username"), Some("first"));
    assert_eq!(second.unwrap().unwrap().get_str("username"), Some("second"));

    let requests = http.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].at - requests[0].at >= Duration::from_secs(1));
    assert_eq!(http.peak_in_flight(), 1);

    let snapshot = client.dispatcher().bucket_snapshot("GET /users/{user_id}").await;
    assert!(snapshot.is_some());
}

#[tokio::test]
async fn test_in_flight_cap_spans_buckets() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let mut config = test_config();
    config.rest.max_in_flight = 2;
    let client = test_client_with(&http, &gateway, config, Handle::current());
    http.set_latency(Duration::from_millis(100));

    let results = tokio::join!(
        client.lookup_user(Snowflake::new(unique_id()), Lookup::Rest).result(),
        client.lookup_guild(Snowflake::new(unique_id()), Lookup::Rest).result(),
        client.lookup_channel(Snowflake::new(unique_id()), Lookup::Rest).result(),
        client.lookup_webhook(Snowflake::new(unique_id()), Lookup::Rest).result(),
        client.lookup_invite(Snowflake::new(unique_id()), Lookup::Rest).result(),
    );

    assert!(results.0.unwrap().is_none());
    assert!(results.4.unwrap().is_none());
    assert_eq!(http.request_count(), 5);
    assert_eq!(http.peak_in_flight(), 2);
}

#[tokio::test]
async fn test_different_buckets_run_in_parallel() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);
    http.set_latency(Duration::from_millis(100));

    let user = client.lookup_user(Snowflake::new(unique_id()), Lookup::Rest);
    let guild = client.lookup_guild(Snowflake::new(unique_id()), Lookup::Rest);
    let (user, guild) = tokio::join!(user.result(), guild.result());

    // Both unscripted: not found
    assert_eq!(user.unwrap(), None);
    assert_eq!(guild.unwrap(), None);
    assert_eq!(http.peak_in_flight(), 2);
}

// ============================================================================
// Exactly-once delivery
// ============================================================================

#[test]
fn test_immediate_result_delivered_once() {
    let rt = runtime();
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client_on(&http, &gateway, rt.handle().clone());
    let deliveries = Arc::new(Deliveries::default());

    let id = unique_id();
    http.respond_json(channel_payload(id, "lobby"));

    let ok = Arc::clone(&deliveries);
    let err = Arc::clone(&deliveries);
    let value = client
        .lookup_channel(Snowflake::new(id), Lookup::Rest)
        .on_success(move |entity| ok.successes.lock().push(entity))
        .on_error(move |e| err.errors.lock().push(e.to_string()))
        .blocking();

    assert_eq!(value.flatten().unwrap().get_str("name"), Some("lobby"));
    assert_eq!(http.request_count(), 1);
    assert_eq!(deliveries.total(), 1);
    assert_eq!(deliveries.successes.lock()[0].as_ref().unwrap().get_str("name"), Some("lobby"));
}

#[test]
fn test_rate_limited_then_success_delivered_once() {
    let rt = runtime();
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client_on(&http, &gateway, rt.handle().clone());
    let deliveries = Arc::new(Deliveries::default());

    let id = unique_id();
    http.respond(rate_limited(20));
    http.respond_json(user_payload(id, "patient"));

    let ok = Arc::clone(&deliveries);
    let err = Arc::clone(&deliveries);
    let value = client
        .lookup_user(Snowflake::new(id), Lookup::Rest)
        .on_success(move |entity| ok.successes.lock().push(entity))
        .on_error(move |e| err.errors.lock().push(e.to_string()))
        .blocking();

    assert_eq!(value.flatten().unwrap().get_str("username"), Some("patient"));
    assert_eq!(http.request_count(), 2);
    assert_eq!(deliveries.total(), 1);
    assert_eq!(deliveries.successes.lock().len(), 1);
}

#[test]
fn test_rate_limit_exhaustion_delivered_once() {
    let rt = runtime();
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client_on(&http, &gateway, rt.handle().clone());
    let deliveries = Arc::new(Deliveries::default());

    for _ in 0..5 {
        http.respond(rate_limited(10));
    }

    let ok = Arc::clone(&deliveries);
    let err = Arc::clone(&deliveries);
    let value = client
        .lookup_user(Snowflake::new(unique_id()), Lookup::Rest)
        .on_success(move |entity| ok.successes.lock().push(entity))
        .on_error(move |e| err.errors.lock().push(e.error_code().to_string()))
        .blocking();

    assert!(value.is_none());
    // First attempt plus two requeues
    assert_eq!(http.request_count(), 3);
    assert_eq!(deliveries.total(), 1);
    assert_eq!(deliveries.errors.lock().len(), 1);
}

#[tokio::test]
async fn test_spawned_request_runs_one_callback() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);
    let deliveries = Arc::new(Deliveries::default());

    http.respond(HttpResponse::json(500, &serde_json::json!({"message": "boom"})));
    http.respond(HttpResponse::json(500, &serde_json::json!({"message": "boom"})));
    http.respond(HttpResponse::json(500, &serde_json::json!({"message": "boom"})));

    let ok = Arc::clone(&deliveries);
    let err = Arc::clone(&deliveries);
    client
        .lookup_user(Snowflake::new(unique_id()), Lookup::Rest)
        .on_success(move |entity| ok.successes.lock().push(entity))
        .on_error(move |e| err.errors.lock().push(e.error_code().to_string()))
        .spawn()
        .await
        .unwrap();

    assert_eq!(deliveries.total(), 1);
    assert_eq!(http.request_count(), 3);
}

#[tokio::test]
async fn test_close_cancels_pending_requests() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);

    client.close().await.unwrap();
    let result = client.lookup_user(Snowflake::new(unique_id()), Lookup::Rest).await;

    assert!(matches!(result, Err(ClientError::Cancelled)));
    assert_eq!(http.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_requests_queued_on_exhausted_bucket() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);

    let id = unique_id();
    http.respond(
        HttpResponse::json(200, &user_payload(id, "first"))
            .with_header("X-RateLimit-Limit", 1)
            .with_header("X-RateLimit-Remaining", 0)
            .with_header("X-RateLimit-Reset-After", 60),
    );
    let first = client.lookup_user(Snowflake::new(id), Lookup::Rest).await.unwrap();
    assert!(first.is_some());

    // One waits for the bucket reset, the other for the bucket itself
    let waiting = client.lookup_user(Snowflake::new(unique_id()), Lookup::Rest);
    let queued = client.lookup_user(Snowflake::new(unique_id()), Lookup::Rest);
    let waiting = tokio::spawn(async move { waiting.await });
    let queued = tokio::spawn(async move { queued.await });
    tokio::time::sleep(Duration::from_secs(1)).await;

    client.close().await.unwrap();

    assert!(matches!(waiting.await.unwrap(), Err(ClientError::Cancelled)));
    assert!(matches!(queued.await.unwrap(), Err(ClientError::Cancelled)));
    assert_eq!(http.request_count(), 1);
}
