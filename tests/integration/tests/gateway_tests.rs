//! Gateway session scenarios
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use chat_client::{handler_fn, ClientError, EntityRef, Lookup, SessionState, Snowflake};
use chat_gateway::connection::Outbound;
use chat_gateway::protocol::GatewayMessage;
use integration_tests::{channel_payload, test_client, unique_id, MockGateway, MockHttp, TransitionLog};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_connects_with_versioned_url_and_identifies() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(1);
    let client = test_client(&http, &gateway);
    let mut log = TransitionLog::new(client.gateway());

    client.open().unwrap();
    let identify = peers[0].handshake("session-a").await;
    log.wait_for(SessionState::Connected).await;

    assert_eq!(gateway.urls(), vec!["wss://gateway.test?v=6&encoding=json".to_string()]);
    assert_eq!(identify["d"]["token"], "test-token");
    assert_eq!(identify["d"]["shard"], serde_json::json!([0, 1]));
    assert_eq!(
        log.states(),
        vec![
            SessionState::Connecting,
            SessionState::AwaitingHello,
            SessionState::Identifying,
            SessionState::Connected,
        ]
    );
    assert_eq!(client.gateway().session_id().as_deref(), Some("session-a"));

    client.close().await.unwrap();
    assert_eq!(client.gateway().state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_events_update_cache_before_handlers() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(1);
    let client = test_client(&http, &gateway);
    let mut log = TransitionLog::new(client.gateway());

    let channel_id = unique_id();
    let cache = Arc::clone(client.cache());
    let seen_in_cache = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&seen_in_cache);
    client.add_handler(handler_fn(move |event| {
        if event.name == "CHANNEL_CREATE"
            && cache.contains(&EntityRef::channel(Snowflake::new(channel_id)))
        {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    }));

    client.open().unwrap();
    peers[0].handshake("s").await;
    log.wait_for(SessionState::Connected).await;
    peers[0].dispatch("CHANNEL_CREATE", 2, channel_payload(channel_id, "general")).await;

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while seen_in_cache.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("handler saw the cached channel");

    let cached = client
        .lookup_channel(Snowflake::new(channel_id), Lookup::Cache)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.get_str("name"), Some("general"));
    assert_eq!(http.request_count(), 0);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_sequence_is_dropped() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(1);
    let client = test_client(&http, &gateway);
    let mut log = TransitionLog::new(client.gateway());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    client.add_handler(handler_fn(move |_event| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    client.open().unwrap();
    peers[0].handshake("s").await;
    log.wait_for(SessionState::Connected).await;

    let channel_id = unique_id();
    peers[0].dispatch("CHANNEL_CREATE", 2, channel_payload(channel_id, "first")).await;
    peers[0].dispatch("CHANNEL_UPDATE", 2, channel_payload(channel_id, "replayed")).await;
    peers[0].dispatch("TYPING_START", 3, serde_json::json!({"channel_id": channel_id.to_string()})).await;

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while calls.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("three events handled");

    // READY, CHANNEL_CREATE and TYPING_START; the replay never reached handlers
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(client.gateway().sequence(), Some(3));
    let channel = client.cache().get_entity(&EntityRef::channel(Snowflake::new(channel_id))).unwrap();
    assert_eq!(channel.get_str("name"), Some("first"));
    assert_eq!(client.gateway().state(), SessionState::Connected);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_session_timeout_reidentifies_without_resuming() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(2);
    let client = test_client(&http, &gateway);
    let mut log = TransitionLog::new(client.gateway());

    client.open().unwrap();
    peers[0].handshake("expired").await;
    log.wait_for(SessionState::Connected).await;
    log.reset();

    peers[0].close(Some(4009)).await;
    peers[1].hello(45_000).await;
    let frame = peers[1].next_json().await;
    assert_eq!(frame["op"], 2);
    log.wait_for(SessionState::Identifying).await;

    assert_eq!(
        log.states(),
        vec![SessionState::Connecting, SessionState::AwaitingHello, SessionState::Identifying]
    );
    assert_eq!(client.gateway().session_id(), None);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_abnormal_close_resumes_session() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(2);
    let client = test_client(&http, &gateway);
    let mut log = TransitionLog::new(client.gateway());

    client.open().unwrap();
    peers[0].handshake("keep-me").await;
    peers[0].dispatch("TYPING_START", 2, serde_json::json!({"channel_id": "5"})).await;
    log.wait_for(SessionState::Connected).await;
    log.reset();

    peers[0].close(Some(1006)).await;
    peers[1].hello(45_000).await;
    let resume = peers[1].next_json().await;
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["session_id"], "keep-me");
    assert_eq!(resume["d"]["seq"], 2);
    assert_eq!(client.gateway().state(), SessionState::Resuming);

    peers[1].dispatch("RESUMED", 3, serde_json::json!({})).await;
    log.wait_for(SessionState::Connected).await;
    assert_eq!(log.states(), vec![SessionState::Resuming, SessionState::Connected]);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_authentication_failure_stops_session() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(2);
    let client = test_client(&http, &gateway);

    client.open().unwrap();
    peers[0].hello(45_000).await;
    assert_eq!(peers[0].next_json().await["op"], 2);
    peers[0].close(Some(4004)).await;

    let error = client.wait().await.unwrap_err();
    assert!(error.is_fatal());
    assert_eq!(client.gateway().state(), SessionState::Disconnected);
    assert_eq!(gateway.urls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missed_heartbeat_ack_closes_and_resumes() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(2);
    let client = test_client(&http, &gateway);

    client.open().unwrap();
    peers[0].hello(1_000).await;
    assert_eq!(peers[0].next_json().await["op"], 2);
    peers[0].ready("zombie", 1).await;

    // Heartbeats go unanswered
    let close = peers[0].next().await;
    assert_eq!(close, Outbound::Close(4000));

    peers[1].hello(1_000).await;
    let resume = peers[1].next_json().await;
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["session_id"], "zombie");
    client.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_acked_heartbeats_keep_connection() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(1);
    let client = test_client(&http, &gateway);

    client.open().unwrap();
    peers[0].hello(1_000).await;
    assert_eq!(peers[0].next_json().await["op"], 2);
    peers[0].ready("healthy", 1).await;

    for _ in 0..3 {
        let beat = peers[0].next_raw().await;
        let Outbound::Text(text) = beat else {
            panic!("expected heartbeat, got {beat:?}");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["op"], 1);
        assert_eq!(value["d"], 1);
        peers[0].push(GatewayMessage::heartbeat_ack()).await;
    }

    assert_eq!(client.gateway().state(), SessionState::Connected);
    client.close().await.unwrap();
    assert_eq!(peers[0].next().await, Outbound::Close(1000));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_session_starts_fresh() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(2);
    let client = test_client(&http, &gateway);
    let mut log = TransitionLog::new(client.gateway());

    client.open().unwrap();
    peers[0].handshake("stale").await;
    log.wait_for(SessionState::Connected).await;
    log.reset();

    peers[0].push(GatewayMessage::invalid_session(false)).await;
    assert_eq!(peers[0].next().await, Outbound::Close(1000));

    peers[1].hello(45_000).await;
    let identify = peers[1].next_json().await;
    assert_eq!(identify["op"], 2);
    log.wait_for(SessionState::Identifying).await;

    assert!(!log.states().contains(&SessionState::Resuming));
    assert_eq!(client.gateway().session_id(), None);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_server_reconnect_request_resumes() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(2);
    let client = test_client(&http, &gateway);
    let mut log = TransitionLog::new(client.gateway());

    client.open().unwrap();
    peers[0].handshake("moving").await;
    log.wait_for(SessionState::Connected).await;

    peers[0].push(GatewayMessage::reconnect()).await;
    assert_eq!(peers[0].next().await, Outbound::Close(4000));

    peers[1].hello(45_000).await;
    assert_eq!(peers[1].next_json().await["op"], 6);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_non_hello_first_frame_reconnects() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(2);
    let client = test_client(&http, &gateway);
    let mut log = TransitionLog::new(client.gateway());

    client.open().unwrap();
    peers[0].ready("too-early", 1).await;
    assert_eq!(peers[0].next().await, Outbound::Close(4000));

    peers[1].handshake("second").await;
    log.wait_for(SessionState::Connected).await;

    assert_eq!(
        log.states(),
        vec![
            SessionState::Connecting,
            SessionState::AwaitingHello,
            SessionState::Connecting,
            SessionState::AwaitingHello,
            SessionState::Identifying,
            SessionState::Connected,
        ]
    );
    assert_eq!(gateway.urls().len(), 2);
    assert_eq!(client.gateway().session_id().as_deref(), Some("second"));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_zero_heartbeat_interval_is_rejected() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(2);
    let client = test_client(&http, &gateway);
    let mut log = TransitionLog::new(client.gateway());

    client.open().unwrap();
    peers[0].hello(0).await;
    assert_eq!(peers[0].next().await, Outbound::Close(4000));

    peers[1].handshake("valid").await;
    log.wait_for(SessionState::Connected).await;
    assert_eq!(client.gateway().state(), SessionState::Connected);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_connect_attempts_exhausted() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);

    client.open().unwrap();
    let error = tokio::time::timeout(std::time::Duration::from_secs(5), client.wait())
        .await
        .expect("session gives up")
        .unwrap_err();

    assert!(matches!(error, ClientError::Connection(_)), "{error:?}");
    // max_connect_attempts is 3 in the test configuration
    assert_eq!(gateway.urls().len(), 3);
    assert_eq!(client.gateway().state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_regressed_sequence_reconnects_and_resumes() {
    let http = MockHttp::new();
    let (gateway, mut peers) = MockGateway::with_connections(2);
    let client = test_client(&http, &gateway);
    let mut log = TransitionLog::new(client.gateway());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    client.add_handler(handler_fn(move |event| {
        if event.name == "CHANNEL_UPDATE" {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }));

    client.open().unwrap();
    peers[0].handshake("rewound").await;
    log.wait_for(SessionState::Connected).await;
    peers[0].dispatch("TYPING_START", 5, serde_json::json!({"channel_id": "5"})).await;
    peers[0].dispatch("CHANNEL_UPDATE", 3, channel_payload(unique_id(), "late")).await;
    assert_eq!(peers[0].next().await, Outbound::Close(4000));

    peers[1].hello(45_000).await;
    let resume = peers[1].next_json().await;
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["session_id"], "rewound");
    assert_eq!(resume["d"]["seq"], 5);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    client.close().await.unwrap();
}
