//! Lookup policy scenarios
//!
//! Run with: cargo test -p integration-tests --test lookup_tests

use chat_client::{Client, ClientError, Entity, EntityKind, EntityRef, Lookup, RetentionPolicy, Snowflake};
use chat_rest::HttpTransport;
use integration_tests::{channel_payload, test_client, unique_id, user_payload, MockGateway, MockHttp};
use std::sync::Arc;

fn channel(id: u64, name: &str) -> Entity {
    Entity::from_payload(EntityKind::Channel, None, &channel_payload(id, name)).unwrap()
}

// ============================================================================
// Construction
// ============================================================================

#[tokio::test]
async fn test_empty_token_fails_before_any_io() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(1);

    let result = Client::builder()
        .token("")
        .http_transport(Arc::clone(&http) as Arc<dyn HttpTransport>)
        .gateway_transport(gateway.clone())
        .build();

    assert!(matches!(result, Err(ClientError::Construction(_))));
    assert_eq!(http.request_count(), 0);
    assert!(gateway.urls().is_empty());
}

// ============================================================================
// Policies
// ============================================================================

#[tokio::test]
async fn test_action_is_never_empty_and_never_fetches() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);

    for reference in [
        EntityRef::channel(Snowflake::new(unique_id())),
        EntityRef::role(Snowflake::new(unique_id()), Snowflake::new(unique_id())),
        EntityRef::message(Snowflake::new(unique_id()), Snowflake::new(unique_id())),
    ] {
        let entity = client.lookup(reference, Lookup::Action).await.unwrap();
        let entity = entity.expect("action lookups always yield an entity");
        assert_eq!(*entity.reference(), reference);
        assert!(entity.is_placeholder());
    }

    assert_eq!(http.request_count(), 0);
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn test_global_matches_cache_on_hit_and_rest_on_miss() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);

    let cached_id = unique_id();
    client.cache().put(channel(cached_id, "cached"), client.cache().next_version());

    let from_cache = client.lookup_channel(Snowflake::new(cached_id), Lookup::Cache).await.unwrap();
    let from_global = client.lookup_channel(Snowflake::new(cached_id), Lookup::Global).await.unwrap();
    assert_eq!(from_cache, from_global);
    assert_eq!(http.request_count(), 0);

    let user_id = unique_id();
    http.respond_json(user_payload(user_id, "nelly"));
    let from_global = client
        .lookup_user(Snowflake::new(user_id), Lookup::Global)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from_global.get_str("username"), Some("nelly"));
    assert_eq!(http.request_count(), 1);
    assert!(http.requests()[0].request.url.ends_with(&format!("/users/{user_id}")));

    // Written back: the next cache lookup hits
    let from_cache = client.lookup_user(Snowflake::new(user_id), Lookup::Cache).await.unwrap();
    assert_eq!(from_cache, Some(from_global));
}

#[tokio::test]
async fn test_rest_not_found_is_empty() -> anyhow::Result<()> {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);

    let missing = client.lookup_guild(Snowflake::new(unique_id()), Lookup::Rest).await?;

    assert!(missing.is_none());
    assert_eq!(http.request_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_removed_entity_misses_cache() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);

    let id = unique_id();
    let entity = channel(id, "doomed");
    client.cache().put(entity.clone(), client.cache().next_version());
    assert!(client.lookup_channel(Snowflake::new(id), Lookup::Cache).await.unwrap().is_some());

    client.cache().remove(entity.reference());

    assert!(client.lookup_channel(Snowflake::new(id), Lookup::Cache).await.unwrap().is_none());
}

#[tokio::test]
async fn test_none_retention_disables_cache_reads() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);

    let id = unique_id();
    client.cache().put(channel(id, "kept"), client.cache().next_version());
    client.set_retention_policy(RetentionPolicy::None);

    assert!(client.lookup_channel(Snowflake::new(id), Lookup::Cache).await.unwrap().is_none());
}

// ============================================================================
// Versioning
// ============================================================================

#[tokio::test]
async fn test_out_of_order_puts_keep_newest() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);
    let cache = client.cache();

    let id = unique_id();
    let older = cache.next_version();
    let newer = cache.next_version();

    assert!(cache.put(channel(id, "newer"), newer));
    assert!(!cache.put(channel(id, "older"), older));

    let stored = cache.get(&EntityRef::channel(Snowflake::new(id))).unwrap();
    assert_eq!(stored.entity.get_str("name"), Some("newer"));
    assert_eq!(stored.version, newer);
}

// ============================================================================
// Actions
// ============================================================================

#[tokio::test]
async fn test_actions_on_placeholders() {
    let http = MockHttp::new();
    let (gateway, _peers) = MockGateway::with_connections(0);
    let client = test_client(&http, &gateway);

    let channel_id = unique_id();
    let message_id = unique_id();
    let channel = client
        .lookup_channel(Snowflake::new(channel_id), Lookup::Action)
        .await
        .unwrap()
        .unwrap();

    http.respond_json(serde_json::json!({
        "id": message_id.to_string(),
        "channel_id": channel_id.to_string(),
        "content": "ping"
    }));
    let message = client.send_message(&channel, "ping").await.unwrap();
    assert!(client.cache().contains(message.reference()));

    http.respond(chat_rest::HttpResponse::new(204));
    client.delete(&message).await.unwrap();
    assert!(!client.cache().contains(message.reference()));

    let requests = http.requests();
    assert_eq!(requests[0].request.method.as_str(), "POST");
    assert!(requests[0].request.url.ends_with(&format!("/channels/{channel_id}/messages")));
    assert_eq!(requests[1].request.method.as_str(), "DELETE");
    assert!(requests[1]
        .request
        .url
        .ends_with(&format!("/channels/{channel_id}/messages/{message_id}")));
}
