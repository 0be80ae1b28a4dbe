//! Client facade
//!
//! Owns the entity cache, the request dispatcher and the gateway session,
//! wired together by [`ClientBuilder`].

use chat_cache::EntityCache;
use chat_common::{ClientConfig, ClientError, ClientResult};
use chat_core::{Entity, EntityKind, EntityRef, RetentionPolicy, Snowflake};
use chat_gateway::{
    EventHandler, EventHandlers, GatewayTransport, GatewayUrlSource, HandlerId,
    PresenceUpdatePayload, SessionManager, StaticGatewayUrl, TungsteniteTransport,
};
use chat_rest::{HttpTransport, PendingRequest, ReqwestTransport, RequestDispatcher, RestRequest, Route};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::lookup::{Lookup, LookupResolver};

/// Chat platform client
///
/// Cheap to clone; clones share the cache, dispatcher and gateway session.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    cache: Arc<EntityCache>,
    dispatcher: RequestDispatcher,
    gateway: Arc<SessionManager>,
    handlers: Arc<EventHandlers>,
    resolver: LookupResolver,
}

impl Client {
    /// Start building a client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client with default transports
    ///
    /// # Errors
    /// Returns `ClientError::Construction` if the token is empty
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        ClientBuilder::new().config(config).build()
    }

    // === Lifecycle ===

    /// Connect to the gateway. Returns once the session task is started.
    pub fn open(&self) -> ClientResult<()> {
        tracing::info!(shard = self.gateway.shard_id(), "Opening client");
        self.gateway.open()
    }

    /// Cancel unsent requests and tear down the gateway session
    pub async fn close(&self) -> ClientResult<()> {
        tracing::info!("Closing client");
        self.dispatcher.close();
        self.gateway.close().await
    }

    /// Wait until the gateway session ends
    pub async fn wait(&self) -> ClientResult<()> {
        self.gateway.wait().await
    }

    // === Components ===

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub fn gateway(&self) -> &SessionManager {
        &self.gateway
    }

    pub fn handlers(&self) -> &EventHandlers {
        &self.handlers
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // === Event handlers ===

    pub fn add_handler(&self, handler: impl EventHandler + 'static) -> HandlerId {
        self.handlers.add(Arc::new(handler))
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.handlers.remove(id)
    }

    /// Swap the handler registered under `id`, keeping its dispatch position
    pub fn replace_handler(&self, id: HandlerId, handler: impl EventHandler + 'static) -> bool {
        self.handlers.replace(id, Arc::new(handler))
    }

    // === Cache retention ===

    pub fn retention_policy(&self) -> RetentionPolicy {
        self.cache.retention_policy()
    }

    /// Change what the cache keeps from now on
    pub fn set_retention_policy(&self, policy: RetentionPolicy) {
        self.cache.set_retention_policy(policy);
    }

    // === Lookups ===

    pub fn lookup(&self, reference: EntityRef, policy: Lookup) -> PendingRequest<Option<Entity>> {
        self.resolver.lookup(reference, policy)
    }

    pub fn lookup_channel(&self, id: Snowflake, policy: Lookup) -> PendingRequest<Option<Entity>> {
        self.lookup(EntityRef::channel(id), policy)
    }

    pub fn lookup_emoji(&self, guild_id: Snowflake, id: Snowflake, policy: Lookup) -> PendingRequest<Option<Entity>> {
        self.lookup(EntityRef::emoji(guild_id, id), policy)
    }

    pub fn lookup_guild(&self, id: Snowflake, policy: Lookup) -> PendingRequest<Option<Entity>> {
        self.lookup(EntityRef::guild(id), policy)
    }

    pub fn lookup_guild_member(
        &self,
        guild_id: Snowflake,
        user_id: Snowflake,
        policy: Lookup,
    ) -> PendingRequest<Option<Entity>> {
        self.lookup(EntityRef::guild_member(guild_id, user_id), policy)
    }

    pub fn lookup_invite(&self, id: Snowflake, policy: Lookup) -> PendingRequest<Option<Entity>> {
        self.lookup(EntityRef::invite(id), policy)
    }

    pub fn lookup_message(
        &self,
        channel_id: Snowflake,
        id: Snowflake,
        policy: Lookup,
    ) -> PendingRequest<Option<Entity>> {
        self.lookup(EntityRef::message(channel_id, id), policy)
    }

    pub fn lookup_role(&self, guild_id: Snowflake, id: Snowflake, policy: Lookup) -> PendingRequest<Option<Entity>> {
        self.lookup(EntityRef::role(guild_id, id), policy)
    }

    pub fn lookup_user(&self, id: Snowflake, policy: Lookup) -> PendingRequest<Option<Entity>> {
        self.lookup(EntityRef::user(id), policy)
    }

    pub fn lookup_webhook(&self, id: Snowflake, policy: Lookup) -> PendingRequest<Option<Entity>> {
        self.lookup(EntityRef::webhook(id), policy)
    }

    // === Actions ===

    /// Delete the entity (leave, for guilds). Works on placeholders.
    ///
    /// On success the entity is dropped from the cache unless a newer event
    /// re-created it while the request was in flight.
    pub fn delete(&self, entity: &Entity) -> PendingRequest<()> {
        let runtime = self.dispatcher.runtime().clone();
        let reference = *entity.reference();
        let route = match Route::delete(&reference) {
            Ok(route) => route,
            Err(e) => return PendingRequest::ready(runtime, Err(e)),
        };

        let cache = Arc::clone(&self.cache);
        let dispatcher = self.dispatcher.clone();
        PendingRequest::new(runtime, async move {
            let version = cache.next_version();
            dispatcher.execute(RestRequest::new(route)).await?;
            cache.remove_at(&reference, version);
            tracing::debug!(entity = %reference, "Entity deleted");
            Ok(())
        })
    }

    /// Post a text message to a channel. Works on placeholders.
    pub fn send_message(&self, channel: &Entity, content: impl Into<String>) -> PendingRequest<Entity> {
        let runtime = self.dispatcher.runtime().clone();
        if channel.kind() != EntityKind::Channel {
            return PendingRequest::ready(
                runtime,
                Err(ClientError::InvalidRequest(format!(
                    "cannot send a message to a {}",
                    channel.kind()
                ))),
            );
        }

        let channel_id = channel.id();
        let body = json!({ "content": content.into() });
        let cache = Arc::clone(&self.cache);
        let dispatcher = self.dispatcher.clone();
        PendingRequest::new(runtime, async move {
            let version = cache.next_version();
            let created = dispatcher
                .execute(RestRequest::new(Route::CreateMessage { channel_id }).with_body(body))
                .await?;
            let message = Entity::from_payload(EntityKind::Message, Some(channel_id), &created)?;
            cache.put(message.clone(), version);
            Ok(message)
        })
    }

    /// Change the presence shown for this session
    pub async fn update_presence(&self, presence: &PresenceUpdatePayload) -> ClientResult<()> {
        self.gateway.update_presence(presence).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("retention", &self.retention_policy())
            .field("cached", &self.cache.len())
            .field("handlers", &self.handlers.len())
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Client`] with replaceable collaborators
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    http_transport: Option<Arc<dyn HttpTransport>>,
    gateway_transport: Option<Arc<dyn GatewayTransport>>,
    gateway_url: Option<String>,
    handlers: Option<Arc<EventHandlers>>,
    runtime: Option<Handle>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            http_transport: None,
            gateway_transport: None,
            gateway_url: None,
            handlers: None,
            runtime: None,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Shorthand for a default configuration with `token`
    pub fn token(self, token: impl Into<String>) -> Self {
        self.config(ClientConfig::new(token))
    }

    pub fn http_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.http_transport = Some(transport);
        self
    }

    pub fn gateway_transport(mut self, transport: Arc<dyn GatewayTransport>) -> Self {
        self.gateway_transport = Some(transport);
        self
    }

    /// Connect to this URL instead of asking the REST API for one
    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    pub fn handlers(mut self, handlers: Arc<EventHandlers>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Runtime that runs requests and the gateway task; defaults to the current one
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the client. Performs no I/O.
    ///
    /// # Errors
    /// Returns `ClientError::Construction` if no configuration or an empty
    /// token was given, or no runtime is available; `ClientError::Config` if
    /// a setting is invalid.
    pub fn build(self) -> ClientResult<Client> {
        let config = self
            .config
            .ok_or_else(|| ClientError::Construction("config is required".to_string()))?;
        if config.token.trim().is_empty() {
            return Err(ClientError::Construction("token must not be empty".to_string()));
        }
        config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()
                .map_err(|_| ClientError::Construction("no tokio runtime available".to_string()))?,
        };
        let http_transport: Arc<dyn HttpTransport> = match self.http_transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::new(&config.rest.user_agent)
                    .map_err(|e| ClientError::Construction(e.to_string()))?,
            ),
        };

        let cache = Arc::new(EntityCache::new(config.cache.retention));
        let dispatcher = RequestDispatcher::new(&config.token, config.rest.clone(), http_transport, runtime);
        let handlers = self.handlers.unwrap_or_default();
        let urls: Arc<dyn GatewayUrlSource> = match self.gateway_url {
            Some(url) => Arc::new(StaticGatewayUrl(url)),
            None => Arc::new(dispatcher.clone()),
        };
        let gateway_transport: Arc<dyn GatewayTransport> = match self.gateway_transport {
            Some(transport) => transport,
            None => Arc::new(TungsteniteTransport),
        };

        let gateway = Arc::new(SessionManager::new(
            config.token.clone(),
            config.gateway.clone(),
            Arc::clone(&cache),
            Arc::clone(&handlers),
            urls,
            gateway_transport,
        ));
        let resolver = LookupResolver::new(Arc::clone(&cache), dispatcher.clone());

        tracing::debug!(
            retention = %config.cache.retention,
            shard = config.gateway.shard_id,
            "Client built"
        );

        Ok(Client {
            config: Arc::new(config),
            cache,
            dispatcher,
            gateway,
            handlers,
            resolver,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
