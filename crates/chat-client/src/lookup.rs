//! Entity lookups
//!
//! Resolves an entity reference from the cache, the REST API, both, or
//! neither (placeholder for issuing actions by id).

use chat_cache::EntityCache;
use chat_common::{ClientError, ClientResult};
use chat_core::{Entity, EntityKind, EntityRef, Snowflake};
use chat_rest::{PendingRequest, RequestDispatcher, RestRequest, Route};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Where a lookup may get its answer from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lookup {
    /// Cached snapshot only; no I/O
    Cache,
    /// Always fetch; the result is written back to the cache
    Rest,
    /// Cache, then REST on a miss
    Global,
    /// Placeholder carrying only the reference; no cache read, no I/O
    Action,
}

/// Lookup front end over the cache and the dispatcher
#[derive(Debug, Clone)]
pub struct LookupResolver {
    cache: Arc<EntityCache>,
    dispatcher: RequestDispatcher,
}

impl LookupResolver {
    #[must_use]
    pub fn new(cache: Arc<EntityCache>, dispatcher: RequestDispatcher) -> Self {
        Self { cache, dispatcher }
    }

    /// Resolve `reference` under `policy`.
    ///
    /// `None` means a cache miss (for [`Lookup::Cache`]) or that the service
    /// reported the entity as not found. [`Lookup::Action`] always yields
    /// `Some`.
    pub fn lookup(&self, reference: EntityRef, policy: Lookup) -> PendingRequest<Option<Entity>> {
        let runtime = self.dispatcher.runtime().clone();
        match policy {
            Lookup::Action => PendingRequest::ready(runtime, Ok(Some(Entity::placeholder(reference)))),
            Lookup::Cache => {
                let cache = Arc::clone(&self.cache);
                PendingRequest::new(runtime, async move { Ok(cache.get_entity(&reference)) })
            }
            Lookup::Rest => {
                let resolver = self.clone();
                PendingRequest::new(runtime, async move { resolver.fetch(reference).await })
            }
            Lookup::Global => {
                let resolver = self.clone();
                PendingRequest::new(runtime, async move {
                    match resolver.cache.get_entity(&reference) {
                        Some(hit) => Ok(Some(hit)),
                        None => resolver.fetch(reference).await,
                    }
                })
            }
        }
    }

    /// Fetch from the REST API and write the result back to the cache.
    ///
    /// The version ticket is taken before the request is sent, so a gateway
    /// event applied while the request was in flight wins over the fetched
    /// snapshot. The fetched snapshot is returned either way.
    pub async fn fetch(&self, reference: EntityRef) -> ClientResult<Option<Entity>> {
        let route = Route::fetch(&reference)?;
        let version = self.cache.next_version();

        let body = match self.dispatcher.execute(RestRequest::new(route)).await {
            Ok(body) => body,
            Err(ClientError::NotFound(_)) => {
                tracing::debug!(entity = %reference, "Entity not found");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(mut payload) = select_payload(&reference, body) else {
            tracing::debug!(entity = %reference, "Entity missing from list response");
            return Ok(None);
        };
        if reference.kind != EntityKind::GuildMember {
            if let Some(object) = payload.as_object_mut() {
                object
                    .entry("id")
                    .or_insert_with(|| Value::String(reference.id.to_string()));
            }
        }

        let entity = Entity::from_payload(reference.kind, reference.scope, &payload)?;
        if !self.cache.put(entity.clone(), version) {
            tracing::trace!(entity = %reference, %version, "Fetched snapshot not cached");
        }
        Ok(Some(entity))
    }
}

/// Roles come back as the guild's whole role list; pick the wanted one
fn select_payload(reference: &EntityRef, body: Value) -> Option<Value> {
    if reference.kind != EntityKind::Role {
        return Some(body);
    }
    match body {
        Value::Array(roles) => roles
            .into_iter()
            .find(|role| role.get("id").and_then(Snowflake::from_json) == Some(reference.id)),
        other => Some(other),
    }
}
