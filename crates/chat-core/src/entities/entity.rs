//! Entity snapshot - the last known field values of one remote entity
//!
//! Snapshots are kept as the JSON object the service sent. Only the
//! identifiers needed for caching and lookup are interpreted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{EntityKind, EntityRef};
use crate::error::DomainError;
use crate::value_objects::Snowflake;

/// Snapshot of a remote entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    reference: EntityRef,
    data: Map<String, Value>,
    #[serde(default)]
    placeholder: bool,
}

impl Entity {
    /// Create a snapshot from already-extracted parts
    #[must_use]
    pub fn new(reference: EntityRef, data: Map<String, Value>) -> Self {
        Self {
            reference,
            data,
            placeholder: false,
        }
    }

    /// Create a placeholder carrying only the identifier.
    ///
    /// Placeholders are enough to issue actions (delete, send) against an
    /// entity whose data the caller does not need.
    #[must_use]
    pub fn placeholder(reference: EntityRef) -> Self {
        let mut data = Map::new();
        data.insert("id".to_string(), Value::String(reference.id.to_string()));
        Self {
            reference,
            data,
            placeholder: true,
        }
    }

    /// Build a snapshot from a service payload.
    ///
    /// The identifier is read from `id` (or `user.id` for guild members). For
    /// scoped kinds the scope is `scope` if given, else `guild_id` / `channel_id`
    /// from the payload.
    pub fn from_payload(
        kind: EntityKind,
        scope: Option<Snowflake>,
        payload: &Value,
    ) -> Result<Self, DomainError> {
        let object = payload
            .as_object()
            .ok_or(DomainError::NotAnObject(kind))?;

        let id = Self::extract_id(kind, object)?;

        let scope = match kind.scope_kind() {
            None => None,
            Some(scope_kind) => {
                let field = match scope_kind {
                    EntityKind::Channel => "channel_id",
                    _ => "guild_id",
                };
                let found = scope.or_else(|| object.get(field).and_then(Snowflake::from_json));
                Some(found.ok_or(DomainError::MissingScope(kind))?)
            }
        };

        Ok(Self::new(EntityRef { kind, id, scope }, object.clone()))
    }

    fn extract_id(kind: EntityKind, object: &Map<String, Value>) -> Result<Snowflake, DomainError> {
        let raw = if kind == EntityKind::GuildMember {
            object
                .get("user")
                .and_then(|user| user.get("id"))
                .or_else(|| object.get("user_id"))
        } else {
            object.get("id")
        };

        match raw {
            None | Some(Value::Null) => Err(DomainError::MissingIdentifier(kind)),
            Some(value) => {
                Snowflake::from_json(value).ok_or_else(|| DomainError::InvalidSnowflake(value.to_string()))
            }
        }
    }

    /// Overlay another snapshot's fields onto this one
    pub fn merge(&mut self, update: &Entity) {
        for (key, value) in &update.data {
            self.data.insert(key.clone(), value.clone());
        }
        self.placeholder = self.placeholder && update.placeholder;
    }

    #[inline]
    #[must_use]
    pub fn reference(&self) -> &EntityRef {
        &self.reference
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.reference.kind
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> Snowflake {
        self.reference.id
    }

    /// Check if this snapshot is a placeholder without remote data
    #[inline]
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Raw field map
    #[must_use]
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Get a field value
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Get a string field value
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Consume into the raw JSON object
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}
