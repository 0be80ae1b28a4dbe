//! # chat-client
//!
//! One client over the two transports of the chat platform: the gateway
//! session keeps the entity cache current, and lookups read the cache or
//! fall back to the rate-limited REST dispatcher.
//!
//! ## Example
//!
//! ```ignore
//! use chat_client::{Client, Lookup};
//!
//! let client = Client::builder().config(ClientConfig::from_env()?).build()?;
//! client.add_handler(handler_fn(|event| println!("{}", event.name)));
//! client.open()?;
//!
//! let channel = client.lookup_channel(channel_id, Lookup::Action).await?.unwrap();
//! client.send_message(&channel, "hello").await?;
//! ```

pub mod client;
pub mod lookup;

pub use client::{Client, ClientBuilder};
pub use lookup::{Lookup, LookupResolver};

pub use chat_cache::EntityCache;
pub use chat_common::{ClientConfig, ClientError, ClientResult};
pub use chat_core::{Entity, EntityKind, EntityRef, RetentionPolicy, Snowflake};
pub use chat_gateway::{handler_fn, EventHandler, GatewayEvent, GatewayEventType, PresenceUpdatePayload, SessionState};
pub use chat_rest::PendingRequest;
