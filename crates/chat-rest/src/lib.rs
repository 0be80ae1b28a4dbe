//! # chat-rest
//!
//! Rate-limited REST dispatcher for the chat platform API.
//!
//! ## Features
//!
//! - **Buckets**: requests sharing a method and route template are serialized
//!   and held back while the bucket is exhausted
//! - **Retries**: 429 responses are requeued; network failures and 5xx
//!   responses are retried with exponential backoff
//! - **Pending requests**: consume a request by blocking, spawning with
//!   callbacks, or awaiting it
//!
//! ## Example
//!
//! ```ignore
//! use chat_rest::{RequestDispatcher, RestRequest, Route, ReqwestTransport};
//!
//! let transport = Arc::new(ReqwestTransport::new(&config.user_agent)?);
//! let dispatcher = RequestDispatcher::new(&token, config, transport, Handle::current());
//!
//! dispatcher
//!     .submit(RestRequest::new(Route::GetUser { user_id }))
//!     .on_success(|user| println!("{user}"))
//!     .on_error(|err| eprintln!("{err}"))
//!     .spawn();
//! ```

pub mod bucket;
pub mod dispatcher;
pub mod pending;
pub mod request;
pub mod route;
pub mod signal;
pub mod transport;

pub use bucket::{BucketRegistry, BucketSnapshot, RateLimitBucket, RateLimitHeaders, MAX_RATE_LIMIT_WAIT};
pub use dispatcher::RequestDispatcher;
pub use pending::{CancelHandle, PendingRequest};
pub use request::RestRequest;
pub use route::{Method, Route};
pub use signal::ShutdownSignal;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
