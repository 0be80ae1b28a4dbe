//! Retry policies

mod backoff;

pub use backoff::BackoffPolicy;
