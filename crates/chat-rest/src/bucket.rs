//! Rate-limit buckets.
//!
//! Each bucket tracks the remaining call count and reset time reported by the
//! most recent response on that bucket. A bucket sits behind a FIFO async
//! mutex held for the whole send, which makes the lock itself the bucket's
//! request queue.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::transport::HttpResponse;

/// Longest wait a server-supplied rate-limit value can impose
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(3600);

/// Rate-limit metadata read from one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Time until the bucket resets
    pub reset_after: Option<Duration>,
    /// Whether a 429 applies to every route
    pub global: bool,
    /// Wait requested by a 429
    pub retry_after: Option<Duration>,
}

impl RateLimitHeaders {
    /// Read `X-RateLimit-*` headers, and for 429 the `retry_after` body field
    /// (milliseconds) with the `Retry-After` header (seconds) as fallback.
    #[must_use]
    pub fn parse(response: &HttpResponse) -> Self {
        let number = |name: &str| response.header(name).and_then(|v| v.trim().parse::<f64>().ok());

        let reset_after = number("x-ratelimit-reset-after")
            .or_else(|| {
                // Absolute reset in epoch seconds
                number("x-ratelimit-reset").map(|reset| reset - Utc::now().timestamp_millis() as f64 / 1000.0)
            })
            .map(seconds);

        let mut headers = Self {
            limit: number("x-ratelimit-limit").map(|v| v as u32),
            remaining: number("x-ratelimit-remaining").map(|v| v as u32),
            reset_after,
            global: response
                .header("x-ratelimit-global")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            retry_after: None,
        };

        if response.status == 429 {
            let body = response.parse_json::<Value>().unwrap_or(Value::Null);
            headers.retry_after = body
                .get("retry_after")
                .and_then(Value::as_f64)
                .map(|millis| seconds(millis / 1000.0))
                .or_else(|| number("retry-after").map(seconds));
            headers.global |= body.get("global").and_then(Value::as_bool).unwrap_or(false);
        }

        headers
    }
}

/// Non-negative seconds clamped to [`MAX_RATE_LIMIT_WAIT`]; NaN reads as zero
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0))
        .unwrap_or(MAX_RATE_LIMIT_WAIT)
        .min(MAX_RATE_LIMIT_WAIT)
}

fn deadline(now: Instant, wait: Duration) -> Instant {
    now.checked_add(wait.min(MAX_RATE_LIMIT_WAIT)).unwrap_or(now)
}

/// State of one bucket
#[derive(Debug, Clone, Default)]
pub struct RateLimitBucket {
    limit: Option<u32>,
    remaining: Option<u32>,
    reset_at: Option<Instant>,
}

impl RateLimitBucket {
    /// How long a request must wait before it may be sent
    #[must_use]
    pub fn wait_time(&self, now: Instant) -> Option<Duration> {
        match (self.remaining, self.reset_at) {
            (Some(0), Some(reset_at)) if reset_at > now => Some(reset_at - now),
            _ => None,
        }
    }

    /// Account for a request about to be sent
    pub fn consume(&mut self, now: Instant) {
        if self.reset_at.is_some_and(|reset_at| reset_at <= now) {
            self.remaining = self.limit;
            self.reset_at = None;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    /// Refresh from a response's rate-limit metadata
    pub fn update(&mut self, headers: &RateLimitHeaders, now: Instant) {
        if headers.limit.is_some() {
            self.limit = headers.limit;
        }
        if headers.remaining.is_some() {
            self.remaining = headers.remaining;
        }
        if let Some(reset_after) = headers.reset_after {
            self.reset_at = Some(deadline(now, reset_after));
        }
    }

    /// Block the bucket for `wait`
    pub fn exhaust_for(&mut self, wait: Duration, now: Instant) {
        self.remaining = Some(0);
        self.reset_at = Some(deadline(now, wait));
    }

    #[must_use]
    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    #[must_use]
    pub fn limit(&self) -> Option<u32> {
        self.limit
    }
}

/// Point-in-time view of a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub key: String,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_in: Option<Duration>,
}

/// All buckets known to a dispatcher, plus the global rate-limit gate
#[derive(Debug, Default)]
pub struct BucketRegistry {
    buckets: DashMap<String, Arc<Mutex<RateLimitBucket>>>,
    global_until: SyncMutex<Option<Instant>>,
}

impl BucketRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the bucket for a key
    #[must_use]
    pub fn bucket(&self, key: &str) -> Arc<Mutex<RateLimitBucket>> {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(bucket.value());
        }
        Arc::clone(self.buckets.entry(key.to_string()).or_default().value())
    }

    /// Remaining pause imposed by a global rate limit
    #[must_use]
    pub fn global_wait(&self, now: Instant) -> Option<Duration> {
        let mut until = self.global_until.lock();
        match *until {
            Some(deadline) if deadline > now => Some(deadline - now),
            Some(_) => {
                *until = None;
                None
            }
            None => None,
        }
    }

    /// Pause every bucket for `wait`
    pub fn set_global(&self, wait: Duration, now: Instant) {
        let deadline = deadline(now, wait);
        let mut until = self.global_until.lock();
        if until.map_or(true, |current| current < deadline) {
            *until = Some(deadline);
        }
    }

    /// Snapshot a bucket; waits for any request currently holding it
    pub async fn snapshot(&self, key: &str) -> Option<BucketSnapshot> {
        let bucket = self.buckets.get(key).map(|b| Arc::clone(b.value()))?;
        let state = bucket.lock().await;
        let now = Instant::now();
        Some(BucketSnapshot {
            key: key.to_string(),
            limit: state.limit,
            remaining: state.remaining,
            reset_in: state.reset_at.and_then(|at| at.checked_duration_since(now)),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
