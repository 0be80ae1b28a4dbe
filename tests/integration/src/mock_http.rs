//! Scripted HTTP transport
//!
//! Answers requests from a queue of prepared responses and records what was
//! sent, when, and how many requests were on the wire at once.

use async_trait::async_trait;
use chat_rest::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One request as the mock saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub request: HttpRequest,
    pub at: Instant,
}

#[derive(Default)]
pub struct MockHttp {
    responses: Mutex<VecDeque<HttpResponse>>,
    recorded: Mutex<Vec<Recorded>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response; unscripted requests get 404
    pub fn respond(&self, response: HttpResponse) -> &Self {
        self.responses.lock().push_back(response);
        self
    }

    pub fn respond_json(&self, body: Value) -> &Self {
        self.respond(HttpResponse::json(200, &body))
    }

    /// Time each request spends on the wire
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.recorded.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.recorded.lock().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for MockHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        self.recorded.lock().push(Recorded {
            request,
            at: Instant::now(),
        });

        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| HttpResponse::json(404, &json!({"message": "Unknown", "code": 10000})));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(response)
    }
}

/// 429 response asking to wait `retry_after_ms`
pub fn rate_limited(retry_after_ms: u64) -> HttpResponse {
    HttpResponse::json(
        429,
        &json!({"message": "You are being rate limited.", "retry_after": retry_after_ms, "global": false}),
    )
}
