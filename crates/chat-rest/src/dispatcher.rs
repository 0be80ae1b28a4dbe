//! Rate-limited request dispatcher.
//!
//! Requests on the same bucket run one at a time in submission order;
//! requests on different buckets run in parallel, bounded by
//! `max_in_flight`. Rate-limited responses are requeued, network failures
//! and 5xx responses are retried with backoff, and other 4xx responses fail
//! immediately.

use chat_common::{BackoffPolicy, ClientError, ClientResult, RestConfig, API_VERSION};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, timeout, Instant};

use crate::bucket::{BucketRegistry, BucketSnapshot, RateLimitHeaders};
use crate::pending::PendingRequest;
use crate::request::RestRequest;
use crate::route::Route;
use crate::signal::ShutdownSignal;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Wait used when a 429 carries no retry hint
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Dispatches REST requests with per-bucket rate limiting
#[derive(Clone)]
pub struct RequestDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    transport: Arc<dyn HttpTransport>,
    config: RestConfig,
    authorization: String,
    buckets: BucketRegistry,
    in_flight: Semaphore,
    backoff: BackoffPolicy,
    shutdown: ShutdownSignal,
    gateway_url: Mutex<Option<String>>,
    runtime: Handle,
}

/// What to do after one send attempt
enum Attempt {
    Done(ClientResult<Value>),
    RateLimited(Duration),
    Failed(ClientError),
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("api_base", &self.inner.config.api_base)
            .field("buckets", &self.inner.buckets.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl RequestDispatcher {
    /// Create a dispatcher authenticating with `token`
    pub fn new(
        token: &str,
        config: RestConfig,
        transport: Arc<dyn HttpTransport>,
        runtime: Handle,
    ) -> Self {
        let authorization = if token.starts_with("Bot ") || token.starts_with("Bearer ") {
            token.to_string()
        } else {
            format!("Bot {token}")
        };

        Self {
            inner: Arc::new(DispatcherInner {
                transport,
                backoff: BackoffPolicy::for_rest(&config),
                in_flight: Semaphore::new(config.max_in_flight.max(1)),
                config,
                authorization,
                buckets: BucketRegistry::new(),
                shutdown: ShutdownSignal::new(),
                gateway_url: Mutex::new(None),
                runtime,
            }),
        }
    }

    /// Queue a request; nothing is sent until the handle is consumed
    pub fn submit(&self, request: RestRequest) -> PendingRequest<Value> {
        let dispatcher = self.clone();
        PendingRequest::new(self.inner.runtime.clone(), async move {
            dispatcher.execute(request).await
        })
    }

    /// Run a request to completion
    pub async fn execute(&self, request: RestRequest) -> ClientResult<Value> {
        if self.inner.shutdown.is_triggered() {
            return Err(ClientError::Cancelled);
        }
        self.inner.run(&request).await
    }

    /// Gateway URL, fetched once and cached until `force_refresh`
    pub async fn gateway_url(&self, force_refresh: bool) -> ClientResult<String> {
        let mut cached = self.inner.gateway_url.lock().await;
        if !force_refresh {
            if let Some(url) = cached.as_ref() {
                return Ok(url.clone());
            }
        }

        let body = self.execute(RestRequest::new(Route::GetGateway)).await?;
        let url = body
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::protocol("gateway response has no url"))?
            .to_string();

        tracing::debug!(url = %url, "Gateway URL resolved");
        *cached = Some(url.clone());
        Ok(url)
    }

    /// Cancel every request that has not been sent yet.
    ///
    /// Requests already on the wire finish, but their results are discarded.
    pub fn close(&self) {
        if self.inner.shutdown.trigger() {
            tracing::info!("REST dispatcher closed");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_triggered()
    }

    /// Current state of a bucket, if it has been used
    pub async fn bucket_snapshot(&self, key: &str) -> Option<BucketSnapshot> {
        self.inner.buckets.snapshot(key).await
    }

    /// Runtime the dispatcher spawns request tasks on
    #[must_use]
    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Protocol version of the REST API this dispatcher targets
    #[must_use]
    pub fn api_version(&self) -> u8 {
        API_VERSION
    }
}

impl DispatcherInner {
    async fn run(&self, request: &RestRequest) -> ClientResult<Value> {
        let key = request.bucket_key();
        let bucket = self.buckets.bucket(&key);
        let mut rate_limited = 0u32;
        let mut failures = 0u32;

        loop {
            // The bucket lock is the queue; it is held until the response is read
            let mut state = self.until_closed(bucket.lock()).await?;

            if let Some(wait) = state.wait_time(Instant::now()) {
                tracing::debug!(bucket = %key, wait_ms = wait.as_millis() as u64, "Bucket exhausted, waiting for reset");
                self.until_closed(sleep(wait)).await?;
            }
            if let Some(wait) = self.buckets.global_wait(Instant::now()) {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "Global rate limit active, waiting");
                self.until_closed(sleep(wait)).await?;
            }

            let permit = self
                .until_closed(self.in_flight.acquire())
                .await?
                .map_err(|_| ClientError::Cancelled)?;

            state.consume(Instant::now());
            let http = self.build(request);
            tracing::trace!(route = %request.route, "Sending request");

            let sent = timeout(self.config.request_timeout(), self.transport.send(http)).await;
            drop(permit);

            if self.shutdown.is_triggered() {
                tracing::debug!(route = %request.route, "Discarding response received after close");
                return Err(ClientError::Cancelled);
            }

            let attempt = match sent {
                Ok(Ok(response)) => {
                    let headers = RateLimitHeaders::parse(&response);
                    state.update(&headers, Instant::now());
                    let attempt = self.classify(request, &response, &headers);
                    if let Attempt::RateLimited(wait) = &attempt {
                        let wait = *wait;
                        if headers.global {
                            self.buckets.set_global(wait, Instant::now());
                        } else {
                            state.exhaust_for(wait, Instant::now());
                        }
                    }
                    attempt
                }
                Ok(Err(err)) => Attempt::Failed(ClientError::connection(err)),
                Err(_) => Attempt::Failed(ClientError::connection(TransportError::Timeout)),
            };
            drop(state);

            match attempt {
                Attempt::Done(result) => return result,
                Attempt::RateLimited(wait) => {
                    rate_limited += 1;
                    if rate_limited > self.config.max_rate_limit_retries {
                        tracing::warn!(bucket = %key, attempts = rate_limited, "Rate limit retries exhausted");
                        return Err(ClientError::RateLimitExhausted {
                            bucket: key,
                            attempts: rate_limited,
                        });
                    }
                    tracing::warn!(
                        bucket = %key,
                        attempt = rate_limited,
                        retry_after_ms = wait.as_millis() as u64,
                        "Rate limited, requeueing request"
                    );
                }
                Attempt::Failed(err) => {
                    failures += 1;
                    if failures > self.config.max_retries {
                        tracing::warn!(route = %request.route, attempts = failures, error = %err, "Request failed, retries exhausted");
                        return Err(err);
                    }
                    let delay = self.backoff.next_delay(failures);
                    tracing::warn!(
                        route = %request.route,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Request failed, retrying"
                    );
                    self.until_closed(sleep(delay)).await?;
                }
            }
        }
    }

    fn classify(&self, request: &RestRequest, response: &HttpResponse, headers: &RateLimitHeaders) -> Attempt {
        match response.status {
            200..=299 => Attempt::Done(response.parse_json::<Value>().map_err(ClientError::from)),
            429 => Attempt::RateLimited(headers.retry_after.unwrap_or(DEFAULT_RETRY_AFTER)),
            404 => Attempt::Done(Err(ClientError::not_found(request.route.path()))),
            401 => Attempt::Done(Err(ClientError::Auth(response.error_message()))),
            status @ 400..=499 => Attempt::Done(Err(ClientError::Http {
                status,
                message: response.error_message(),
            })),
            status @ 500..=599 => Attempt::Failed(ClientError::Http {
                status,
                message: response.error_message(),
            }),
            status => Attempt::Done(Err(ClientError::Http {
                status,
                message: format!("unexpected status: {}", response.error_message()),
            })),
        }
    }

    fn build(&self, request: &RestRequest) -> HttpRequest {
        let url = format!(
            "{}/{}",
            self.config.api_base.trim_end_matches('/'),
            request.route.path().trim_start_matches('/')
        );

        let mut headers = vec![
            ("Authorization".to_string(), self.authorization.clone()),
            ("User-Agent".to_string(), self.config.user_agent.clone()),
        ];
        if request.body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        if let Some(reason) = &request.reason {
            headers.push(("X-Audit-Log-Reason".to_string(), reason.clone()));
        }

        HttpRequest {
            method: request.route.method(),
            url,
            headers,
            body: request.body.clone(),
        }
    }

    /// Race a wait against dispatcher shutdown
    async fn until_closed<F: Future>(&self, future: F) -> ClientResult<F::Output> {
        tokio::select! {
            biased;
            () = self.shutdown.wait() => Err(ClientError::Cancelled),
            output = future => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chat_core::Snowflake;
    use parking_lot::Mutex as SyncMutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Replays canned responses and records what was sent
    #[derive(Default)]
    struct ScriptedTransport {
        responses: SyncMutex<VecDeque<Result<HttpResponse, TransportError>>>,
        sent: SyncMutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: SyncMutex::new(responses.into()),
                sent: SyncMutex::default(),
            })
        }

        fn sent(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.sent.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::json(200, &json!({}))))
        }
    }

    fn dispatcher(transport: Arc<ScriptedTransport>) -> RequestDispatcher {
        let config = RestConfig {
            max_retries: 2,
            max_rate_limit_retries: 2,
            retry_base_delay_ms: 10,
            ..RestConfig::default()
        };
        RequestDispatcher::new("secret", config, transport, Handle::current())
    }

    fn get_user() -> RestRequest {
        RestRequest::new(Route::GetUser { user_id: Snowflake::new(1) })
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_sets_headers() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::json(200, &json!({ "id": "1" })))]);
        let body = dispatcher(Arc::clone(&transport)).execute(get_user()).await.unwrap();

        assert_eq!(body["id"], "1");
        let sent = transport.sent.lock();
        assert_eq!(sent[0].url, "https://discordapp.com/api/v6/users/1");
        assert_eq!(sent[0].header("authorization"), Some("Bot secret"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_is_requeued() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::json(429, &json!({ "retry_after": 500, "global": false }))),
            Ok(HttpResponse::json(200, &json!({ "id": "1" }))),
        ]);
        let start = Instant::now();
        let body = dispatcher(Arc::clone(&transport)).execute(get_user()).await.unwrap();

        assert_eq!(body["id"], "1");
        assert_eq!(transport.sent(), 2);
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_budget_exhaustion() {
        let limited = || Ok(HttpResponse::json(429, &json!({ "retry_after": 100 })));
        let transport = ScriptedTransport::new(vec![limited(), limited(), limited(), limited()]);
        let err = dispatcher(Arc::clone(&transport)).execute(get_user()).await.unwrap_err();

        assert!(matches!(err, ClientError::RateLimitExhausted { attempts: 3, .. }));
        assert_eq!(transport.sent(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_fail_immediately() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse::json(
            403,
            &json!({ "message": "Missing Access" }),
        ))]);
        let err = dispatcher(Arc::clone(&transport)).execute(get_user()).await.unwrap_err();

        assert!(matches!(err, ClientError::Http { status: 403, .. }));
        assert_eq!(transport.sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_and_unauthorized() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(404)),
            Ok(HttpResponse::json(401, &json!({ "message": "401: Unauthorized" }))),
        ]);
        let dispatcher = dispatcher(transport);

        assert!(matches!(dispatcher.execute(get_user()).await, Err(ClientError::NotFound(_))));
        assert!(matches!(dispatcher.execute(get_user()).await, Err(ClientError::Auth(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_and_network_errors_are_retried() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(502)),
            Err(TransportError::Connection("reset".into())),
            Ok(HttpResponse::json(200, &json!({ "ok": true }))),
        ]);
        let body = dispatcher(Arc::clone(&transport)).execute(get_user()).await.unwrap();

        assert_eq!(body["ok"], true);
        assert_eq!(transport.sent(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_surfaces_last_error() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::new(500)),
            Ok(HttpResponse::new(500)),
            Ok(HttpResponse::new(503)),
        ]);
        let err = dispatcher(Arc::clone(&transport)).execute(get_user()).await.unwrap_err();

        assert!(matches!(err, ClientError::Http { status: 503, .. }));
        assert_eq!(transport.sent(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_url_is_cached() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::json(200, &json!({ "url": "wss://gateway.example" }))),
            Ok(HttpResponse::json(200, &json!({ "url": "wss://gateway2.example" }))),
        ]);
        let dispatcher = dispatcher(Arc::clone(&transport));

        assert_eq!(dispatcher.gateway_url(false).await.unwrap(), "wss://gateway.example");
        assert_eq!(dispatcher.gateway_url(false).await.unwrap(), "wss://gateway.example");
        assert_eq!(transport.sent(), 1);

        assert_eq!(dispatcher.gateway_url(true).await.unwrap(), "wss://gateway2.example");
        assert_eq!(transport.sent(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_reset_header_is_clamped() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse::json(200, &json!({ "id": "1" }))
                .with_header("X-RateLimit-Limit", 5)
                .with_header("X-RateLimit-Remaining", 4)
                .with_header("X-RateLimit-Reset-After", "1e300")),
            Ok(HttpResponse::json(200, &json!({ "id": "1" })).with_header("X-RateLimit-Reset", "inf")),
        ]);
        let dispatcher = dispatcher(Arc::clone(&transport));

        assert_eq!(dispatcher.execute(get_user()).await.unwrap()["id"], "1");
        assert_eq!(dispatcher.execute(get_user()).await.unwrap()["id"], "1");

        let snapshot = dispatcher.bucket_snapshot("GET /users/{user_id}").await.unwrap();
        assert!(snapshot.reset_in.is_some_and(|reset| reset <= crate::bucket::MAX_RATE_LIMIT_WAIT));
        assert_eq!(transport.sent(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_dispatcher_cancels() {
        let transport = ScriptedTransport::new(vec![]);
        let dispatcher = dispatcher(Arc::clone(&transport));
        dispatcher.close();

        assert!(dispatcher.is_closed());
        assert!(dispatcher.execute(get_user()).await.unwrap_err().is_cancelled());
        assert_eq!(transport.sent(), 0);
    }
}
