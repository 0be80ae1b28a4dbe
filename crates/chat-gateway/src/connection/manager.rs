//! Gateway session manager
//!
//! One task per open session drives the state machine. It owns the inbound
//! side of the connection, so frames are processed strictly in arrival
//! order: sequence check, cache update, then event handlers. Heartbeats run
//! on a separate task per connection.

use super::heartbeat::{run_heartbeat, HeartbeatClock};
use super::session::{SequenceCheck, Session};
use super::state::{SessionState, StateCell, StateTransition};
use super::transport::{GatewayConnection, GatewayTransport, Inbound, Outbound};
use super::url::GatewayUrlSource;
use crate::events::{apply_event, EventHandlers, GatewayEvent, GatewayEventType};
use crate::protocol::{
    gateway_url_with_query, CloseAction, CloseCode, GatewayMessage, IdentifyPayload, OpCode,
    PresenceUpdatePayload, ReadyPayload, RequestGuildMembersPayload, ResumePayload,
};
use chat_cache::EntityCache;
use chat_common::{BackoffPolicy, ClientError, ClientResult, GatewayConfig};
use chat_core::Snowflake;
use chat_rest::ShutdownSignal;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Randomized wait before identifying again after a non-resumable invalid session
const INVALID_SESSION_DELAY_MS: std::ops::RangeInclusive<u64> = 1_000..=5_000;

/// Manages one gateway session (one shard)
pub struct SessionManager {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<ClientResult<()>>>>,
    shutdown: Mutex<Option<ShutdownSignal>>,
}

struct Inner {
    token: String,
    config: GatewayConfig,
    cache: Arc<EntityCache>,
    handlers: Arc<EventHandlers>,
    transport: Arc<dyn GatewayTransport>,
    urls: Arc<dyn GatewayUrlSource>,
    state: StateCell,
    session: Arc<Session>,
    heartbeat: Arc<HeartbeatClock>,
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
}

/// How one connection ended
#[derive(Debug)]
enum Outcome {
    /// `close()` was called
    Shutdown,
    /// Connection lost or dropped on purpose; reconnect
    Reconnect { resume: bool },
    /// Server rejected the session for good
    InvalidSession,
    /// Connection could not be set up
    Retry(ClientError),
    /// Stop for good
    Fatal(ClientError),
}

impl SessionManager {
    pub fn new(
        token: impl Into<String>,
        config: GatewayConfig,
        cache: Arc<EntityCache>,
        handlers: Arc<EventHandlers>,
        urls: Arc<dyn GatewayUrlSource>,
        transport: Arc<dyn GatewayTransport>,
    ) -> Self {
        let state = StateCell::new(config.shard_id);
        Self {
            inner: Arc::new(Inner {
                token: token.into(),
                config,
                cache,
                handlers,
                transport,
                urls,
                state,
                session: Arc::new(Session::new()),
                heartbeat: Arc::new(HeartbeatClock::default()),
                outbound: Mutex::new(None),
            }),
            task: Mutex::new(None),
            shutdown: Mutex::new(None),
        }
    }

    /// Start the session task. Must be called inside a tokio runtime.
    pub fn open(&self) -> ClientResult<()> {
        let runtime = Handle::try_current()
            .map_err(|_| ClientError::InvalidRequest("gateway must be opened inside a tokio runtime".to_string()))?;

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|running| !running.is_finished()) {
            return Err(ClientError::InvalidRequest("gateway session is already open".to_string()));
        }

        let shutdown = ShutdownSignal::new();
        *self.shutdown.lock() = Some(shutdown.clone());
        self.inner.session.reset();
        self.inner.state.set(SessionState::Connecting);
        *task = Some(runtime.spawn(run(Arc::clone(&self.inner), shutdown)));
        Ok(())
    }

    /// Stop heartbeating, close the connection with 1000 and discard the
    /// session. Waits for the session task to finish.
    pub async fn close(&self) -> ClientResult<()> {
        if let Some(shutdown) = self.shutdown.lock().take() {
            shutdown.trigger();
        }

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Gateway session had already failed"),
                Err(e) => tracing::warn!(error = %e, "Gateway session task panicked"),
            }
        }

        self.inner.state.set(SessionState::Disconnected);
        self.inner.session.reset();
        *self.inner.outbound.lock() = None;
        Ok(())
    }

    /// Wait until the session task ends; returns its fatal error, if any
    pub async fn wait(&self) -> ClientResult<()> {
        let handle = self.task.lock().take();
        match handle {
            Some(handle) => handle.await.map_err(ClientError::internal)?,
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    /// Receive every state change from now on
    #[must_use]
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.session.id()
    }

    /// Last accepted dispatch sequence
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.inner.session.sequence()
    }

    /// Heartbeat round trip of the last ack
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.inner.heartbeat.latency()
    }

    #[must_use]
    pub fn shard_id(&self) -> u32 {
        self.inner.config.shard_id
    }

    pub async fn update_presence(&self, presence: &PresenceUpdatePayload) -> ClientResult<()> {
        if !presence.is_valid_status() {
            return Err(ClientError::InvalidRequest(format!("invalid status: {}", presence.status)));
        }
        self.send(&GatewayMessage::presence_update(presence)?).await
    }

    /// Ask the server to stream every member of a guild as GUILD_MEMBERS_CHUNK events
    pub async fn request_guild_members(&self, guild_id: Snowflake) -> ClientResult<()> {
        let payload = RequestGuildMembersPayload::all(guild_id.to_string());
        self.send(&GatewayMessage::request_guild_members(&payload)?).await
    }

    async fn send(&self, message: &GatewayMessage) -> ClientResult<()> {
        if self.state() != SessionState::Connected {
            return Err(ClientError::connection("gateway session is not connected"));
        }
        let outbound = self
            .inner
            .outbound
            .lock()
            .clone()
            .ok_or_else(|| ClientError::connection("gateway session is not connected"))?;
        send_frame(&outbound, message).await
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("shard", &self.inner.config.shard_id)
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

async fn run(inner: Arc<Inner>, shutdown: ShutdownSignal) -> ClientResult<()> {
    let backoff = BackoffPolicy::for_gateway(&inner.config);
    let mut failures: u32 = 0;
    let mut force_refresh = false;

    let result = loop {
        if shutdown.is_triggered() {
            break Ok(());
        }

        let resuming = inner.session.is_resumable();
        inner.state.set(if resuming {
            SessionState::Resuming
        } else {
            SessionState::Connecting
        });

        let mut established = false;
        let outcome = match connect(&inner, force_refresh, &shutdown).await {
            Ok(Some(connection)) => {
                run_connection(&inner, connection, resuming, &shutdown, &mut established).await
            }
            Ok(None) => Outcome::Shutdown,
            Err(e) if e.is_cancelled() => Outcome::Shutdown,
            Err(e) if e.is_fatal() => Outcome::Fatal(e),
            Err(e) => Outcome::Retry(e),
        };
        *inner.outbound.lock() = None;
        force_refresh = false;

        let error = match outcome {
            Outcome::Shutdown => break Ok(()),
            Outcome::Fatal(e) => {
                tracing::error!(shard = inner.config.shard_id, error = %e, "Gateway session stopped");
                break Err(e);
            }
            Outcome::Reconnect { resume } => {
                if !resume {
                    inner.session.reset();
                }
                if established {
                    failures = 0;
                    continue;
                }
                ClientError::connection("connection closed before the session was established")
            }
            Outcome::InvalidSession => {
                inner.session.reset();
                inner.state.set(SessionState::Connecting);
                let delay = Duration::from_millis(rand::thread_rng().gen_range(INVALID_SESSION_DELAY_MS));
                tracing::info!(delay_ms = delay.as_millis() as u64, "Identifying again after invalid session");
                if !sleep_unless_shutdown(&shutdown, delay).await {
                    break Ok(());
                }
                continue;
            }
            Outcome::Retry(e) => {
                force_refresh = true;
                e
            }
        };

        failures += 1;
        if !backoff.should_retry(failures) {
            tracing::error!(
                shard = inner.config.shard_id,
                attempts = failures,
                error = %error,
                "Gateway connection attempts exhausted"
            );
            break Err(ClientError::connection(format!(
                "gave up after {failures} attempts: {error}"
            )));
        }

        let delay = backoff.next_delay(failures);
        tracing::warn!(
            shard = inner.config.shard_id,
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Gateway connection failed, retrying"
        );
        if !sleep_unless_shutdown(&shutdown, delay).await {
            break Ok(());
        }
    };

    inner.heartbeat.reset();
    inner.session.reset();
    inner.state.set(SessionState::Disconnected);
    result
}

async fn connect(
    inner: &Inner,
    force_refresh: bool,
    shutdown: &ShutdownSignal,
) -> ClientResult<Option<GatewayConnection>> {
    let work = async {
        let base = inner.urls.gateway_url(force_refresh).await?;
        let url = gateway_url_with_query(&base);
        tracing::debug!(url = %url, "Connecting to gateway");
        inner.transport.connect(&url).await
    };

    tokio::select! {
        () = shutdown.wait() => Ok(None),
        result = work => result.map(Some),
    }
}

/// Aborts the heartbeat task when the connection ends
struct HeartbeatTask(JoinHandle<()>);

impl Drop for HeartbeatTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_connection(
    inner: &Arc<Inner>,
    connection: GatewayConnection,
    resuming: bool,
    shutdown: &ShutdownSignal,
    established: &mut bool,
) -> Outcome {
    let GatewayConnection {
        outbound,
        mut inbound,
    } = connection;
    inner.heartbeat.reset();
    *inner.outbound.lock() = Some(outbound.clone());

    if !resuming {
        inner.state.set(SessionState::AwaitingHello);
    }

    let interval = match await_hello(inner, &mut inbound, shutdown).await {
        Ok(interval) => interval,
        Err(outcome) => {
            let code = match outcome {
                Outcome::Shutdown => Some(CloseCode::Normal),
                Outcome::Retry(_) => Some(CloseCode::UnknownError),
                _ => None,
            };
            if let Some(code) = code {
                let _ = outbound.send(Outbound::Close(code.as_u16())).await;
            }
            return outcome;
        }
    };

    let handshake = if resuming {
        let payload = ResumePayload {
            token: inner.token.clone(),
            session_id: inner.session.id().unwrap_or_default(),
            seq: inner.session.sequence().unwrap_or_default(),
        };
        tracing::info!(session_id = %payload.session_id, sequence = payload.seq, "Resuming gateway session");
        GatewayMessage::resume(&payload)
    } else {
        inner.state.set(SessionState::Identifying);
        let payload = IdentifyPayload::new(
            inner.token.clone(),
            inner.config.shard_id,
            inner.config.shard_count,
            inner.config.large_threshold,
        );
        GatewayMessage::identify(&payload)
    };
    let sent = match handshake {
        Ok(frame) => send_frame(&outbound, &frame).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = sent {
        return Outcome::Retry(e);
    }

    let mut heartbeat = HeartbeatTask(tokio::spawn(run_heartbeat(
        Arc::clone(&inner.heartbeat),
        Arc::clone(&inner.session),
        outbound.clone(),
        interval,
    )));

    loop {
        let frame = tokio::select! {
            () = shutdown.wait() => {
                let _ = outbound.send(Outbound::Close(CloseCode::Normal.as_u16())).await;
                return Outcome::Shutdown;
            }
            _ = &mut heartbeat.0 => {
                return restart(&outbound, true).await;
            }
            frame = inbound.recv() => frame,
        };

        let text = match frame {
            Some(Inbound::Text(text)) => text,
            Some(Inbound::Closed(code)) => return closed_outcome(code),
            None => return closed_outcome(None),
        };

        if let Some(outcome) = handle_frame(inner, &outbound, &text, established).await {
            return outcome;
        }
    }
}

async fn await_hello(
    inner: &Inner,
    inbound: &mut mpsc::Receiver<Inbound>,
    shutdown: &ShutdownSignal,
) -> Result<Duration, Outcome> {
    let first = tokio::select! {
        () = shutdown.wait() => return Err(Outcome::Shutdown),
        frame = tokio::time::timeout(inner.config.hello_timeout(), inbound.recv()) => frame,
    };

    match first {
        Err(_) => Err(Outcome::Retry(ClientError::protocol("no hello frame before timeout"))),
        Ok(None) => Err(closed_outcome(None)),
        Ok(Some(Inbound::Closed(code))) => Err(closed_outcome(code)),
        Ok(Some(Inbound::Text(text))) => {
            let interval = GatewayMessage::from_json(&text)
                .ok()
                .and_then(|message| message.as_hello_interval());
            match interval {
                Some(ms) if ms > 0 => {
                    tracing::debug!(heartbeat_interval_ms = ms, "Hello received");
                    Ok(Duration::from_millis(ms))
                }
                _ => {
                    tracing::warn!(frame = %text, "First gateway frame was not a valid hello");
                    Err(Outcome::Retry(ClientError::protocol("first frame was not a valid hello")))
                }
            }
        }
    }
}

async fn handle_frame(
    inner: &Inner,
    outbound: &mpsc::Sender<Outbound>,
    text: &str,
    established: &mut bool,
) -> Option<Outcome> {
    let message = match GatewayMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed gateway frame");
            return Some(restart(outbound, true).await);
        }
    };
    tracing::trace!(frame = %message, "Gateway frame received");

    match message.op {
        OpCode::Dispatch => return handle_dispatch(inner, outbound, &message, established).await,
        OpCode::Heartbeat => {
            inner.heartbeat.beat(outbound, inner.session.sequence()).await;
        }
        OpCode::HeartbeatAck => inner.heartbeat.ack(),
        OpCode::Reconnect => {
            tracing::info!("Server requested reconnect");
            return Some(restart(outbound, true).await);
        }
        OpCode::InvalidSession => {
            let resumable = message.as_invalid_session().unwrap_or(false);
            tracing::warn!(resumable, "Gateway session invalidated");
            if resumable {
                return Some(restart(outbound, true).await);
            }
            let _ = outbound.send(Outbound::Close(CloseCode::Normal.as_u16())).await;
            return Some(Outcome::InvalidSession);
        }
        OpCode::Hello => tracing::debug!("Ignoring repeated hello"),
        op => tracing::warn!(op = %op, "Ignoring unexpected op code from server"),
    }
    None
}

async fn handle_dispatch(
    inner: &Inner,
    outbound: &mpsc::Sender<Outbound>,
    message: &GatewayMessage,
    established: &mut bool,
) -> Option<Outcome> {
    let Some((name, sequence, data)) = message.as_dispatch() else {
        tracing::warn!("Dispatch frame without event name or sequence");
        return Some(restart(outbound, true).await);
    };

    match inner.session.check_sequence(sequence) {
        SequenceCheck::Accept => inner.session.advance(sequence),
        SequenceCheck::Duplicate => {
            tracing::warn!(event = name, sequence, "Duplicate sequence number, frame rejected");
            return None;
        }
        SequenceCheck::Regressed => {
            tracing::warn!(
                event = name,
                sequence,
                last = ?inner.session.sequence(),
                "Sequence number went backwards, reconnecting"
            );
            return Some(restart(outbound, true).await);
        }
    }

    let kind = GatewayEventType::parse(name);
    match kind {
        Some(GatewayEventType::Ready) => match serde_json::from_value::<ReadyPayload>(data.clone()) {
            Ok(ready) => {
                inner.session.set_id(ready.session_id.clone());
                *established = true;
                inner.state.set(SessionState::Connected);
                tracing::info!(
                    session_id = %ready.session_id,
                    shard = inner.config.shard_id,
                    guilds = ready.guilds.len(),
                    "Gateway session ready"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed READY payload");
                return Some(restart(outbound, false).await);
            }
        },
        Some(GatewayEventType::Resumed) => {
            *established = true;
            inner.state.set(SessionState::Connected);
            tracing::info!(session_id = ?inner.session.id(), sequence, "Gateway session resumed");
        }
        _ => {}
    }

    let affected = match kind {
        Some(kind) => apply_event(&inner.cache, kind, data).unwrap_or_else(|e| {
            tracing::warn!(event = name, sequence, error = %e, "Failed to apply event to cache");
            Vec::new()
        }),
        None => {
            tracing::debug!(event = name, sequence, "Unmodelled dispatch event");
            Vec::new()
        }
    };

    if kind == Some(GatewayEventType::GuildCreate) {
        request_offline_members(inner, outbound, data).await;
    }

    let event = GatewayEvent {
        name: name.to_string(),
        kind,
        sequence,
        shard: inner.config.shard_id,
        affected,
        data: data.clone(),
    };
    inner.handlers.dispatch(&event, inner.config.handler_timeout()).await;
    None
}

/// Under full retention, large guilds arrive without offline members; ask for them
async fn request_offline_members(inner: &Inner, outbound: &mpsc::Sender<Outbound>, guild: &Value) {
    if !inner.cache.retention_policy().requests_offline_members()
        || guild.get("large").and_then(Value::as_bool) != Some(true)
    {
        return;
    }
    let Some(guild_id) = guild.get("id").and_then(Snowflake::from_json) else {
        return;
    };

    let payload = RequestGuildMembersPayload::all(guild_id.to_string());
    let sent = match GatewayMessage::request_guild_members(&payload) {
        Ok(frame) => send_frame(outbound, &frame).await,
        Err(e) => Err(e.into()),
    };
    match sent {
        Ok(()) => tracing::debug!(guild = %guild_id, "Requested offline members of large guild"),
        Err(e) => tracing::warn!(guild = %guild_id, error = %e, "Failed to request guild members"),
    }
}

/// Close with a non-1000 code so the session stays resumable, then reconnect
async fn restart(outbound: &mpsc::Sender<Outbound>, resume: bool) -> Outcome {
    let _ = outbound.send(Outbound::Close(CloseCode::UnknownError.as_u16())).await;
    Outcome::Reconnect { resume }
}

fn closed_outcome(code: Option<u16>) -> Outcome {
    match CloseCode::action_for(code) {
        CloseAction::Resume => {
            tracing::info!(close_code = ?code, "Gateway connection closed, will resume");
            Outcome::Reconnect { resume: true }
        }
        CloseAction::Reidentify => {
            tracing::info!(close_code = ?code, "Gateway connection closed, session not resumable");
            Outcome::Reconnect { resume: false }
        }
        CloseAction::Fatal => {
            let known = code.and_then(CloseCode::from_u16);
            let message = known.map_or_else(|| format!("closed with {code:?}"), |c| c.to_string());
            if known == Some(CloseCode::AuthenticationFailed) {
                Outcome::Fatal(ClientError::Auth(message))
            } else {
                Outcome::Fatal(ClientError::protocol(message))
            }
        }
    }
}

async fn send_frame(outbound: &mpsc::Sender<Outbound>, message: &GatewayMessage) -> ClientResult<()> {
    let json = message.to_json()?;
    tracing::debug!(op = %message.op, "Sending gateway frame");
    outbound
        .send(Outbound::Text(json))
        .await
        .map_err(|_| ClientError::connection("gateway connection closed"))
}

/// Returns false if shutdown was triggered first
async fn sleep_unless_shutdown(shutdown: &ShutdownSignal, delay: Duration) -> bool {
    tokio::select! {
        () = shutdown.wait() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
