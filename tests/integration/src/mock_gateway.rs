//! Scripted gateway
//!
//! Each [`MockGateway`] hands out prepared connections in order; the test
//! drives the server end of each through a [`GatewayPeer`].

use async_trait::async_trait;
use chat_common::{ClientError, ClientResult};
use chat_gateway::connection::{Inbound, Outbound};
use chat_gateway::protocol::GatewayMessage;
use chat_gateway::{GatewayConnection, GatewayTransport, SessionManager, SessionState, StateTransition};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// How long a peer waits for a client frame
const FRAME_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Default)]
pub struct MockGateway {
    connections: Mutex<VecDeque<GatewayConnection>>,
    urls: Mutex<Vec<String>>,
}

impl MockGateway {
    /// A gateway accepting `count` connections, and the server end of each
    pub fn with_connections(count: usize) -> (Arc<Self>, Vec<GatewayPeer>) {
        let gateway = Self::default();
        let mut peers = Vec::with_capacity(count);
        for _ in 0..count {
            let (connection, sent, frames) = GatewayConnection::pair();
            gateway.connections.lock().push_back(connection);
            peers.push(GatewayPeer { sent, frames });
        }
        (Arc::new(gateway), peers)
    }

    /// URLs the client connected to
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl GatewayTransport for MockGateway {
    async fn connect(&self, url: &str) -> ClientResult<GatewayConnection> {
        self.urls.lock().push(url.to_string());
        self.connections
            .lock()
            .pop_front()
            .ok_or_else(|| ClientError::connection("connection refused"))
    }
}

/// Server end of one connection
pub struct GatewayPeer {
    sent: mpsc::Receiver<Outbound>,
    frames: mpsc::Sender<Inbound>,
}

impl GatewayPeer {
    pub async fn push(&self, message: GatewayMessage) {
        let text = message.to_json().expect("frame serializes");
        self.frames.send(Inbound::Text(text)).await.expect("client reading");
    }

    pub async fn hello(&self, interval_ms: u64) {
        self.push(GatewayMessage::hello(interval_ms)).await;
    }

    pub async fn dispatch(&self, event: &str, sequence: u64, data: Value) {
        self.push(GatewayMessage::dispatch(event, sequence, data)).await;
    }

    pub async fn ready(&self, session_id: &str, sequence: u64) {
        self.dispatch(
            "READY",
            sequence,
            json!({"v": 6, "session_id": session_id, "user": {"id": "1", "username": "bot"}, "guilds": []}),
        )
        .await;
    }

    /// Drop the connection with a close code
    pub async fn close(&self, code: Option<u16>) {
        self.frames.send(Inbound::Closed(code)).await.expect("client reading");
    }

    /// Next client frame, heartbeats included
    pub async fn next_raw(&mut self) -> Outbound {
        tokio::time::timeout(FRAME_TIMEOUT, self.sent.recv())
            .await
            .expect("client frame before timeout")
            .expect("connection open")
    }

    /// Next client frame that is not a heartbeat
    pub async fn next(&mut self) -> Outbound {
        loop {
            let frame = self.next_raw().await;
            if let Outbound::Text(text) = &frame {
                let value: Value = serde_json::from_str(text).expect("client sends JSON");
                if value["op"] == 1 {
                    continue;
                }
            }
            return frame;
        }
    }

    /// Next non-heartbeat JSON frame
    pub async fn next_json(&mut self) -> Value {
        match self.next().await {
            Outbound::Text(text) => serde_json::from_str(&text).expect("client sends JSON"),
            Outbound::Close(code) => panic!("expected a frame, client closed with {code}"),
        }
    }

    /// Accept the connection: hello, expect identify, answer READY
    pub async fn handshake(&mut self, session_id: &str) -> Value {
        self.hello(45_000).await;
        let identify = self.next_json().await;
        assert_eq!(identify["op"], 2, "expected identify, got {identify}");
        self.ready(session_id, 1).await;
        identify
    }
}

/// Collects every state transition from subscription onwards
pub struct TransitionLog {
    rx: broadcast::Receiver<StateTransition>,
    seen: Vec<StateTransition>,
}

impl TransitionLog {
    pub fn new(manager: &SessionManager) -> Self {
        Self {
            rx: manager.subscribe_transitions(),
            seen: Vec::new(),
        }
    }

    /// Wait until the session enters `state`
    pub async fn wait_for(&mut self, state: SessionState) {
        if self.seen.iter().any(|t| t.to == state) {
            return;
        }
        tokio::time::timeout(FRAME_TIMEOUT, async {
            loop {
                let transition = self.rx.recv().await.expect("state channel open");
                self.seen.push(transition);
                if transition.to == state {
                    return;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("state {state} not reached; saw {:?}", self.states()));
    }

    /// Forget what was seen so far
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.seen.iter().map(|t| t.to).collect()
    }
}
