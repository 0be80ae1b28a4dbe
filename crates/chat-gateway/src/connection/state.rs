//! Session state machine values

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::broadcast;

/// Gateway session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    /// No connection; initial state and end of every run
    Disconnected = 0,
    /// Opening the transport connection
    Connecting = 1,
    /// Connected, waiting for the hello frame
    AwaitingHello = 2,
    /// Identify sent, waiting for READY
    Identifying = 3,
    /// Steady state
    Connected = 4,
    /// Reconnecting to resume an existing session
    Resuming = 5,
}

impl SessionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::AwaitingHello,
            3 => Self::Identifying,
            4 => Self::Connected,
            5 => Self::Resuming,
            _ => Self::Disconnected,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Connected => "connected",
            Self::Resuming => "resuming",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Current state plus a broadcast of every change
#[derive(Debug)]
pub(crate) struct StateCell {
    state: AtomicU8,
    transitions: broadcast::Sender<StateTransition>,
    shard: u32,
}

impl StateCell {
    const CHANNEL_CAPACITY: usize = 64;

    pub(crate) fn new(shard: u32) -> Self {
        let (transitions, _) = broadcast::channel(Self::CHANNEL_CAPACITY);
        Self {
            state: AtomicU8::new(SessionState::Disconnected as u8),
            transitions,
            shard,
        }
    }

    pub(crate) fn get(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, to: SessionState) {
        let from = SessionState::from_u8(self.state.swap(to as u8, Ordering::AcqRel));
        if from == to {
            return;
        }
        tracing::info!(shard = self.shard, from = %from, to = %to, "Gateway state changed");
        // No subscribers is fine
        let _ = self.transitions.send(StateTransition { from, to });
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }
}
