//! Heartbeat bookkeeping and the heartbeat task
//!
//! The task only touches heartbeat timestamps and the outbound queue.

use super::session::Session;
use super::transport::Outbound;
use crate::protocol::GatewayMessage;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

/// Heartbeat timestamps of the current connection
#[derive(Debug, Default)]
pub struct HeartbeatClock {
    awaiting_ack: AtomicBool,
    last_sent: Mutex<Option<Instant>>,
    latency: Mutex<Option<Duration>>,
}

impl HeartbeatClock {
    /// Clear state for a new connection
    pub fn reset(&self) {
        self.awaiting_ack.store(false, Ordering::Release);
        *self.last_sent.lock() = None;
    }

    #[must_use]
    pub fn is_awaiting_ack(&self) -> bool {
        self.awaiting_ack.load(Ordering::Acquire)
    }

    /// Round trip of the last acknowledged heartbeat
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        *self.latency.lock()
    }

    /// Queue a heartbeat frame and start waiting for its ack
    pub async fn beat(&self, outbound: &mpsc::Sender<Outbound>, sequence: Option<u64>) -> bool {
        let frame = match GatewayMessage::heartbeat(sequence).to_json() {
            Ok(json) => json,
            Err(_) => return false,
        };
        if outbound.send(Outbound::Text(frame)).await.is_err() {
            return false;
        }
        *self.last_sent.lock() = Some(Instant::now());
        self.awaiting_ack.store(true, Ordering::Release);
        tracing::trace!(sequence = ?sequence, "Heartbeat sent");
        true
    }

    pub fn ack(&self) {
        self.awaiting_ack.store(false, Ordering::Release);
        if let Some(sent) = *self.last_sent.lock() {
            let rtt = sent.elapsed();
            *self.latency.lock() = Some(rtt);
            tracing::trace!(latency_ms = rtt.as_millis() as u64, "Heartbeat acknowledged");
        }
    }
}

/// Send heartbeats every `interval` until an ack goes missing or the
/// connection's outbound queue closes. Returning means the connection is dead.
pub async fn run_heartbeat(
    clock: Arc<HeartbeatClock>,
    session: Arc<Session>,
    outbound: mpsc::Sender<Outbound>,
    interval: Duration,
) {
    let jitter = rand::thread_rng().gen_range(0.0..1.0);
    let mut ticker = tokio::time::interval_at(Instant::now() + interval.mul_f64(jitter), interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if clock.is_awaiting_ack() {
            tracing::warn!(
                interval_ms = interval.as_millis() as u64,
                "Heartbeat not acknowledged, connection zombied"
            );
            return;
        }

        if !clock.beat(&outbound, session.sequence()).await {
            tracing::debug!("Outbound queue closed, heartbeat stopped");
            return;
        }
    }
}
