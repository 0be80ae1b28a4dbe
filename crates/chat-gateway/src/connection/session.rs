//! Resumable session identity
//!
//! Written only by the delivery task; read from anywhere.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of checking an inbound dispatch sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Strictly greater than the last seen sequence
    Accept,
    /// Equal to the last seen sequence
    Duplicate,
    /// Lower than the last seen sequence
    Regressed,
}

/// Session identifier and last seen sequence number
#[derive(Debug, Default)]
pub struct Session {
    id: RwLock<Option<String>>,
    /// 0 means no dispatch seen yet; the service numbers from 1
    sequence: AtomicU64,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.id.read().clone()
    }

    pub fn set_id(&self, id: impl Into<String>) {
        *self.id.write() = Some(id.into());
    }

    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        match self.sequence.load(Ordering::Acquire) {
            0 => None,
            seq => Some(seq),
        }
    }

    #[must_use]
    pub fn check_sequence(&self, seq: u64) -> SequenceCheck {
        let last = self.sequence.load(Ordering::Acquire);
        match seq.cmp(&last) {
            std::cmp::Ordering::Greater => SequenceCheck::Accept,
            std::cmp::Ordering::Equal => SequenceCheck::Duplicate,
            std::cmp::Ordering::Less => SequenceCheck::Regressed,
        }
    }

    pub fn advance(&self, seq: u64) {
        self.sequence.store(seq, Ordering::Release);
    }

    /// Both a session id and a sequence are known
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.id.read().is_some() && self.sequence().is_some()
    }

    /// Forget the session; the next connection identifies from scratch
    pub fn reset(&self) {
        *self.id.write() = None;
        self.sequence.store(0, Ordering::Release);
    }
}
