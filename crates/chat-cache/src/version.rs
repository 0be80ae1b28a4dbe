//! Cache versions.
//!
//! Every cache write carries a [`Version`] issued by one [`VersionClock`].
//! Gateway events take a version when they are applied and REST fetches take
//! one before the request is sent, so both sources share a single total order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic write marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    pub const ZERO: Version = Version(0);

    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Issues strictly increasing versions
#[derive(Debug, Default)]
pub struct VersionClock {
    last: AtomicU64,
}

impl VersionClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next version
    pub fn next(&self) -> Version {
        Version(self.last.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Last version issued
    #[must_use]
    pub fn current(&self) -> Version {
        Version(self.last.load(Ordering::Acquire))
    }
}
