// SPDX-License-Identifier: GPL-3.0-only

//! Shared monotonic time base for capture and recording
//!
//! Capture samples and presented frames are both stamped with [`HostTime`],
//! so a [`SessionClock`] can place them on one timeline no matter which
//! thread produced them.

use std::ops::Add;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// A point on the process-wide monotonic clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostTime(Duration);

impl HostTime {
    /// Current time
    pub fn now() -> Self {
        let epoch = *EPOCH.get_or_init(Instant::now);
        Self(Instant::now().saturating_duration_since(epoch))
    }

    /// Zero when `earlier` is later than `self`
    pub fn saturating_since(&self, earlier: HostTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for HostTime {
    type Output = HostTime;

    fn add(self, rhs: Duration) -> HostTime {
        HostTime(self.0 + rhs)
    }
}

/// Origin for presentation timestamps of one recording
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: HostTime,
}

impl SessionClock {
    /// Clock whose origin is now
    pub fn start() -> Self {
        Self::with_origin(HostTime::now())
    }

    pub fn with_origin(origin: HostTime) -> Self {
        Self { origin }
    }

    pub fn origin(&self) -> HostTime {
        self.origin
    }

    /// Presentation timestamp of a sample stamped at `time`
    ///
    /// Samples stamped before the origin map to zero.
    pub fn presentation_time(&self, time: HostTime) -> Duration {
        time.saturating_since(self.origin)
    }
}
