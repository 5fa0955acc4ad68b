//! # Ping Interval
//!
//! Clamped duration bounding how often one session may be pinged. Built
//! only through [`Interval::of`], so every live value sits inside
//! [`MIN_PING_INTERVAL`]..=[`MAX_PING_INTERVAL`] no matter what a command
//! option or a hand-edited config file asked for.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;

/// Smallest allowed ping interval.
pub const MIN_PING_INTERVAL: Interval = Interval {
    magnitude: 30,
    unit: IntervalUnit::Minutes,
};

/// Largest allowed ping interval.
pub const MAX_PING_INTERVAL: Interval = Interval {
    magnitude: 7,
    unit: IntervalUnit::Days,
};

/// Interval used when a session enables reminders without picking one.
pub const DEFAULT_PING_INTERVAL: Interval = Interval {
    magnitude: 4,
    unit: IntervalUnit::Hours,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    const fn minutes_per(self) -> i64 {
        match self {
            IntervalUnit::Minutes => 1,
            IntervalUnit::Hours => 60,
            IntervalUnit::Days => 24 * 60,
        }
    }
}

/// A `{magnitude, unit}` pair, kept as written but always in range.
///
/// Out-of-range requests are clamped, not rejected, including on
/// deserialization. A config file edited to `-5 days` degrades to the
/// minimum instead of crashing the service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "RawInterval")]
pub struct Interval {
    magnitude: i64,
    unit: IntervalUnit,
}

/// Shape on disk, before the clamp is applied.
#[derive(Deserialize)]
struct RawInterval {
    magnitude: i64,
    unit: IntervalUnit,
}

impl From<RawInterval> for Interval {
    fn from(raw: RawInterval) -> Self {
        Interval::of(raw.magnitude, raw.unit)
    }
}

impl Interval {
    /// Construct an interval, clamping into the allowed range.
    pub fn of(magnitude: i64, unit: IntervalUnit) -> Self {
        let candidate = Interval { magnitude, unit };
        if candidate.as_nanos() < MIN_PING_INTERVAL.as_nanos() {
            MIN_PING_INTERVAL
        } else if candidate.as_nanos() > MAX_PING_INTERVAL.as_nanos() {
            MAX_PING_INTERVAL
        } else {
            candidate
        }
    }

    /// Common fine-grained unit for comparisons across units.
    fn as_nanos(&self) -> i128 {
        self.magnitude as i128 * self.unit.minutes_per() as i128 * 60 * 1_000_000_000
    }

    /// Coarsen to the scheduler's discrete unit (whole minutes).
    pub fn as_minutes(&self) -> u64 {
        (self.magnitude * self.unit.minutes_per()) as u64
    }

    pub fn to_duration(&self) -> Duration {
        Duration::from_secs(self.as_minutes() * 60)
    }
}

impl PartialEq for Interval {
    fn eq(&self, other: &Self) -> bool {
        self.as_nanos() == other.as_nanos()
    }
}

impl Eq for Interval {}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_nanos().cmp(&other.as_nanos())
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = match self.unit {
            IntervalUnit::Minutes => "minute",
            IntervalUnit::Hours => "hour",
            IntervalUnit::Days => "day",
        };
        if self.magnitude == 1 {
            write!(f, "1 {unit}")
        } else {
            write!(f, "{} {unit}s", self.magnitude)
        }
    }
}
