//! Frame timestamp
//!
//! A (seconds, nanoseconds) pair with saturating setters. Values outside the
//! representable range are clamped to the limits instead of being rejected;
//! arithmetic that leaves the range yields the [`Timestamp::INVALID`] sentinel.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

/// Upper limit for the seconds field
pub const SECONDS_LIMIT: u32 = 4_290_000_000;

/// Upper limit for the nanoseconds field
pub const NANOSECONDS_LIMIT: u32 = 999_999_999;

/// Marker stored in both fields of an invalid timestamp
pub const INVALID_FIELD: u32 = 0xFFFF_FFEE;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Timestamp attached to every wire frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp {
    seconds: u32,
    nanoseconds: u32,
}

impl Timestamp {
    /// Sentinel for results that cannot be represented
    pub const INVALID: Timestamp = Timestamp {
        seconds: INVALID_FIELD,
        nanoseconds: INVALID_FIELD,
    };

    /// Saturating constructor: out-of-range fields are clamped to their limits
    pub fn new(seconds: u32, nanoseconds: u32) -> Self {
        Self {
            seconds: seconds.min(SECONDS_LIMIT),
            nanoseconds: nanoseconds.min(NANOSECONDS_LIMIT),
        }
    }

    /// Current wall-clock time relative to the Unix epoch
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        let seconds = u32::try_from(now.timestamp().max(0)).unwrap_or(u32::MAX);
        Self::new(seconds, now.timestamp_subsec_nanos())
    }

    pub fn from_millis(millis: u32) -> Self {
        let millis = u64::from(millis);
        Self::new((millis / 1000) as u32, ((millis % 1000) * 1_000_000) as u32)
    }

    pub fn from_micros(micros: u32) -> Self {
        let micros = u64::from(micros);
        Self::new((micros / 1_000_000) as u32, ((micros % 1_000_000) * 1000) as u32)
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    pub fn nanoseconds(&self) -> u32 {
        self.nanoseconds
    }

    /// Set the seconds field, clamping to [`SECONDS_LIMIT`]
    pub fn set_seconds(&mut self, seconds: u32) {
        self.seconds = seconds.min(SECONDS_LIMIT);
    }

    /// Set the nanoseconds field, clamping to [`NANOSECONDS_LIMIT`]
    pub fn set_nanoseconds(&mut self, nanoseconds: u32) {
        self.nanoseconds = nanoseconds.min(NANOSECONDS_LIMIT);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Total value in microseconds, `None` for the invalid sentinel
    pub fn as_micros(&self) -> Option<u64> {
        self.is_valid().then(|| {
            u64::from(self.seconds) * 1_000_000 + u64::from(self.nanoseconds) / 1000
        })
    }

    /// Sum of two timestamps
    ///
    /// A nanosecond overflow carries exactly one second. The invalid sentinel is
    /// returned when either operand is invalid or the seconds leave the range.
    pub fn saturating_add(self, rhs: Timestamp) -> Timestamp {
        if !self.is_valid() || !rhs.is_valid() {
            return Self::INVALID;
        }

        let mut nanoseconds = u64::from(self.nanoseconds) + u64::from(rhs.nanoseconds);
        let mut seconds = u64::from(self.seconds) + u64::from(rhs.seconds);
        if nanoseconds >= NANOS_PER_SECOND {
            nanoseconds -= NANOS_PER_SECOND;
            seconds += 1;
        }

        if seconds > u64::from(SECONDS_LIMIT) {
            return Self::INVALID;
        }
        Self {
            seconds: seconds as u32,
            nanoseconds: nanoseconds as u32,
        }
    }

    /// Difference of two timestamps, the invalid sentinel when `rhs > self`
    pub fn checked_subtract(self, rhs: Timestamp) -> Timestamp {
        if !self.is_valid() || !rhs.is_valid() || rhs > self {
            return Self::INVALID;
        }

        let mut seconds = self.seconds - rhs.seconds;
        let nanoseconds = if self.nanoseconds >= rhs.nanoseconds {
            self.nanoseconds - rhs.nanoseconds
        } else {
            // rhs <= self guarantees seconds >= 1 here
            seconds -= 1;
            (NANOS_PER_SECOND as u32 - rhs.nanoseconds) + self.nanoseconds
        };
        Self {
            seconds,
            nanoseconds,
        }
    }

    /// Big-endian wire representation: seconds then nanoseconds
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.seconds.to_be_bytes());
        bytes[4..].copy_from_slice(&self.nanoseconds.to_be_bytes());
        bytes
    }

    /// Parse the wire representation, clamping out-of-range fields
    pub fn from_bytes(bytes: &[u8; 8]) -> Self {
        let seconds = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let nanoseconds = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if seconds == INVALID_FIELD && nanoseconds == INVALID_FIELD {
            return Self::INVALID;
        }
        Self::new(seconds, nanoseconds)
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seconds
            .cmp(&other.seconds)
            .then(self.nanoseconds.cmp(&other.nanoseconds))
    }
}

impl Add for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Timestamp) -> Timestamp {
        self.saturating_add(rhs)
    }
}

impl Sub for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Timestamp) -> Timestamp {
        self.checked_subtract(rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "invalid");
        }
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}
