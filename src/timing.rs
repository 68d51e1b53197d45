//! Wall-clock time values and deadline arithmetic.
//!
//! Timestamps travel inside echo payloads and come back from the kernel as
//! `SO_TIMESTAMP` control messages, both of which are seconds/microseconds
//! pairs on the realtime clock. `TimeVal` mirrors that representation so the
//! round-trip math never has to convert between clocks.

use std::ops::{Add, Sub};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const MICROS_PER_SEC: i64 = 1_000_000;

/// Encoded size of a `TimeVal` inside an echo payload
pub const TIMEVAL_WIRE_SIZE: usize = 16;

/// Seconds + microseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeVal {
    pub sec: i64,
    pub usec: i64,
}

impl TimeVal {
    pub const ZERO: TimeVal = TimeVal { sec: 0, usec: 0 };

    /// Build a normalized time value
    pub fn new(sec: i64, usec: i64) -> Self {
        let (sec, usec) = normalize(sec, usec);
        Self { sec, usec }
    }

    /// Current realtime clock reading
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => Self::from_duration(since),
            // Clock set before 1970: keep the sign instead of panicking
            Err(e) => Self::ZERO - Self::from_duration(e.duration()),
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new((ms / 1000) as i64, ((ms % 1000) * 1000) as i64)
    }

    pub fn from_micros(us: i64) -> Self {
        Self::new(0, us)
    }

    pub fn from_duration(d: Duration) -> Self {
        Self {
            sec: d.as_secs().min(i64::MAX as u64) as i64,
            usec: d.subsec_micros() as i64,
        }
    }

    /// Total microseconds, saturating on overflow
    pub fn as_micros(&self) -> i64 {
        self.sec
            .saturating_mul(MICROS_PER_SEC)
            .saturating_add(self.usec)
    }

    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.usec == 0
    }

    /// Timeout argument for poll(2), rounded up to whole milliseconds so a
    /// wait never returns before the deadline it was computed from
    pub fn poll_timeout_ms(&self) -> i32 {
        let micros = self.as_micros().max(0);
        let ms = micros / 1000 + i64::from(micros % 1000 != 0);
        ms.min(i32::MAX as i64) as i32
    }

    /// Big-endian wire encoding used at the start of echo payloads
    pub fn to_bytes(&self) -> [u8; TIMEVAL_WIRE_SIZE] {
        let mut out = [0u8; TIMEVAL_WIRE_SIZE];
        out[..8].copy_from_slice(&self.sec.to_be_bytes());
        out[8..].copy_from_slice(&self.usec.to_be_bytes());
        out
    }

    /// Decode a payload timestamp. Values are taken as-is (a peer may echo
    /// anything), callers must not assume they are normalized.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let sec: [u8; 8] = data.get(..8)?.try_into().ok()?;
        let usec: [u8; 8] = data.get(8..TIMEVAL_WIRE_SIZE)?.try_into().ok()?;
        Some(Self {
            sec: i64::from_be_bytes(sec),
            usec: i64::from_be_bytes(usec),
        })
    }
}

impl Add for TimeVal {
    type Output = TimeVal;

    fn add(self, rhs: TimeVal) -> TimeVal {
        TimeVal::new(
            self.sec.saturating_add(rhs.sec),
            self.usec.saturating_add(rhs.usec),
        )
    }
}

impl Sub for TimeVal {
    type Output = TimeVal;

    fn sub(self, rhs: TimeVal) -> TimeVal {
        TimeVal::new(
            self.sec.saturating_sub(rhs.sec),
            self.usec.saturating_sub(rhs.usec),
        )
    }
}

/// Bring `usec` into `[0, 1_000_000)` by carrying into or borrowing from `sec`.
/// The represented instant does not change.
pub fn normalize(sec: i64, usec: i64) -> (i64, i64) {
    let carry = usec.div_euclid(MICROS_PER_SEC);
    (sec.saturating_add(carry), usec.rem_euclid(MICROS_PER_SEC))
}

/// Microseconds from `start` to `end`. Negative when `end` precedes `start`.
pub fn elapsed_micros(start: TimeVal, end: TimeVal) -> i64 {
    end.sec
        .saturating_sub(start.sec)
        .saturating_mul(MICROS_PER_SEC)
        .saturating_add(end.usec.saturating_sub(start.usec))
}

/// Time left until `last_send + interval`, zero once the deadline has passed
pub fn remaining_until_deadline(last_send: TimeVal, interval: TimeVal, now: TimeVal) -> TimeVal {
    let remaining = (last_send + interval) - now;
    if remaining.sec < 0 {
        TimeVal::ZERO
    } else {
        remaining
    }
}
