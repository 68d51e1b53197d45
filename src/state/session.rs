use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::config::Config;
use crate::state::bitmap::SeqBitmap;
use crate::state::stats::RttStats;
use crate::timing::{MICROS_PER_SEC, TimeVal, elapsed_micros};

/// Host being pinged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub original: String,
    pub resolved: Ipv4Addr,
}

impl Target {
    pub fn new(original: String, resolved: Ipv4Addr) -> Self {
        Self { original, resolved }
    }
}

/// How a valid echo reply was accounted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    First,
    Duplicate,
}

/// Mutable state of one ping run, owned by the event loop
#[derive(Debug)]
pub struct Session {
    pub target: Target,
    pub config: Config,
    /// ICMP identifier stamped on every request
    pub identifier: u16,
    /// Last sequence number handed out
    pub sequence: u16,
    pub sent: u32,
    pub received: u32,
    pub duplicates: u32,
    pub stats: RttStats,
    pub bitmap: SeqBitmap,
    pub started_at: TimeVal,
    pub started_wall: DateTime<Utc>,
    pub last_send: TimeVal,
}

impl Session {
    pub fn new(target: Target, config: Config, identifier: u16) -> Self {
        Self {
            target,
            config,
            identifier,
            sequence: 0,
            sent: 0,
            received: 0,
            duplicates: 0,
            stats: RttStats::new(),
            bitmap: SeqBitmap::new(),
            started_at: TimeVal::ZERO,
            started_wall: Utc::now(),
            last_send: TimeVal::ZERO,
        }
    }

    /// Mark the run start
    pub fn start(&mut self, now: TimeVal) {
        self.started_at = now;
        self.started_wall = Utc::now();
    }

    /// Advance to the next sequence number.
    ///
    /// After 65536 sends the counter wraps and numbers are reused; the bit of
    /// a reissued number is cleared so its new reply is not taken for a
    /// duplicate of the old one.
    pub fn next_sequence(&mut self) -> u16 {
        self.sequence = self.sequence.wrapping_add(1);
        self.bitmap.clear(self.sequence);
        self.sequence
    }

    pub fn record_sent(&mut self, now: TimeVal) {
        self.sent += 1;
        self.last_send = now;
    }

    /// Account a valid echo reply. The RTT only feeds the statistics for the
    /// first reply of a sequence.
    pub fn record_reply(&mut self, sequence: u16, rtt_us: Option<i64>) -> ReplyStatus {
        if self.bitmap.test(sequence) {
            self.duplicates += 1;
            return ReplyStatus::Duplicate;
        }

        self.bitmap.set(sequence);
        self.received += 1;
        if let Some(rtt) = rtt_us {
            self.stats.update(rtt);
        }
        ReplyStatus::First
    }

    pub fn is_answered(&self, sequence: u16) -> bool {
        self.bitmap.test(sequence)
    }

    /// Interval between sends as a time value
    pub fn interval(&self) -> TimeVal {
        TimeVal::from_duration(self.config.interval)
    }

    /// Every requested reply has arrived
    pub fn count_reached(&self) -> bool {
        self.config.count.is_some_and(|c| self.received >= c as u32)
    }

    /// No more requests may be sent
    pub fn sends_exhausted(&self) -> bool {
        self.config.count.is_some_and(|c| self.sent >= c as u32)
    }

    /// The overall run time limit has passed
    pub fn deadline_passed(&self, now: TimeVal) -> bool {
        self.config.timeout.is_some_and(|t| {
            elapsed_micros(self.started_at, now) >= i64::from(t) * MICROS_PER_SEC
        })
    }

    /// Loss percentage
    pub fn loss_pct(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.sent.saturating_sub(self.received) as f64 * 100.0 / self.sent as f64
        }
    }

    pub fn summary(&self) -> Summary {
        let rtt = match (self.stats.min(), self.stats.mean(), self.stats.max()) {
            (Some(min_us), Some(avg_us), Some(max_us)) => Some(RttSummary {
                min_us,
                avg_us,
                max_us,
                stddev_us: self.stats.stddev(),
            }),
            _ => None,
        };

        Summary {
            target: self.target.original.clone(),
            address: self.target.resolved,
            started_at: self.started_wall,
            transmitted: self.sent,
            received: self.received,
            duplicates: self.duplicates,
            loss_pct: self.loss_pct(),
            rtt,
        }
    }
}

/// RTT figures of a finished run, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RttSummary {
    pub min_us: i64,
    pub avg_us: f64,
    pub max_us: i64,
    pub stddev_us: f64,
}

/// Final statistics of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub target: String,
    pub address: Ipv4Addr,
    pub started_at: DateTime<Utc>,
    pub transmitted: u32,
    pub received: u32,
    pub duplicates: u32,
    pub loss_pct: f64,
    pub rtt: Option<RttSummary>,
}
