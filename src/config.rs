use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cli::Args;
use crate::probe::icmp::{DEFAULT_PAYLOAD_SIZE, ICMP_HEADER_SIZE};

/// Runtime configuration derived from CLI args, immutable once the run starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// ICMP message size including the 8-byte header
    pub packet_size: usize,
    /// Interval between requests
    #[serde(with = "duration_serde")]
    pub interval: Duration,
    /// Number of requests to send (None = until interrupted)
    pub count: Option<u16>,
    /// Overall run time limit in seconds
    pub timeout: Option<u16>,
    /// Outgoing IP TTL (None = system default)
    pub ttl: Option<u8>,
    /// Requests sent back to back after the first one
    pub preload: u16,
    pub verbose: bool,
    pub quiet: bool,
    pub flood: bool,
}

impl Config {
    /// Payload bytes after the ICMP header
    pub fn payload_size(&self) -> usize {
        self.packet_size.saturating_sub(ICMP_HEADER_SIZE)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            packet_size: ICMP_HEADER_SIZE + DEFAULT_PAYLOAD_SIZE,
            interval: Duration::from_secs(1),
            count: None,
            timeout: None,
            ttl: None,
            preload: 0,
            verbose: false,
            quiet: false,
            flood: false,
        }
    }
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            packet_size: ICMP_HEADER_SIZE + args.size,
            interval: args.interval_duration(),
            count: args.count,
            timeout: args.timeout,
            ttl: args.ttl,
            preload: args.preload,
            verbose: args.verbose,
            quiet: args.quiet,
            flood: args.flood,
        }
    }
}

/// Serde helper for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
