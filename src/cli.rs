use clap::Parser;
use std::time::Duration;

use crate::probe::icmp::MAX_PAYLOAD_SIZE;

/// Shortest interval accepted without --flood, in seconds
pub const MIN_INTERVAL_SECS: f64 = 0.2;
/// Longest interval accepted, in seconds
pub const MAX_INTERVAL_SECS: f64 = 65.535;
/// Interval used by --flood when -i is not given
pub const FLOOD_INTERVAL: Duration = Duration::from_millis(10);

/// Send ICMP ECHO_REQUEST packets to network hosts
#[derive(Parser, Debug, Clone)]
#[command(name = "pingr")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target host (IPv4 address or hostname)
    pub host: String,

    /// Stop after sending (and receiving) this many packets
    #[arg(short = 'c', long = "count")]
    pub count: Option<u16>,

    /// Wait this many seconds between packets
    #[arg(short = 'i', long = "interval")]
    pub interval: Option<f64>,

    /// Stop after this many seconds regardless of packets received
    #[arg(short = 'w', long = "timeout")]
    pub timeout: Option<u16>,

    /// IP time to live for outgoing packets
    #[arg(long = "ttl")]
    pub ttl: Option<u8>,

    /// Number of data bytes to send
    #[arg(short = 's', long = "size", default_value = "56")]
    pub size: usize,

    /// Send this many packets as fast as possible before normal behaviour
    #[arg(short = 'l', long = "preload", default_value = "0")]
    pub preload: u16,

    /// Flood ping: print a dot per request and a backspace per reply
    #[arg(short = 'f', long = "flood")]
    pub flood: bool,

    /// Quiet output: only the start banner and the summary
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Verbose output: packet dumps and debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Print the final summary as JSON
    #[arg(long = "json")]
    pub json: bool,
}

impl Args {
    /// Get send interval as Duration
    pub fn interval_duration(&self) -> Duration {
        match self.interval {
            Some(secs) => Duration::from_secs_f64(secs),
            None if self.flood => FLOOD_INTERVAL,
            None => Duration::from_secs(1),
        }
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.count == Some(0) {
            return Err("Count must be between 1 and 65535".into());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be between 1 and 65535 seconds".into());
        }

        if self.ttl == Some(0) {
            return Err("TTL must be between 1 and 255".into());
        }

        if let Some(interval) = self.interval {
            if !interval.is_finite() || interval <= 0.0 {
                return Err("Interval must be positive".into());
            }
            if interval > MAX_INTERVAL_SECS {
                return Err(format!(
                    "Interval cannot exceed {} seconds",
                    MAX_INTERVAL_SECS
                ));
            }
            // Sub-200ms intervals are flood territory
            if interval < MIN_INTERVAL_SECS && !self.flood {
                return Err(format!(
                    "Interval below {} seconds requires --flood",
                    MIN_INTERVAL_SECS
                ));
            }
        }

        if self.size > MAX_PAYLOAD_SIZE {
            return Err(format!("Packet size cannot exceed {} bytes", MAX_PAYLOAD_SIZE));
        }

        Ok(())
    }
}
