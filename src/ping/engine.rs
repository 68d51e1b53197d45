use anyhow::{Context, Result};
use log::{debug, trace, warn};
use std::io::{self, Write};

use crate::export::Reporter;
use crate::ping::receiver::process_datagram;
use crate::ping::signal::StopFlag;
use crate::probe::icmp::{build_echo_request, build_payload};
use crate::probe::socket::{Readiness, Transport};
use crate::state::{Session, Summary};
use crate::timing::{TimeVal, remaining_until_deadline};

/// Largest IPv4 datagram
const RECV_BUFFER_SIZE: usize = 65_536;

/// What the current readiness wait is bounded by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    /// Next send is due
    Interval,
    /// Overall run time limit
    Deadline,
}

/// Single-threaded ping loop: sends one request per interval and processes
/// replies as they become readable
pub struct Pinger<T: Transport, W: Write> {
    session: Session,
    transport: T,
    reporter: Reporter<W>,
    stop: StopFlag,
    recv_buffer: Vec<u8>,
}

impl<T: Transport, W: Write> Pinger<T, W> {
    pub fn new(session: Session, transport: T, reporter: Reporter<W>, stop: StopFlag) -> Self {
        Self {
            session,
            transport,
            reporter,
            stop,
            recv_buffer: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    /// Run until the count, the time limit or the stop flag ends the session.
    ///
    /// The summary is printed exactly once if anything was sent, also when the
    /// loop ends with an error. The transport is dropped on return.
    pub fn run(mut self) -> Result<Summary> {
        let outcome = self.run_loop();
        let summary = self.session.summary();

        if self.session.sent > 0
            && let Err(e) = self.reporter.print_summary(&summary)
        {
            if outcome.is_ok() {
                return Err(e.context("Failed to print summary"));
            }
            warn!("Failed to print summary: {:#}", e);
        }

        outcome?;
        Ok(summary)
    }

    fn run_loop(&mut self) -> Result<()> {
        self.session.start(TimeVal::now());
        self.reporter.print_start(
            &self.session.target,
            self.session.config.payload_size(),
            self.session.identifier,
        )?;

        self.send_request()?;
        for _ in 0..self.session.config.preload {
            if self.session.sends_exhausted() {
                break;
            }
            self.send_request()?;
        }

        loop {
            if self.stop.is_set() {
                debug!("Stop requested after {} sent", self.session.sent);
                break;
            }

            let now = TimeVal::now();
            if self.session.deadline_passed(now) {
                break;
            }

            let (timeout, wake) = self.next_wait(now);
            // A due send is never starved by a busy socket
            let readiness = if timeout.is_zero() {
                Readiness::Timeout
            } else {
                match self.transport.wait_readable(timeout) {
                    Ok(readiness) => readiness,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e).context("Failed waiting on ICMP socket"),
                }
            };

            match readiness {
                Readiness::Ready => {
                    self.receive_one()?;
                    if self.finished_after_reply(TimeVal::now()) {
                        break;
                    }
                }
                Readiness::Timeout => {
                    if wake == Wake::Deadline {
                        break;
                    }
                    let last = self.session.sequence;
                    if !self.session.is_answered(last) {
                        self.reporter.print_timeout(last)?;
                    }
                    // A full interval has passed since the final send
                    if self.session.sends_exhausted() {
                        break;
                    }
                    self.send_request()?;
                }
            }
        }

        Ok(())
    }

    /// Time until the next send, or until the run deadline if that comes first
    fn next_wait(&self, now: TimeVal) -> (TimeVal, Wake) {
        let interval_left =
            remaining_until_deadline(self.session.last_send, self.session.interval(), now);

        if let Some(secs) = self.session.config.timeout {
            let run_left = remaining_until_deadline(
                self.session.started_at,
                TimeVal::new(i64::from(secs), 0),
                now,
            );
            if run_left < interval_left {
                return (run_left, Wake::Deadline);
            }
        }

        (interval_left, Wake::Interval)
    }

    fn finished_after_reply(&self, now: TimeVal) -> bool {
        if self.session.count_reached() || self.session.deadline_passed(now) {
            return true;
        }
        self.session.sends_exhausted()
            && remaining_until_deadline(self.session.last_send, self.session.interval(), now)
                .is_zero()
    }

    fn receive_one(&mut self) -> Result<()> {
        let received = match self.transport.receive(&mut self.recv_buffer) {
            Ok(received) => received,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                debug!("Spurious wakeup: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e).context("Failed to receive ICMP datagram"),
        };

        let len = received.len.min(self.recv_buffer.len());
        if let Some(peer) = received.source {
            trace!("{} byte datagram from {}", len, peer);
        }
        let recv_time = received.kernel_time.unwrap_or_else(TimeVal::now);
        process_datagram(
            &mut self.session,
            &mut self.reporter,
            &self.recv_buffer[..len],
            recv_time,
        )?;
        Ok(())
    }

    fn send_request(&mut self) -> Result<()> {
        let sequence = self.session.next_sequence();
        let now = TimeVal::now();
        let payload = build_payload(self.session.config.payload_size(), now);
        let frame = build_echo_request(&payload, sequence, self.session.identifier);
        let dest = self.session.target.resolved;

        loop {
            match self.transport.send(&frame, dest) {
                Ok(written) => {
                    if written != frame.len() {
                        warn!(
                            "Short send for icmp_seq={}: {} of {} bytes",
                            sequence,
                            written,
                            frame.len()
                        );
                    }
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to send echo request icmp_seq={}", sequence)
                    });
                }
            }
        }

        self.session.record_sent(now);
        self.reporter.print_sent()?;
        Ok(())
    }
}
