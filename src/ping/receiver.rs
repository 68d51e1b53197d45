use anyhow::Result;
use log::debug;
use std::io::Write;

use crate::export::Reporter;
use crate::probe::{Discard, extract_embedded_original, extract_sequence, parse_reply};
use crate::state::{ReplyStatus, Session};
use crate::timing::{TimeVal, elapsed_micros};

/// What became of one inbound datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Reply(ReplyStatus),
    IcmpError,
    /// Sequence number beyond anything sent so far
    Unsolicited(u16),
    Discarded(Discard),
}

/// Decode one datagram, update the session and report it
pub fn process_datagram<W: Write>(
    session: &mut Session,
    reporter: &mut Reporter<W>,
    frame: &[u8],
    recv_time: TimeVal,
) -> Result<Outcome> {
    if let Some(seq) = extract_sequence(frame)
        && seq > session.sequence
    {
        debug!("Ignoring icmp_seq={} (highest sent is {})", seq, session.sequence);
        return Ok(Outcome::Unsolicited(seq));
    }

    let reply = match parse_reply(frame, session.identifier) {
        Ok(reply) => reply,
        Err(reason) => {
            debug!("Discarding {} byte datagram: {}", frame.len(), reason);
            return Ok(Outcome::Discarded(reason));
        }
    };

    if !reply.kind.is_echo_reply() {
        let original = extract_embedded_original(frame).unwrap_or(&[]);
        reporter.print_icmp_error(&reply, original)?;
        return Ok(Outcome::IcmpError);
    }

    let rtt = reply.sent_at.map(|sent_at| {
        let rtt = elapsed_micros(sent_at, recv_time);
        if rtt < 0 {
            // Clock stepped backwards or the peer mangled the payload
            debug!("Negative RTT {}us for icmp_seq={}, clamping", rtt, reply.sequence);
            0
        } else {
            rtt
        }
    });

    let status = session.record_reply(reply.sequence, rtt);
    reporter.print_echo(&reply, rtt, status == ReplyStatus::Duplicate)?;
    Ok(Outcome::Reply(status))
}
