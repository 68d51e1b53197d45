use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use std::fmt;
use std::net::Ipv4Addr;

use crate::probe::checksum::verify_checksum;
use crate::probe::icmp::{ICMP_HEADER_SIZE, IPV4_HEADER_SIZE};
use crate::timing::TimeVal;

// IP protocol number
const IPPROTO_ICMP: u8 = 1;

/// ICMP message class of an accepted datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpKind {
    EchoReply,
    DestUnreachable(u8),
    SourceQuench(u8),
    Redirect(u8),
    TimeExceeded(u8),
    ParameterProblem(u8),
}

impl IcmpKind {
    pub fn is_echo_reply(&self) -> bool {
        matches!(self, IcmpKind::EchoReply)
    }
}

/// An inbound datagram that belongs to this session
#[derive(Debug, Clone)]
pub struct ParsedReply {
    /// Source address from the outer IP header
    pub source: Ipv4Addr,
    /// TTL from the outer IP header
    pub ttl: u8,
    /// Length of the ICMP message (datagram minus IP header)
    pub icmp_len: usize,
    /// Echo sequence number, taken from the embedded request for errors
    pub sequence: u16,
    pub kind: IcmpKind,
    /// Send timestamp echoed back in the payload, if the payload carried one
    pub sent_at: Option<TimeVal>,
}

/// Why an inbound datagram was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// Too short for the headers it claims to carry
    Truncated,
    /// IHL below 5 or past the end of the buffer
    BadHeaderLength,
    BadChecksum,
    /// Our own Echo Request seen on the raw socket (e.g. pinging localhost)
    OwnRequest,
    /// Echo traffic or error report belonging to another process
    ForeignIdentifier,
    UnsupportedType(u8),
    /// Error report whose embedded datagram is not one of our Echo Requests
    Undecodable,
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discard::Truncated => write!(f, "truncated datagram"),
            Discard::BadHeaderLength => write!(f, "bad IP header length"),
            Discard::BadChecksum => write!(f, "ICMP checksum mismatch"),
            Discard::OwnRequest => write!(f, "own echo request"),
            Discard::ForeignIdentifier => write!(f, "identifier belongs to another process"),
            Discard::UnsupportedType(t) => write!(f, "unsupported ICMP type {}", t),
            Discard::Undecodable => write!(f, "undecodable embedded datagram"),
        }
    }
}

/// Structural check of an IPv4 header: at least 20 bytes, IHL >= 5 and the
/// header fits in the buffer
pub fn validate_ip_header(data: &[u8]) -> bool {
    if data.len() < IPV4_HEADER_SIZE {
        return false;
    }
    let ihl = (data[0] & 0x0F) as usize;
    ihl >= 5 && ihl * 4 <= data.len()
}

/// Offset of the ICMP header, i.e. the IP header length in bytes
pub fn locate_icmp_header(data: &[u8]) -> Option<usize> {
    if !validate_ip_header(data) {
        return None;
    }
    Some(((data[0] & 0x0F) as usize) * 4)
}

/// ICMP types that quote the offending datagram after their header
fn is_error_type(icmp_type: u8) -> bool {
    matches!(icmp_type, 3 | 4 | 5 | 11 | 12)
}

/// Pull the echo sequence number out of a raw IP datagram.
///
/// Echo Request/Reply carry it directly. Error messages are followed one
/// level into the quoted original datagram.
pub fn extract_sequence(data: &[u8]) -> Option<u16> {
    sequence_at(data, true)
}

fn sequence_at(data: &[u8], follow_errors: bool) -> Option<u16> {
    let offset = locate_icmp_header(data)?;
    let icmp = data.get(offset..offset + ICMP_HEADER_SIZE)?;

    match icmp[0] {
        0 | 8 => Some(u16::from_be_bytes([icmp[6], icmp[7]])),
        t if follow_errors && is_error_type(t) => {
            sequence_at(extract_embedded_original(data)?, false)
        }
        _ => None,
    }
}

/// The datagram quoted by an ICMP error message: everything after the outer
/// IP header and the 8-byte ICMP header
pub fn extract_embedded_original(data: &[u8]) -> Option<&[u8]> {
    let offset = locate_icmp_header(data)?;
    data.get(offset + ICMP_HEADER_SIZE..)
}

/// Classify an inbound IP datagram against our identifier
pub fn parse_reply(data: &[u8], our_identifier: u16) -> Result<ParsedReply, Discard> {
    if data.len() < IPV4_HEADER_SIZE {
        return Err(Discard::Truncated);
    }
    let offset = locate_icmp_header(data).ok_or(Discard::BadHeaderLength)?;

    let ip_packet = Ipv4Packet::new(data).ok_or(Discard::Truncated)?;
    if ip_packet.get_next_level_protocol().0 != IPPROTO_ICMP {
        return Err(Discard::Undecodable);
    }

    let icmp_data = &data[offset..];
    if icmp_data.len() < ICMP_HEADER_SIZE {
        return Err(Discard::Truncated);
    }
    if !verify_checksum(icmp_data) {
        return Err(Discard::BadChecksum);
    }

    let icmp_packet = IcmpPacket::new(icmp_data).ok_or(Discard::Truncated)?;
    let code = icmp_packet.get_icmp_code().0;

    let kind = match icmp_packet.get_icmp_type() {
        IcmpTypes::EchoReply => IcmpKind::EchoReply,
        IcmpTypes::EchoRequest => return Err(Discard::OwnRequest),
        IcmpTypes::DestinationUnreachable => IcmpKind::DestUnreachable(code),
        IcmpTypes::SourceQuench => IcmpKind::SourceQuench(code),
        IcmpTypes::RedirectMessage => IcmpKind::Redirect(code),
        IcmpTypes::TimeExceeded => IcmpKind::TimeExceeded(code),
        IcmpTypes::ParameterProblem => IcmpKind::ParameterProblem(code),
        other => return Err(Discard::UnsupportedType(other.0)),
    };

    let (sequence, sent_at) = if kind.is_echo_reply() {
        // Echo Reply: identifier and sequence are in bytes 4-7
        let identifier = u16::from_be_bytes([icmp_data[4], icmp_data[5]]);
        if identifier != our_identifier {
            return Err(Discard::ForeignIdentifier);
        }
        let sequence = u16::from_be_bytes([icmp_data[6], icmp_data[7]]);
        (sequence, TimeVal::from_bytes(&icmp_data[ICMP_HEADER_SIZE..]))
    } else {
        (parse_embedded_request(data, our_identifier)?, None)
    };

    Ok(ParsedReply {
        source: ip_packet.get_source(),
        ttl: ip_packet.get_ttl(),
        icmp_len: icmp_data.len(),
        sequence,
        kind,
        sent_at,
    })
}

/// Match the datagram quoted inside an ICMP error against our Echo Request
fn parse_embedded_request(data: &[u8], our_identifier: u16) -> Result<u16, Discard> {
    // ICMP error format:
    // [0]    Type
    // [1]    Code
    // [2-3]  Checksum
    // [4-7]  Unused (gateway address for Redirect)
    // [8..]  Original IP header + at least 8 bytes of original payload
    let original = extract_embedded_original(data).ok_or(Discard::Truncated)?;
    let orig_offset = locate_icmp_header(original).ok_or(Discard::Undecodable)?;

    let original_ip = Ipv4Packet::new(original).ok_or(Discard::Undecodable)?;
    if original_ip.get_next_level_protocol().0 != IPPROTO_ICMP {
        return Err(Discard::Undecodable);
    }

    // Original ICMP Echo Request
    // [0]    Type (should be 8 for Echo Request)
    // [4-5]  Identifier
    // [6-7]  Sequence
    let original_icmp = original
        .get(orig_offset..orig_offset + ICMP_HEADER_SIZE)
        .ok_or(Discard::Undecodable)?;
    if original_icmp[0] != IcmpTypes::EchoRequest.0 {
        return Err(Discard::Undecodable);
    }

    let identifier = u16::from_be_bytes([original_icmp[4], original_icmp[5]]);
    if identifier != our_identifier {
        return Err(Discard::ForeignIdentifier);
    }

    Ok(u16::from_be_bytes([original_icmp[6], original_icmp[7]]))
}
