use pnet::packet::icmp::IcmpTypes;

use crate::probe::checksum::{CHECKSUM_OFFSET, compute_checksum};
use crate::timing::{TIMEVAL_WIRE_SIZE, TimeVal};

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Minimum IPv4 header size (IHL = 5)
pub const IPV4_HEADER_SIZE: usize = 20;
/// Default payload size (standard ping)
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;
/// Bytes after the send timestamp are filled with this pattern
pub const FILLER_BYTE: u8 = 0x42;
/// Largest payload that fits in one IPv4 datagram
pub const MAX_PAYLOAD_SIZE: usize = 65_535 - IPV4_HEADER_SIZE - ICMP_HEADER_SIZE;

/// Get process identifier for ICMP identification field
pub fn get_identifier() -> u16 {
    std::process::id() as u16
}

/// Build an echo payload of `len` bytes.
///
/// Layout:
/// - Bytes 0-15: send timestamp (seconds i64 BE, microseconds i64 BE), only
///   when `len >= 16`
/// - Remaining bytes: `0x42` filler
pub fn build_payload(len: usize, sent_at: TimeVal) -> Vec<u8> {
    let mut payload = vec![FILLER_BYTE; len];
    if len >= TIMEVAL_WIRE_SIZE {
        payload[..TIMEVAL_WIRE_SIZE].copy_from_slice(&sent_at.to_bytes());
    }
    payload
}

/// Build an ICMP Echo Request around `payload`.
///
/// The checksum covers the whole ICMP message and is written last.
pub fn build_echo_request(payload: &[u8], sequence: u16, identifier: u16) -> Vec<u8> {
    let mut buffer = vec![0u8; ICMP_HEADER_SIZE + payload.len()];

    buffer[0] = IcmpTypes::EchoRequest.0;
    buffer[1] = 0; // Code
    buffer[4..6].copy_from_slice(&identifier.to_be_bytes());
    buffer[6..8].copy_from_slice(&sequence.to_be_bytes());
    buffer[ICMP_HEADER_SIZE..].copy_from_slice(payload);

    debug_assert_eq!(
        &buffer[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2],
        &[0, 0],
        "checksum field must be zero before computing the checksum"
    );
    let cksum = compute_checksum(&buffer);
    buffer[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&cksum.to_be_bytes());

    buffer
}
