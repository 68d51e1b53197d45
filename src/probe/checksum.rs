//! Internet checksum (RFC 1071)

/// Byte offset of the checksum field inside an ICMP header
pub const CHECKSUM_OFFSET: usize = 2;

/// One's-complement sum of 16-bit big-endian words, folded and inverted.
///
/// A trailing odd byte is treated as the high byte of a final word padded
/// with zero. The input is never modified; callers that want to verify a
/// packet in place use [`verify_checksum`].
pub fn compute_checksum(data: &[u8]) -> u16 {
    !fold(sum_words(data, None))
}

/// Check the checksum stored at bytes 2-3 of an ICMP message.
///
/// The stored field is skipped while summing (treated as zero) and the
/// result is compared with the stored value, so the buffer can stay
/// borrowed immutably. Messages shorter than a type/code/checksum triple
/// are rejected.
pub fn verify_checksum(data: &[u8]) -> bool {
    if data.len() < CHECKSUM_OFFSET + 2 {
        return false;
    }

    let stored = u16::from_be_bytes([data[CHECKSUM_OFFSET], data[CHECKSUM_OFFSET + 1]]);
    !fold(sum_words(data, Some(CHECKSUM_OFFSET))) == stored
}

/// Write the checksum of `data` into its ICMP checksum field
pub fn fill_checksum(data: &mut [u8]) {
    if data.len() < CHECKSUM_OFFSET + 2 {
        return;
    }
    data[CHECKSUM_OFFSET] = 0;
    data[CHECKSUM_OFFSET + 1] = 0;
    let cksum = compute_checksum(data);
    data[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&cksum.to_be_bytes());
}

fn sum_words(data: &[u8], skip: Option<usize>) -> u64 {
    let mut sum: u64 = 0;

    let mut chunks = data.chunks_exact(2);
    for (i, word) in chunks.by_ref().enumerate() {
        if skip == Some(i * 2) {
            continue;
        }
        sum += u16::from_be_bytes([word[0], word[1]]) as u64;
    }

    // Handle odd byte
    if let [last] = chunks.remainder() {
        sum += (*last as u64) << 8;
    }

    sum
}

fn fold(mut sum: u64) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}
