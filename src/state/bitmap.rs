use std::fmt;

/// Number of distinct ICMP sequence numbers
pub const SEQ_SPACE: usize = 1 << 16;

const BYTES: usize = SEQ_SPACE / 8;

/// One bit per 16-bit sequence number, set once a reply for it was seen
pub struct SeqBitmap {
    bits: Box<[u8]>,
}

impl SeqBitmap {
    pub fn new() -> Self {
        Self {
            bits: vec![0u8; BYTES].into_boxed_slice(),
        }
    }

    #[inline]
    fn locate(seq: u16) -> (usize, u8) {
        ((seq >> 3) as usize, 1 << (seq & 7))
    }

    pub fn set(&mut self, seq: u16) {
        let (byte, mask) = Self::locate(seq);
        self.bits[byte] |= mask;
    }

    pub fn test(&self, seq: u16) -> bool {
        let (byte, mask) = Self::locate(seq);
        self.bits[byte] & mask != 0
    }

    pub fn clear(&mut self, seq: u16) {
        let (byte, mask) = Self::locate(seq);
        self.bits[byte] &= !mask;
    }

    /// Number of sequence numbers currently marked
    pub fn count(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }
}

impl Default for SeqBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SeqBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeqBitmap")
            .field("marked", &self.count())
            .finish()
    }
}
