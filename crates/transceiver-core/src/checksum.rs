//! Link checksums
//!
//! Two algorithms are used on the wire:
//! - an RFC 1071 style ones'-complement sum of big-endian 16-bit words, guarding
//!   the header and the whole packet
//! - a one-byte XOR parity (LRC) that may close a payload

use byteorder::{BigEndian, ByteOrder};

/// Incremental RFC 1071 checksum.
///
/// Input may be fed in chunks of any size; the result only depends on the
/// concatenated bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rfc1071 {
    sum: u64,
    /// High byte of a word split across two `update` calls
    pending: Option<u8>,
}

impl Rfc1071 {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bytes to the running sum
    pub fn update(&mut self, data: &[u8]) {
        let mut data = data;

        if let Some(high) = self.pending.take() {
            match data.split_first() {
                Some((&low, rest)) => {
                    self.sum += u64::from(u16::from_be_bytes([high, low]));
                    data = rest;
                }
                None => {
                    self.pending = Some(high);
                    return;
                }
            }
        }

        let mut words = data.chunks_exact(2);
        for word in &mut words {
            self.sum += u64::from(BigEndian::read_u16(word));
        }
        if let [last] = words.remainder() {
            self.pending = Some(*last);
        }
    }

    /// Fold the carries and return the ones'-complement of the sum
    pub fn finish(&self) -> u16 {
        let mut sum = self.sum;
        // Odd length: the last byte is the high half of a zero-padded word
        if let Some(high) = self.pending {
            sum += u64::from(high) << 8;
        }
        while sum >> 16 != 0 {
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
        !(sum as u16)
    }
}

/// RFC 1071 checksum of `data` as a native integer
pub fn rfc1071_u16(data: &[u8]) -> u16 {
    let mut acc = Rfc1071::new();
    acc.update(data);
    acc.finish()
}

/// RFC 1071 checksum of `data`, big-endian, ready to append to the data.
///
/// Checksumming `data` followed by its own checksum yields `[0, 0]`.
pub fn rfc1071(data: &[u8]) -> [u8; 2] {
    rfc1071_u16(data).to_be_bytes()
}

/// Returns true when `data` ends with a matching RFC 1071 checksum
pub fn rfc1071_ok(data: &[u8]) -> bool {
    rfc1071_u16(data) == 0
}

/// XOR parity of all bytes; `0` for an empty slice
pub fn lrc(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_rfc1071_reference_vector() {
        // Worked example from RFC 1071 section 3: folded sum 0xddf2
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(rfc1071_u16(&data), !0xddf2);
        assert_eq!(rfc1071(&data), [0x22, 0x0d]);
    }

    #[test]
    fn test_rfc1071_empty_and_zeroes() {
        assert_eq!(rfc1071(&[]), [0xFF, 0xFF]);
        assert_eq!(rfc1071(&[0, 0, 0, 0]), [0xFF, 0xFF]);
        assert!(rfc1071_ok(&[0xFF, 0xFF]));
    }

    #[test]
    fn test_rfc1071_odd_length_pads_low_byte() {
        assert_eq!(rfc1071(&[0x12, 0x34, 0x56]), rfc1071(&[0x12, 0x34, 0x56, 0x00]));
    }

    #[test]
    fn test_rfc1071_self_verifies() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1071);
        for _ in 0..500 {
            let len = rng.gen_range(0..300);
            let mut data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            // Odd data gets its checksum after an implicit pad byte
            if data.len() % 2 == 1 {
                data.push(0);
            }
            let sum = rfc1071(&data);
            data.extend_from_slice(&sum);
            assert_eq!(rfc1071(&data), [0, 0], "data: {:02x?}", data);
        }
    }

    #[test]
    fn test_rfc1071_carry_needs_more_than_one_fold() {
        // 0x1003 words of 0xFFFF plus a small word carries twice
        let mut data = vec![0xFF; 0x1003 * 2];
        data.extend_from_slice(&[0x10, 0x02]);
        let sum = rfc1071(&data);
        data.extend_from_slice(&sum);
        assert!(rfc1071_ok(&data));
    }

    #[test]
    fn test_incremental_matches_oneshot_for_any_chunking() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let data: Vec<u8> = (0..257).map(|_| rng.gen()).collect();
        let expected = rfc1071_u16(&data);

        for _ in 0..50 {
            let mut acc = Rfc1071::new();
            let mut rest = data.as_slice();
            while !rest.is_empty() {
                let take = rng.gen_range(0..=rest.len().min(9));
                let (chunk, tail) = rest.split_at(take);
                acc.update(chunk);
                rest = tail;
            }
            assert_eq!(acc.finish(), expected);
        }
    }

    #[test]
    fn test_lrc() {
        assert_eq!(lrc(&[]), 0);
        assert_eq!(lrc(&[0x5A]), 0x5A);
        assert_eq!(lrc(&[0x01, 0x02, 0x04]), 0x07);
        assert_eq!(lrc(&[0xAB, 0xAB]), 0);
    }

    #[test]
    fn test_lrc_is_xor_homomorphic() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let a: Vec<u8> = (0..rng.gen_range(0..40)).map(|_| rng.gen()).collect();
            let b: Vec<u8> = (0..rng.gen_range(0..40)).map(|_| rng.gen()).collect();
            let joined = [a.as_slice(), b.as_slice()].concat();
            assert_eq!(lrc(&joined), lrc(&a) ^ lrc(&b));
        }
    }
}
