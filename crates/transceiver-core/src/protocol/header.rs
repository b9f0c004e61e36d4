//! Packet header
//!
//! Header format (6 bytes):
//! - 1 byte: start byte
//! - 1 byte: address
//! - 2 bytes: length field (little-endian), see [`LengthField`]
//! - 2 bytes: RFC 1071 checksum of the first 4 bytes (big-endian)

use byteorder::{ByteOrder, LittleEndian};

use super::{ProtocolError, HEADER_LEN, MAX_PAYLOAD_LEN};
use crate::checksum::{rfc1071, rfc1071_ok};

const PAD_FLAG: u16 = 0x8000;
const WORDS_MASK: u16 = 0x7FFF;

/// Payload length as carried on the wire.
///
/// Bits 0-14 hold the padded payload length in 16-bit words, bit 15 is set
/// when a zero byte was appended to make the payload even.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LengthField {
    /// Padded payload length in 16-bit words
    pub words: u16,
    /// A single pad byte follows the payload
    pub padded: bool,
}

impl LengthField {
    /// Length field for a payload of `len` bytes
    pub fn for_payload(len: usize) -> Result<Self, ProtocolError> {
        if len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self {
            // Bounded by MAX_PAYLOAD_LEN above
            words: len.div_ceil(2) as u16,
            padded: len % 2 == 1,
        })
    }

    /// Pack into the 16-bit wire value
    pub fn pack(self) -> u16 {
        let flag = if self.padded { PAD_FLAG } else { 0 };
        (self.words & WORDS_MASK) | flag
    }

    /// Unpack from the 16-bit wire value
    pub fn unpack(raw: u16) -> Self {
        Self {
            words: raw & WORDS_MASK,
            padded: raw & PAD_FLAG != 0,
        }
    }

    /// Bytes between header and packet checksum (payload plus pad)
    pub fn wire_len(self) -> usize {
        usize::from(self.words) * 2
    }

    /// Payload bytes once the pad is stripped
    pub fn payload_len(self) -> usize {
        self.wire_len().saturating_sub(usize::from(self.padded))
    }
}

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Start byte
    pub start: u8,
    /// Device address
    pub address: u8,
    /// Payload length and pad flag
    pub length: LengthField,
}

impl Header {
    /// Encode the header, including its checksum
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = self.start;
        bytes[1] = self.address;
        LittleEndian::write_u16(&mut bytes[2..4], self.length.pack());
        let sum = rfc1071(&bytes[..4]);
        bytes[4..].copy_from_slice(&sum);
        bytes
    }

    /// Read the header fields without validating anything
    pub fn parse(raw: &[u8; HEADER_LEN]) -> Self {
        Self {
            start: raw[0],
            address: raw[1],
            length: LengthField::unpack(LittleEndian::read_u16(&raw[2..4])),
        }
    }

    /// True when the header checksum covers the first 4 bytes
    pub fn checksum_ok(raw: &[u8; HEADER_LEN]) -> bool {
        rfc1071_ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_field_even_payload() {
        let field = LengthField::for_payload(10).unwrap();
        assert_eq!(field, LengthField { words: 5, padded: false });
        assert_eq!(field.pack(), 0x0005);
        assert_eq!(field.wire_len(), 10);
        assert_eq!(field.payload_len(), 10);
    }

    #[test]
    fn test_length_field_odd_payload() {
        let field = LengthField::for_payload(3).unwrap();
        assert_eq!(field, LengthField { words: 2, padded: true });
        assert_eq!(field.pack(), 0x8002);
        assert_eq!(field.wire_len(), 4);
        assert_eq!(field.payload_len(), 3);
    }

    #[test]
    fn test_length_field_unpack() {
        assert_eq!(
            LengthField::unpack(0x8FFF),
            LengthField { words: 0x0FFF, padded: true }
        );
        assert_eq!(LengthField::unpack(0x0000), LengthField::default());
        // Pad flag on an empty payload cannot underflow
        assert_eq!(LengthField::unpack(0x8000).payload_len(), 0);
    }

    #[test]
    fn test_length_field_limit() {
        assert_eq!(LengthField::for_payload(MAX_PAYLOAD_LEN).unwrap().words, 0x0FFF);
        assert!(matches!(
            LengthField::for_payload(MAX_PAYLOAD_LEN + 1),
            Err(ProtocolError::PayloadTooLarge { len: 0x1FFF, .. })
        ));
    }

    #[test]
    fn test_header_bytes() {
        let header = Header {
            start: 0xAA,
            address: 0x01,
            length: LengthField { words: 2, padded: true },
        };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[..4], &[0xAA, 0x01, 0x02, 0x80]);
        // 0xAA01 + 0x0280 = 0xAC81
        assert_eq!(&bytes[4..], &[0x53, 0x7E]);
        assert!(Header::checksum_ok(&bytes));
        assert_eq!(Header::parse(&bytes), header);
    }

    #[test]
    fn test_header_checksum_detects_corruption() {
        let header = Header {
            start: 0xAA,
            address: 0x10,
            length: LengthField { words: 7, padded: false },
        };
        for i in 0..HEADER_LEN {
            let mut bytes = header.to_bytes();
            bytes[i] ^= 0x01;
            assert!(!Header::checksum_ok(&bytes), "flip at byte {}", i);
        }
    }
}
