//! Packet encoding
//!
//! Packet format:
//! - 6 bytes: header (see [`Header`])
//! - N bytes: payload
//! - 0-1 bytes: zero pad, present when N is odd
//! - 2 bytes: RFC 1071 checksum of header + payload + pad (big-endian)

use super::{Header, LengthField, ProtocolError, CHECKSUM_LEN, HEADER_LEN};
use crate::checksum::{lrc, Rfc1071};
use crate::config::{FrameOptions, LrcMode};

/// Encode `payload` into a complete packet
pub fn encode(payload: &[u8], options: &FrameOptions) -> Result<Vec<u8>, ProtocolError> {
    let trailer = match options.lrc {
        LrcMode::Append => Some(lrc(payload)),
        LrcMode::None => None,
    };
    let body_len = payload.len() + usize::from(trailer.is_some());

    let length = LengthField::for_payload(body_len)?;
    let header = Header {
        start: options.start_byte,
        address: options.address,
        length,
    };

    let mut bytes = Vec::with_capacity(HEADER_LEN + length.wire_len() + CHECKSUM_LEN);
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(payload);
    bytes.extend(trailer);
    if length.padded {
        bytes.push(0);
    }

    let mut sum = Rfc1071::new();
    sum.update(&bytes);
    bytes.extend_from_slice(&sum.finish().to_be_bytes());

    Ok(bytes)
}

/// Encoded size of a packet carrying `payload_len` bytes (LRC not included)
pub fn encoded_len(payload_len: usize) -> usize {
    HEADER_LEN + payload_len.div_ceil(2) * 2 + CHECKSUM_LEN
}
