//! Packet receive state machine
//!
//! The receiver pulls bytes from a [`ByteSource`] and walks through
//! `SeekHeader -> ValidateHeader -> (Resync ->) ReadBody`. Header failures
//! lead to a resync on the next start byte; body failures reject the packet.
//! Resync steps and discarded packets share one attempt budget.

use tracing::{debug, trace, warn};

use super::{ChecksumKind, Header, LinkStats, ProtocolError, CHECKSUM_LEN, HEADER_LEN};
use crate::checksum::{lrc, Rfc1071};
use crate::config::{AddressPolicy, FrameOptions, LrcMode};

/// A received packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Validated header
    pub header: Header,
    /// Payload with pad (and LRC, when framed with one) stripped
    pub payload: Vec<u8>,
}

impl Frame {
    /// Address the packet was sent from
    pub fn address(&self) -> u8 {
        self.header.address
    }
}

/// Blocking source of bytes for the receiver
pub(crate) trait ByteSource {
    /// Read up to `len` bytes; fewer (or none) means the source ran dry
    fn read_up_to(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError>;
}

/// In-memory source used by [`decode`]
struct SliceSource<'a> {
    data: &'a [u8],
}

impl ByteSource for SliceSource<'_> {
    fn read_up_to(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        let take = len.min(self.data.len());
        let (head, tail) = self.data.split_at(take);
        self.data = tail;
        Ok(head.to_vec())
    }
}

#[derive(Debug)]
enum RxState {
    /// Read a fresh header window
    SeekHeader,
    /// Check start byte and header checksum
    ValidateHeader([u8; HEADER_LEN]),
    /// Look for the next start byte in a rejected window
    Resync([u8; HEADER_LEN]),
    /// Read payload, pad and packet checksum
    ReadBody([u8; HEADER_LEN]),
}

/// Decode the first packet found in `data`.
///
/// Runs the same state machine as [`Transceiver::receive_frame`](super::Transceiver::receive_frame),
/// with the end of `data` standing in for a read timeout. Bytes after the
/// packet are ignored.
pub fn decode(data: &[u8], options: &FrameOptions) -> Result<Frame, ProtocolError> {
    let mut source = SliceSource { data };
    let mut stats = LinkStats::default();
    receive_frame(&mut source, options, &mut stats)
}

/// Receive one packet from `source`
pub(crate) fn receive_frame<S: ByteSource>(
    source: &mut S,
    options: &FrameOptions,
    stats: &mut LinkStats,
) -> Result<Frame, ProtocolError> {
    let mut state = RxState::SeekHeader;
    let mut attempts = 0usize;
    // Nothing received since the receive (re)started
    let mut idle = true;

    loop {
        state = match state {
            RxState::SeekHeader => {
                let bytes = source.read_up_to(HEADER_LEN)?;
                if bytes.is_empty() && idle {
                    return Err(ProtocolError::ReadTimeout);
                }
                idle = false;
                let window: [u8; HEADER_LEN] =
                    bytes.as_slice().try_into().map_err(|_| ProtocolError::BadData {
                        context: "header",
                        expected: HEADER_LEN,
                        actual: bytes.len(),
                    })?;
                RxState::ValidateHeader(window)
            }

            RxState::ValidateHeader(window) => {
                let start_ok = window[0] == options.start_byte;
                if start_ok && (!options.check_checksums || Header::checksum_ok(&window)) {
                    trace!("header found: {:02x?}", window);
                    RxState::ReadBody(window)
                } else {
                    if start_ok {
                        debug!("header checksum mismatch: {:02x?}", window);
                    }
                    RxState::Resync(window)
                }
            }

            RxState::Resync(window) => {
                attempts += 1;
                if attempts > options.max_resync_attempts {
                    return Err(ProtocolError::CommunicationError(format!(
                        "cannot find header after {} attempts",
                        options.max_resync_attempts
                    )));
                }
                stats.resyncs = stats.resyncs.saturating_add(1);

                // Offset 0 was already tried
                match window[1..].iter().position(|&b| b == options.start_byte) {
                    Some(pos) => {
                        let shift = pos + 1;
                        trace!("resync: start byte at offset {}", shift);
                        let refill = source.read_up_to(shift)?;
                        if refill.len() < shift {
                            return Err(ProtocolError::BadData {
                                context: "header",
                                expected: HEADER_LEN,
                                actual: HEADER_LEN - shift + refill.len(),
                            });
                        }
                        let mut next = [0u8; HEADER_LEN];
                        next[..HEADER_LEN - shift].copy_from_slice(&window[shift..]);
                        next[HEADER_LEN - shift..].copy_from_slice(&refill);
                        RxState::ValidateHeader(next)
                    }
                    None => {
                        trace!("resync: no start byte in {:02x?}", window);
                        RxState::SeekHeader
                    }
                }
            }

            RxState::ReadBody(raw) => {
                let header = Header::parse(&raw);
                let expected = header.length.wire_len() + CHECKSUM_LEN;
                let body = source.read_up_to(expected)?;
                if body.len() < expected {
                    return Err(ProtocolError::BadData {
                        context: "packet",
                        expected: HEADER_LEN + expected,
                        actual: HEADER_LEN + body.len(),
                    });
                }

                if !address_accepted(&header, options)? {
                    stats.discarded = stats.discarded.saturating_add(1);
                    attempts += 1;
                    if attempts > options.max_resync_attempts {
                        return Err(ProtocolError::CommunicationError(format!(
                            "no packet for address {:#04x} after {} attempts",
                            options.master_address, options.max_resync_attempts
                        )));
                    }
                    idle = true;
                    RxState::SeekHeader
                } else {
                    return finish_frame(header, &raw, body, options, stats);
                }
            }
        };
    }
}

/// Apply the address policy; `Ok(false)` drops the packet
fn address_accepted(header: &Header, options: &FrameOptions) -> Result<bool, ProtocolError> {
    if header.address == options.master_address {
        return Ok(true);
    }
    match options.address_policy {
        AddressPolicy::Ignore => Ok(true),
        AddressPolicy::Warn => {
            warn!(
                "packet from address {:#04x}, expected {:#04x}",
                header.address, options.master_address
            );
            Ok(true)
        }
        AddressPolicy::Discard => {
            warn!(
                "discarding packet from address {:#04x}, expected {:#04x}",
                header.address, options.master_address
            );
            Ok(false)
        }
        AddressPolicy::Reject => Err(ProtocolError::AddressMismatch {
            expected: options.master_address,
            actual: header.address,
        }),
    }
}

/// Verify the packet checksum and strip checksum, pad and LRC
fn finish_frame(
    header: Header,
    raw: &[u8; HEADER_LEN],
    mut body: Vec<u8>,
    options: &FrameOptions,
    stats: &mut LinkStats,
) -> Result<Frame, ProtocolError> {
    if options.check_checksums {
        let mut sum = Rfc1071::new();
        sum.update(raw);
        sum.update(&body);
        if sum.finish() != 0 {
            stats.checksum_failures = stats.checksum_failures.saturating_add(1);
            debug!("packet checksum mismatch, {} body bytes", body.len());
            return Err(ProtocolError::BadChecksum(ChecksumKind::Packet));
        }
    }

    body.truncate(header.length.payload_len());

    if options.lrc == LrcMode::Append {
        let Some(&received) = body.last() else {
            return Err(ProtocolError::BadData {
                context: "LRC",
                expected: 1,
                actual: 0,
            });
        };
        body.pop();
        if options.check_checksums && lrc(&body) != received {
            stats.checksum_failures = stats.checksum_failures.saturating_add(1);
            return Err(ProtocolError::BadChecksum(ChecksumKind::Lrc));
        }
    }

    Ok(Frame {
        header,
        payload: body,
    })
}
