//! Transceiver
//!
//! Sends and receives packets over one exclusively owned channel. All calls
//! block; reads are bounded by the channel's read timeout.

use std::io;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::decoder::{self, ByteSource, Frame};
use super::{encode, read_up_to, Channel, ProtocolError};
use crate::config::TransceiverConfig;

/// Cumulative link counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Bytes written
    pub tx_bytes: u64,
    /// Bytes read
    pub rx_bytes: u64,
    /// Packets sent
    pub tx_packets: u64,
    /// Packets received and accepted
    pub rx_packets: u64,
    /// Resync steps taken while looking for a header
    pub resyncs: u64,
    /// Packets rejected for a bad packet or LRC checksum
    pub checksum_failures: u64,
    /// Packets dropped by the address policy
    pub discarded: u64,
}

/// Channel adapter feeding the receive state machine
struct ChannelSource<'a, C: Channel> {
    channel: &'a mut C,
    timeout: Duration,
    rx_bytes: u64,
}

impl<C: Channel> ByteSource for ChannelSource<'_, C> {
    fn read_up_to(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        let bytes = read_up_to(&mut *self.channel, len, self.timeout)?;
        trace!("read {} of {} bytes: {:02x?}", bytes.len(), len, bytes);
        self.rx_bytes += bytes.len() as u64;
        Ok(bytes)
    }
}

/// Packet transceiver over a [`Channel`]
pub struct Transceiver<C: Channel> {
    channel: C,
    config: TransceiverConfig,
    stats: LinkStats,
}

impl<C: Channel> Transceiver<C> {
    /// Create a transceiver; the channel is used as is (open it first or call [`open`](Self::open))
    pub fn new(channel: C, config: TransceiverConfig) -> Self {
        Self {
            channel,
            config,
            stats: LinkStats::default(),
        }
    }

    /// Open the underlying channel
    pub fn open(&mut self) -> Result<(), ProtocolError> {
        self.channel.open()
    }

    /// Close the underlying channel
    pub fn close(&mut self) {
        self.channel.close();
    }

    /// Whether the underlying channel is open
    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Configuration in use
    pub fn config(&self) -> &TransceiverConfig {
        &self.config
    }

    /// Cumulative counters
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Reset all counters to zero
    pub fn reset_stats(&mut self) {
        self.stats = LinkStats::default();
    }

    /// The underlying channel
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The underlying channel, mutably
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Give back the channel
    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Frame `payload` and write it; returns the number of bytes written.
    ///
    /// Fails with `PayloadTooLarge` before anything is written if the payload
    /// does not fit in one packet. A failed write is not retried.
    pub fn send_packet(&mut self, payload: &[u8]) -> Result<usize, ProtocolError> {
        if !self.channel.is_open() {
            return Err(ProtocolError::NotConnected);
        }
        let bytes = encode(payload, &self.config.framing)?;
        debug!("sending {} byte packet ({} payload bytes)", bytes.len(), payload.len());
        trace!("tx: {:02x?}", bytes);

        if self.config.flush_unread {
            if let Err(e) = self.channel.clear_output_buffer() {
                warn!("failed to clear stale output: {}", e);
            }
        }
        self.channel
            .write_all(&bytes)
            .and_then(|_| self.channel.flush())
            .map_err(write_error)?;

        self.stats.tx_bytes = self.stats.tx_bytes.saturating_add(bytes.len() as u64);
        self.stats.tx_packets = self.stats.tx_packets.saturating_add(1);
        Ok(bytes.len())
    }

    /// Receive one packet and return its payload
    pub fn receive_packet(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.receive_frame().map(|frame| frame.payload)
    }

    /// Receive one packet, keeping its header
    pub fn receive_frame(&mut self) -> Result<Frame, ProtocolError> {
        if !self.channel.is_open() {
            return Err(ProtocolError::NotConnected);
        }
        let timeout = self.channel.read_timeout();
        let mut source = ChannelSource {
            channel: &mut self.channel,
            timeout,
            rx_bytes: 0,
        };
        let result = decoder::receive_frame(&mut source, &self.config.framing, &mut self.stats);
        let rx_bytes = source.rx_bytes;
        self.stats.rx_bytes = self.stats.rx_bytes.saturating_add(rx_bytes);

        let frame = result?;
        self.stats.rx_packets = self.stats.rx_packets.saturating_add(1);
        debug!(
            "received packet from {:#04x}: {} payload bytes",
            frame.address(),
            frame.payload.len()
        );
        self.check_unread();
        Ok(frame)
    }

    /// Send `payload` and wait for the reply
    pub fn request(&mut self, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        self.send_packet(payload)?;
        self.receive_packet()
    }

    /// Report, and optionally drop, bytes left on the line after a packet
    fn check_unread(&mut self) {
        let unread = match self.channel.bytes_to_read() {
            Ok(n) => n,
            Err(e) => {
                debug!("cannot query unread bytes: {}", e);
                return;
            }
        };
        if unread == 0 {
            return;
        }
        warn!("{} unread bytes left after packet", unread);
        if self.config.flush_unread {
            if let Err(e) = self.channel.clear_input_buffer() {
                warn!("failed to flush unread bytes: {}", e);
            }
        }
    }
}

fn write_error(e: io::Error) -> ProtocolError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProtocolError::WriteTimeout,
        io::ErrorKind::NotConnected => ProtocolError::NotConnected,
        _ => ProtocolError::IoError(e),
    }
}
