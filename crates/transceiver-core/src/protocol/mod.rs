//! Serial Link Protocol
//!
//! Implements the addressed, checksummed packet protocol spoken over a serial
//! byte stream.
//!
//! Every packet carries an RFC 1071 checksum over its 6-byte header and a
//! second one over the whole packet. The receiver resynchronizes on the start
//! byte when the stream does not begin with a valid header.

mod decoder;
mod error;
mod header;
mod packet;
pub mod serial;
pub mod stream;
mod transceiver;

pub use decoder::{decode, Frame};
pub use error::{ChecksumKind, ProtocolError};
pub use header::{Header, LengthField};
pub use packet::{encode, encoded_len};
pub use serial::{list_ports, open_port, PortInfo};
pub use stream::{read_up_to, Channel, LoopbackChannel, SerialChannel, TcpChannel};
pub use transceiver::{LinkStats, Transceiver};

/// Default start byte marking the beginning of a packet
pub const DEFAULT_START_BYTE: u8 = 0xAA;

/// Default address stamped on outgoing packets
pub const DEFAULT_ADDRESS: u8 = 0x01;

/// Default address expected on incoming packets
pub const DEFAULT_MASTER_ADDRESS: u8 = 0x00;

/// Default baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default read and write timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Header length: start, address, length field and header checksum
pub const HEADER_LEN: usize = 6;

/// Length of each RFC 1071 checksum field
pub const CHECKSUM_LEN: usize = 2;

/// Largest payload accepted for sending, in bytes (0xFFF words)
pub const MAX_PAYLOAD_LEN: usize = 0x1FFE;

/// Number of resync steps before giving up on finding a header
pub const MAX_RESYNC_ATTEMPTS: usize = 100;
