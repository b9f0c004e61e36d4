//! # Transceiver Core Library
//!
//! Link-layer framing for addressed devices on a serial byte stream.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - RFC 1071 style and LRC checksums
//! - Packet encoding with header and packet checksums
//! - A resynchronizing packet receiver over any blocking byte channel
//! - Serial, TCP and in-memory channels
//! - JSON link configuration
//!
//! ## Packet layout
//!
//! ```text
//! [start:1][address:1][length:2 LE][header checksum:2][payload:N][pad:0-1][packet checksum:2]
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use transceiver_core::{config::LinkConfig, protocol::Transceiver};
//!
//! let config = LinkConfig::from_file("link.json")?;
//! let mut link = config.open_serial()?;
//!
//! link.send_packet(&[0x10, 0x20])?;
//! let reply = link.receive_packet()?;
//! ```

pub mod checksum;
pub mod config;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::checksum::{lrc, rfc1071};
    pub use crate::config::{AddressPolicy, FrameOptions, LinkConfig, LrcMode, SerialSettings};
    pub use crate::protocol::{
        Channel, Frame, LinkStats, LoopbackChannel, ProtocolError, SerialChannel, Transceiver,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
