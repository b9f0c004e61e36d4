//! Protocol errors

use thiserror::Error;

use crate::config::ConfigError;

/// Which checksum failed on an otherwise complete packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// RFC 1071 sum over header, payload and pad
    Packet,
    /// Trailing XOR parity byte of the payload
    Lrc,
}

impl std::fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumKind::Packet => write!(f, "packet"),
            ChecksumKind::Lrc => write!(f, "LRC"),
        }
    }
}

/// Errors that can occur during link communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Nothing arrived within the read timeout
    #[error("No reply: read timed out")]
    ReadTimeout,

    /// The channel did not accept the packet within the write timeout
    #[error("Write timed out")]
    WriteTimeout,

    /// The stream ended or went quiet inside a packet
    #[error("Incomplete {context}: expected {expected} bytes, got {actual}")]
    BadData {
        /// Part of the packet being read
        context: &'static str,
        /// Bytes needed
        expected: usize,
        /// Bytes received
        actual: usize,
    },

    /// A complete packet failed verification
    #[error("Bad {0} checksum")]
    BadChecksum(ChecksumKind),

    /// Packet from an unexpected sender, under the reject policy
    #[error("Address mismatch: expected {expected:#04x}, got {actual:#04x}")]
    AddressMismatch {
        /// Configured master address
        expected: u8,
        /// Address in the received header
        actual: u8,
    },

    /// No valid header found within the resync budget
    #[error("Communication error: {0}")]
    CommunicationError(String),

    /// Payload does not fit in one packet
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload length, including any LRC byte
        len: usize,
        /// Largest accepted length
        max: usize,
    },

    /// Channel closed or never opened
    #[error("Channel is not open")]
    NotConnected,

    /// Serial driver failure
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// The named port does not exist
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Invalid settings
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Other I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// True for failures where the caller may simply try the whole operation again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProtocolError::ReadTimeout
                | ProtocolError::WriteTimeout
                | ProtocolError::BadData { .. }
                | ProtocolError::BadChecksum(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProtocolError::BadData {
            context: "header",
            expected: 6,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Incomplete header: expected 6 bytes, got 2");

        let err = ProtocolError::AddressMismatch {
            expected: 0x00,
            actual: 0x1f,
        };
        assert_eq!(err.to_string(), "Address mismatch: expected 0x00, got 0x1f");

        let err = ProtocolError::BadChecksum(ChecksumKind::Lrc);
        assert_eq!(err.to_string(), "Bad LRC checksum");
    }

    #[test]
    fn test_retryable() {
        assert!(ProtocolError::ReadTimeout.is_retryable());
        assert!(ProtocolError::BadChecksum(ChecksumKind::Packet).is_retryable());
        assert!(!ProtocolError::NotConnected.is_retryable());
        assert!(!ProtocolError::CommunicationError("gone".into()).is_retryable());
    }
}
