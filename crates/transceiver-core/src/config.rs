//! Link configuration
//!
//! Serial parameters and framing options, stored as JSON:
//!
//! ```json
//! {
//!   "serial": { "port": "/dev/ttyUSB0", "baud_rate": 115200 },
//!   "framing": { "address": 1, "master_address": 0, "address_policy": "discard" },
//!   "flush_unread": true
//! }
//! ```
//!
//! Missing fields take their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{
    Channel, ProtocolError, SerialChannel, Transceiver, DEFAULT_ADDRESS, DEFAULT_BAUD_RATE,
    DEFAULT_MASTER_ADDRESS, DEFAULT_START_BYTE, DEFAULT_TIMEOUT_MS, MAX_RESYNC_ATTEMPTS,
};

/// Errors that can occur while loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid configuration JSON
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A setting is out of range
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        message: String,
    },
}

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    /// 5 bits
    Five,
    /// 6 bits
    Six,
    /// 7 bits
    Seven,
    /// 8 bits
    #[default]
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    /// One stop bit
    #[default]
    One,
    /// Two stop bits
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Flow control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    /// No flow control
    #[default]
    None,
    /// XON/XOFF
    Software,
    /// RTS/CTS
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Serial port parameters, fixed once the channel is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Flow control
    pub flow_control: FlowControl,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            flow_control: FlowControl::default(),
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl SerialSettings {
    /// Settings for `port` with every other value defaulted
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Write timeout
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Check the settings before opening a port
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "baud_rate",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "read_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.write_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "write_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Whether the framer closes each payload with an LRC byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LrcMode {
    /// Payloads are framed as given; any LRC is the caller's business
    #[default]
    None,
    /// Append `lrc(payload)` before framing, verify and strip it on receive
    Append,
}

/// What to do with a packet whose address is not the expected master address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressPolicy {
    /// Do not look at the address
    Ignore,
    /// Log a warning and accept the packet
    Warn,
    /// Log a warning, drop the packet and wait for the next one
    #[default]
    Discard,
    /// Fail the receive with `AddressMismatch`
    Reject,
}

/// Framing parameters shared by encoder and receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameOptions {
    /// Start byte of every packet
    pub start_byte: u8,
    /// Address stamped on outgoing packets
    pub address: u8,
    /// Address expected on incoming packets
    pub master_address: u8,
    /// Verify header and packet checksums on receive
    pub check_checksums: bool,
    /// Trailing LRC handling
    pub lrc: LrcMode,
    /// Handling of packets from unexpected addresses
    pub address_policy: AddressPolicy,
    /// Resync steps (and discarded packets) allowed per receive
    pub max_resync_attempts: usize,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            start_byte: DEFAULT_START_BYTE,
            address: DEFAULT_ADDRESS,
            master_address: DEFAULT_MASTER_ADDRESS,
            check_checksums: true,
            lrc: LrcMode::default(),
            address_policy: AddressPolicy::default(),
            max_resync_attempts: MAX_RESYNC_ATTEMPTS,
        }
    }
}

impl FrameOptions {
    /// Check the options before use
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_resync_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_resync_attempts",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Transceiver behavior on top of the framing options
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransceiverConfig {
    /// Framing parameters
    pub framing: FrameOptions,
    /// Clear stale output before sending, and leftover input after a packet
    pub flush_unread: bool,
}

/// Complete link configuration as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port parameters
    pub serial: SerialSettings,
    /// Framing parameters
    pub framing: FrameOptions,
    /// Clear the input buffer when bytes are left over after a packet
    pub flush_unread: bool,
}

impl LinkConfig {
    /// Parse a configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: LinkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save the configuration to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Check every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.serial.validate()?;
        self.framing.validate()
    }

    /// The transceiver part of the configuration
    pub fn transceiver(&self) -> TransceiverConfig {
        TransceiverConfig {
            framing: self.framing.clone(),
            flush_unread: self.flush_unread,
        }
    }

    /// Open the configured serial port and wrap it in a transceiver
    pub fn open_serial(&self) -> Result<Transceiver<SerialChannel>, ProtocolError> {
        self.validate()?;
        let mut channel = SerialChannel::new(self.serial.clone());
        channel.open()?;
        Ok(Transceiver::new(channel, self.transceiver()))
    }
}
