//! Serial port handling
//!
//! Port discovery and opening with the configured line parameters.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;

use super::ProtocolError;
use crate::config::SerialSettings;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Sort key: USB adapters (ttyUSB*, then ttyACM*), then on-board UARTs
/// (ttyS*), then everything else by name. Numeric suffixes sort numerically.
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0, "ttyUSB"), (1, "ttyACM"), (2, "ttyS")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            if let Ok(num) = rest.parse::<usize>() {
                return (rank, num, basename.to_string());
            }
        }
    }
    (3, 0, basename.to_string())
}

/// List available serial ports in a stable order
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let port = PortInfo::from(info);
        map.entry(port.name.clone()).or_insert(port);
    }

    // USB adapters enumerated late may be missing from the API listing
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyUSB") || fname.starts_with("ttyACM") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut ports: Vec<PortInfo> = map.into_values().collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// Open and configure a serial port.
///
/// The port starts with the read timeout programmed and both buffers cleared.
pub fn open_port(settings: &SerialSettings) -> Result<Box<dyn SerialPort>, ProtocolError> {
    settings.validate()?;

    let port = serialport::new(settings.port.as_str(), settings.baud_rate)
        .data_bits(settings.data_bits.into())
        .parity(settings.parity.into())
        .stop_bits(settings.stop_bits.into())
        .flow_control(settings.flow_control.into())
        .timeout(settings.read_timeout())
        .open()
        .map_err(|e| match e.kind {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(settings.port.clone()),
            _ => ProtocolError::SerialError(e.to_string()),
        })?;

    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

    tracing::debug!(
        "opened {} at {} baud ({:?}, {:?}, {:?})",
        settings.port,
        settings.baud_rate,
        settings.data_bits,
        settings.parity,
        settings.stop_bits
    );
    Ok(port)
}
