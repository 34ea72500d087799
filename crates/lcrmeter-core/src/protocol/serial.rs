//! Serial port handling
//!
//! Port discovery and opening for the meter's USB-serial link.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use super::ProtocolError;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,
}

impl PortInfo {
    /// A port known only by name
    pub fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            product: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb_info) => Self {
                name: info.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                product: usb_info.product,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// Ordering class of a port name. USB-serial adapters are listed first since
/// that is how the E7-28 enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PortClass {
    UsbSerial(u32),
    UsbAcm(u32),
    Com(u32),
    Other,
}

fn classify(name: &str) -> PortClass {
    let base = name.rsplit('/').next().unwrap_or(name);
    let suffix = |prefix: &str| {
        base.strip_prefix(prefix)
            .map(|rest| rest.parse::<u32>().unwrap_or(u32::MAX))
    };
    if let Some(n) = suffix("ttyUSB") {
        PortClass::UsbSerial(n)
    } else if let Some(n) = suffix("ttyACM") {
        PortClass::UsbAcm(n)
    } else {
        match base.strip_prefix("COM").and_then(|rest| rest.parse().ok()) {
            Some(n) => PortClass::Com(n),
            None => PortClass::Other,
        }
    }
}

/// Device nodes udev has not reported yet
#[cfg(target_os = "linux")]
fn dev_nodes() -> Vec<String> {
    let Ok(entries) = std::fs::read_dir("/dev") else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("ttyUSB") || name.starts_with("ttyACM"))
        .map(|name| format!("/dev/{name}"))
        .collect()
}

#[cfg(not(target_os = "linux"))]
fn dev_nodes() -> Vec<String> {
    Vec::new()
}

/// Enumerate serial ports a meter could be attached to.
///
/// USB adapters come first in numeric order, then COM ports, then the rest by
/// name. Enumeration errors yield an empty list.
pub fn list_ports() -> Vec<PortInfo> {
    let mut found: BTreeMap<(PortClass, String), PortInfo> = BTreeMap::new();

    match serialport::available_ports() {
        Ok(ports) => {
            for port in ports.into_iter().map(PortInfo::from) {
                found.entry((classify(&port.name), port.name.clone())).or_insert(port);
            }
        }
        Err(e) => tracing::warn!(error = %e, "serial port enumeration failed"),
    }
    for name in dev_nodes() {
        found
            .entry((classify(&name), name.clone()))
            .or_insert_with(|| PortInfo::bare(name));
    }

    found.into_values().collect()
}

/// Open a serial port configured for the meter: 8 data bits, no parity,
/// 1 stop bit, no flow control.
pub fn open_port(
    name: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, ProtocolError> {
    serialport::new(name, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))
}

/// Clear the serial port buffers
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))
}
