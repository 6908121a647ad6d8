// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serial port discovery, filtered to the USB-serial bridges receipt printers
// ship with.

use async_trait::async_trait;
use tokio_serial::{SerialPortInfo, SerialPortType};
use tracing::debug;

use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{DiscoveredPrinter, TransportType};

use super::Scanner;

const PATH_PATTERNS: [&str; 3] = ["COM", "ttyUSB", "ttyACM"];

const MANUFACTURER_PATTERNS: [&str; 5] = ["ftdi", "prolific", "silicon labs", "wch", "ch340"];

/// Whether a port path or its adapter's manufacturer matches a known printer
/// adapter.
pub fn is_printer_port(path: &str, manufacturer: Option<&str>) -> bool {
    if PATH_PATTERNS.iter().any(|p| path.contains(p)) {
        return true;
    }
    manufacturer.is_some_and(|m| {
        let m = m.to_ascii_lowercase();
        MANUFACTURER_PATTERNS.iter().any(|p| m.contains(p))
    })
}

/// Serial printer scanner.
pub struct SerialScanner;

#[async_trait]
impl Scanner for SerialScanner {
    fn transport(&self) -> TransportType {
        TransportType::Serial
    }

    async fn scan(&self) -> Result<Vec<DiscoveredPrinter>> {
        let ports = tokio::task::spawn_blocking(tokio_serial::available_ports)
            .await
            .map_err(|e| TokenprintError::Discovery(format!("serial enumeration task: {e}")))?
            .map_err(|e| TokenprintError::Discovery(format!("list serial ports: {e}")))?;

        debug!(count = ports.len(), "serial ports enumerated");
        Ok(ports.iter().filter_map(candidate).collect())
    }
}

fn candidate(port: &SerialPortInfo) -> Option<DiscoveredPrinter> {
    let (manufacturer, product) = match &port.port_type {
        SerialPortType::UsbPort(usb) => (usb.manufacturer.as_deref(), usb.product.as_deref()),
        _ => (None, None),
    };
    if !is_printer_port(&port.port_name, manufacturer) {
        return None;
    }

    Some(DiscoveredPrinter::new(
        TransportType::Serial,
        port.port_name.clone(),
        format!("Serial Printer ({})", port.port_name),
        format!(
            "{} - {}",
            manufacturer.unwrap_or("Unknown"),
            product.unwrap_or("Serial Device")
        ),
    ))
}
