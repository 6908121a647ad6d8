// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serial-port transport (RS-232, USB-serial adapters, bound RFCOMM nodes).
//
// Always 8 data bits, no parity, one stop bit, no flow control.  Only the baud
// rate is configurable.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use tokenprint_core::config::ConnectionConfig;
use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{PrinterConfig, TransportType};

use super::{TransportDriver, TransportFactory};

/// Read/write timeout handed to the serial stack.
const PORT_TIMEOUT: Duration = Duration::from_secs(2);

/// An open-on-demand serial port.
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    kind: TransportType,
    port: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self::with_kind(path, baud_rate, TransportType::Serial)
    }

    /// A serial port that stands in for another link type, such as an RFCOMM
    /// node carrying a Bluetooth printer.
    pub fn with_kind(path: impl Into<String>, baud_rate: u32, kind: TransportType) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            kind,
            port: None,
        }
    }

    /// Windows wants `\\.\COM10` style names for ports above COM9.
    fn os_port_name(&self) -> String {
        if cfg!(target_os = "windows") && !self.path.to_uppercase().starts_with(r"\\.\") {
            format!(r"\\.\{}", self.path)
        } else {
            self.path.clone()
        }
    }
}

/// Map a serial-stack error onto the typed connection variants.
fn map_serial_error(path: &str, err: tokio_serial::Error) -> TokenprintError {
    let detail = format!("{path}: {}", err.description);
    match err.kind {
        tokio_serial::ErrorKind::NoDevice => TokenprintError::DeviceNotFound(detail),
        tokio_serial::ErrorKind::Io(kind) => {
            TokenprintError::from_io(path, io::Error::new(kind, err.description))
        }
        _ => TokenprintError::Transport(detail),
    }
}

#[async_trait]
impl TransportDriver for SerialTransport {
    fn kind(&self) -> TransportType {
        self.kind
    }

    fn target(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Err(TokenprintError::AlreadyOpen(self.path.clone()));
        }

        let port_name = self.os_port_name();
        debug!(port = %port_name, baud_rate = self.baud_rate, "opening serial port");

        let port = tokio_serial::new(&port_name, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(PORT_TIMEOUT)
            .open_native_async()
            .map_err(|e| {
                warn!(port = %port_name, error = %e, "failed to open serial port");
                map_serial_error(&self.path, e)
            })?;

        self.port = Some(port);
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(port) = self.port.as_mut() else {
            return Err(TokenprintError::NotOpen(self.path.clone()));
        };

        port.write_all(bytes)
            .await
            .map_err(|e| TokenprintError::from_io(&self.path, e))?;
        port.flush()
            .await
            .map_err(|e| TokenprintError::from_io(&self.path, e))?;

        info!(port = %self.path, bytes = bytes.len(), "data sent over serial");
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.shutdown().await {
                debug!(port = %self.path, error = %e, "serial shutdown failed");
            }
        }
    }
}

/// Builds `SerialTransport`s from device paths (`/dev/ttyUSB0`, `COM3`).
pub struct SerialFactory {
    baud_rate: u32,
}

impl SerialFactory {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            baud_rate: config.serial_baud_rate,
        }
    }
}

impl TransportFactory for SerialFactory {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn build(&self, config: &PrinterConfig) -> Result<Box<dyn TransportDriver>> {
        let path = config.connection_string.trim();
        if path.is_empty() {
            return Err(TokenprintError::Unsupported(
                "serial printer has no port path".into(),
            ));
        }
        Ok(Box::new(SerialTransport::new(path, self.baud_rate)))
    }
}
