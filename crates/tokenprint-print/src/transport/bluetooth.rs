// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bluetooth transports.
//
// Classic Bluetooth printers speak SPP, which Linux exposes as an RFCOMM tty
// once the device is bound (`rfcomm bind`).  That tty is driven exactly like a
// serial port.  When no native link is possible the printer may still be
// reachable through a Bluetooth-to-IP bridge, in which case the connection
// string is a plain `host:port`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokenprint_core::config::ConnectionConfig;
use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{PrinterConfig, TransportType};

use super::network::NetworkTransport;
use super::serial::SerialTransport;
use super::{TransportDriver, TransportFactory, split_host_port};

/// `AA:BB:CC:DD:EE:FF`, case-insensitive.
pub fn is_bluetooth_address(s: &str) -> bool {
    let parts: Vec<&str> = s.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Find the `/dev/rfcommN` node bound to `address`, by reading each
/// `<tty_class>/rfcommN/address` attribute.
fn rfcomm_node_for(tty_class: &Path, address: &str) -> Option<PathBuf> {
    let mut names: Vec<String> = std::fs::read_dir(tty_class)
        .ok()?
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("rfcomm"))
        .collect();
    names.sort();

    names
        .into_iter()
        .find(|name| {
            std::fs::read_to_string(tty_class.join(name).join("address"))
                .is_ok_and(|bound| bound.trim().eq_ignore_ascii_case(address))
        })
        .map(|name| Path::new("/dev").join(name))
}

/// Native RFCOMM link, Linux only.
pub struct RfcommFactory {
    baud_rate: u32,
    tty_class: PathBuf,
}

impl RfcommFactory {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            baud_rate: config.serial_baud_rate,
            tty_class: PathBuf::from("/sys/class/tty"),
        }
    }

    fn resolve_node(&self, connection: &str) -> Result<PathBuf> {
        if !cfg!(target_os = "linux") {
            return Err(TokenprintError::Unsupported(
                "native Bluetooth serial is only available on Linux".into(),
            ));
        }
        if connection.starts_with("/dev/rfcomm") {
            return Ok(PathBuf::from(connection));
        }
        if is_bluetooth_address(connection) {
            return rfcomm_node_for(&self.tty_class, connection).ok_or_else(|| {
                TokenprintError::Unsupported(format!(
                    "{connection} is not bound to an RFCOMM device"
                ))
            });
        }
        Err(TokenprintError::Unsupported(format!(
            "'{connection}' is not a Bluetooth address or RFCOMM device"
        )))
    }
}

impl TransportFactory for RfcommFactory {
    fn name(&self) -> &'static str {
        "rfcomm"
    }

    fn build(&self, config: &PrinterConfig) -> Result<Box<dyn TransportDriver>> {
        let node = self.resolve_node(config.connection_string.trim())?;
        Ok(Box::new(SerialTransport::with_kind(
            node.to_string_lossy(),
            self.baud_rate,
            TransportType::Bluetooth,
        )))
    }
}

/// Bluetooth printer behind a Bluetooth-to-IP bridge.
///
/// Only accepts an explicit `host:port`; there is no default port here, since
/// a bare address almost certainly means a native device.
pub struct NetworkBridgeFactory {
    connect_timeout: Duration,
}

impl NetworkBridgeFactory {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
        }
    }
}

impl TransportFactory for NetworkBridgeFactory {
    fn name(&self) -> &'static str {
        "network-bridge"
    }

    fn build(&self, config: &PrinterConfig) -> Result<Box<dyn TransportDriver>> {
        let (host, port) = split_host_port(&config.connection_string).ok_or_else(|| {
            TokenprintError::Unsupported(format!(
                "Bluetooth connection failed and no fallback available for '{}'",
                config.connection_string
            ))
        })?;
        Ok(Box::new(NetworkTransport::new(host, port, self.connect_timeout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportRegistry;

    fn bluetooth(conn: &str) -> PrinterConfig {
        PrinterConfig::new("Counter BT", TransportType::Bluetooth, conn)
    }

    #[test]
    fn address_shape() {
        assert!(is_bluetooth_address("00:11:22:AA:bb:cc"));
        assert!(!is_bluetooth_address("00:11:22:AA:bb"));
        assert!(!is_bluetooth_address("192.168.1.9:9100"));
    }

    #[test]
    fn bridge_requires_host_and_port() {
        let factory = NetworkBridgeFactory::new(&ConnectionConfig::default());
        assert!(factory.build(&bluetooth("192.168.4.1:9100")).is_ok());
        assert!(matches!(
            factory.build(&bluetooth("192.168.4.1")).err(),
            Some(TokenprintError::Unsupported(_))
        ));
        assert!(matches!(
            factory.build(&bluetooth("00:11:22:33:44:55")).err(),
            Some(TokenprintError::Unsupported(_))
        ));
    }

    #[test]
    fn bridge_fallback_matches_native_network_driver() {
        let config = ConnectionConfig::default();
        let registry = TransportRegistry::with_defaults(&config);

        let bridged = registry.resolve(&bluetooth("10.0.0.40:9100")).unwrap();
        let native = registry
            .resolve(&PrinterConfig::new(
                "Counter",
                TransportType::Network,
                "10.0.0.40:9100",
            ))
            .unwrap();

        assert_eq!(bridged.kind(), TransportType::Network);
        assert_eq!(bridged.kind(), native.kind());
        assert_eq!(bridged.target(), native.target());
    }

    #[test]
    fn unresolvable_bluetooth_is_unsupported() {
        let registry = TransportRegistry::with_defaults(&ConnectionConfig::default());
        let err = registry.resolve(&bluetooth("Receipt Printer")).err().unwrap();
        assert!(matches!(err, TokenprintError::Unsupported(_)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn bound_address_resolves_to_rfcomm_node() {
        let sys = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(sys.path().join("rfcomm0")).unwrap();
        std::fs::write(sys.path().join("rfcomm0/address"), "00:11:22:33:44:55\n").unwrap();

        let factory = RfcommFactory {
            baud_rate: 9600,
            tty_class: sys.path().to_path_buf(),
        };
        let driver = factory.build(&bluetooth("00:11:22:33:44:55")).unwrap();
        assert_eq!(driver.target(), "/dev/rfcomm0");
        assert_eq!(driver.kind(), TransportType::Bluetooth);

        assert!(matches!(
            factory.build(&bluetooth("66:77:88:99:AA:BB")).err(),
            Some(TokenprintError::Unsupported(_))
        ));
    }
}
