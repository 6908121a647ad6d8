// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// USB printer transport.
//
// Enumeration goes through `nusb` and keeps devices exposing the USB printer
// class (0x07).  Bytes are written to the kernel printer node
// (`/dev/usb/lpN`) that `usblp` created for the selected device, so the
// kernel keeps ownership of the interface.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use nusb::MaybeFuture;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{PrinterConfig, TransportType};

use super::{TransportDriver, TransportFactory};

/// USB interface class for printers.
pub const PRINTER_CLASS: u8 = 0x07;

/// Which attached USB printer a config refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbSelector {
    /// The first printer-class device found (`auto`, `auto-detect`, or empty).
    FirstPrinter,
    /// `vvvv:pppp[:serial][@port]`, hex ids.  `port` is the physical port
    /// path (`1-1.4`) and tells apart identical printers with no serial.
    Device {
        vendor_id: u16,
        product_id: u16,
        serial: Option<String>,
        port: Option<String>,
    },
}

impl UsbSelector {
    pub fn matches(&self, info: &UsbPrinterInfo) -> bool {
        match self {
            Self::FirstPrinter => true,
            Self::Device {
                vendor_id,
                product_id,
                serial,
                port,
            } => {
                *vendor_id == info.vendor_id
                    && *product_id == info.product_id
                    && serial
                        .as_deref()
                        .is_none_or(|s| info.serial.as_deref() == Some(s))
                    && port
                        .as_deref()
                        .is_none_or(|p| info.port.as_deref() == Some(p))
            }
        }
    }
}

impl fmt::Display for UsbSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstPrinter => f.write_str("auto"),
            Self::Device {
                vendor_id,
                product_id,
                serial,
                port,
            } => {
                write!(f, "{vendor_id:04x}:{product_id:04x}")?;
                if let Some(serial) = serial {
                    write!(f, ":{serial}")?;
                }
                if let Some(port) = port {
                    write!(f, "@{port}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for UsbSelector {
    type Err = TokenprintError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("auto") || s.eq_ignore_ascii_case("auto-detect")
        {
            return Ok(Self::FirstPrinter);
        }

        let invalid = || {
            TokenprintError::Unsupported(format!(
                "'{s}' is not a USB selector (expected auto or vvvv:pppp[:serial][@port])"
            ))
        };
        let (ids, port) = match s.rsplit_once('@') {
            Some((ids, port)) if is_port_path(port) => (ids, Some(port.to_string())),
            _ => (s, None),
        };
        let mut parts = ids.splitn(3, ':');
        let vendor_id = parts
            .next()
            .and_then(|v| u16::from_str_radix(v, 16).ok())
            .ok_or_else(invalid)?;
        let product_id = parts
            .next()
            .and_then(|p| u16::from_str_radix(p, 16).ok())
            .ok_or_else(invalid)?;
        let serial = parts.next().filter(|s| !s.is_empty()).map(str::to_string);

        Ok(Self::Device {
            vendor_id,
            product_id,
            serial,
            port,
        })
    }
}

fn is_port_path(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_graphic() && c != ':' && c != '@')
}

/// Descriptor strings of an attached USB printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbPrinterInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    /// Physical port path, `bus-p1.p2...` as sysfs names the device.
    pub port: Option<String>,
}

impl UsbPrinterInfo {
    /// Selector that picks exactly this device.
    ///
    /// A serial number follows the printer to any port.  Without one the
    /// port path is the only thing separating two printers of the same model.
    pub fn selector(&self) -> UsbSelector {
        UsbSelector::Device {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            serial: self.serial.clone(),
            port: if self.serial.is_some() {
                None
            } else {
                self.port.clone()
            },
        }
    }
}

/// `bus-p1.p2...`; `None` for a device with no port chain.
fn format_port(bus: &str, chain: &[u8]) -> Option<String> {
    if chain.is_empty() {
        return None;
    }
    let chain: Vec<String> = chain.iter().map(u8::to_string).collect();
    Some(format!("{bus}-{}", chain.join(".")))
}

#[cfg(target_os = "linux")]
fn port_path(dev: &nusb::DeviceInfo) -> Option<String> {
    format_port(&dev.busnum().to_string(), dev.port_chain())
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn port_path(dev: &nusb::DeviceInfo) -> Option<String> {
    format_port(dev.bus_id(), dev.port_chain()).filter(|p| is_port_path(p))
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn port_path(_dev: &nusb::DeviceInfo) -> Option<String> {
    None
}

fn is_printer(dev: &nusb::DeviceInfo) -> bool {
    dev.class() == PRINTER_CLASS || dev.interfaces().any(|i| i.class() == PRINTER_CLASS)
}

/// Attached USB printer-class devices.  Blocking.
///
/// Fails with `Unsupported` when the host's USB stack cannot be enumerated.
pub fn list_usb_printers() -> Result<Vec<UsbPrinterInfo>> {
    let devices = nusb::list_devices()
        .wait()
        .map_err(|e| TokenprintError::Unsupported(format!("USB enumeration failed: {e}")))?;

    let printers: Vec<UsbPrinterInfo> = devices
        .filter(is_printer)
        .map(|dev| UsbPrinterInfo {
            vendor_id: dev.vendor_id(),
            product_id: dev.product_id(),
            serial: dev.serial_number().map(str::to_string),
            manufacturer: dev.manufacturer_string().map(str::to_string),
            product: dev.product_string().map(str::to_string),
            port: port_path(&dev),
        })
        .collect();

    debug!(count = printers.len(), "USB printer-class devices");
    Ok(printers)
}

/// Read the USB descriptor attributes behind a `/sys/class/usbmisc/lpN`
/// entry.  The entry's `device` link points at the printer interface; the
/// descriptor files live on its parent.
fn read_lp_sysfs(entry: &Path) -> Option<UsbPrinterInfo> {
    let interface = std::fs::canonicalize(entry.join("device")).ok()?;
    let device = interface.parent()?;
    let port = device
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| is_port_path(name))
        .map(str::to_string);
    let attr = |name: &str| {
        std::fs::read_to_string(device.join(name))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    Some(UsbPrinterInfo {
        vendor_id: u16::from_str_radix(&attr("idVendor")?, 16).ok()?,
        product_id: u16::from_str_radix(&attr("idProduct")?, 16).ok()?,
        serial: attr("serial"),
        manufacturer: attr("manufacturer"),
        product: attr("product"),
        port,
    })
}

/// Find the `usblp` device node for the selected printer.
fn find_lp_node(usbmisc: &Path, selector: &UsbSelector) -> Result<PathBuf> {
    let entries = std::fs::read_dir(usbmisc).map_err(|e| {
        TokenprintError::DeviceNotFound(format!(
            "{}: {e} (is the usblp driver loaded?)",
            usbmisc.display()
        ))
    })?;

    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("lp"))
        .collect();
    names.sort();

    names
        .into_iter()
        .find(|name| {
            read_lp_sysfs(&usbmisc.join(name)).is_some_and(|info| selector.matches(&info))
        })
        .map(|name| Path::new("/dev/usb").join(name))
        .ok_or_else(|| {
            TokenprintError::DeviceNotFound(format!("no USB printer matching {selector}"))
        })
}

/// Writes to the kernel printer node of one USB printer.
pub struct UsbTransport {
    selector: UsbSelector,
    target: String,
    file: Option<File>,
}

impl UsbTransport {
    pub fn new(selector: UsbSelector) -> Self {
        Self {
            target: format!("usb:{selector}"),
            selector,
            file: None,
        }
    }
}

#[async_trait]
impl TransportDriver for UsbTransport {
    fn kind(&self) -> TransportType {
        TransportType::Usb
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Err(TokenprintError::AlreadyOpen(self.target.clone()));
        }

        let node = find_lp_node(Path::new("/sys/class/usbmisc"), &self.selector)?;
        debug!(device = %self.target, node = %node.display(), "opening USB printer node");

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&node)
            .await
            .map_err(|e| TokenprintError::from_io(node.display(), e))?;

        self.file = Some(file);
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(TokenprintError::NotOpen(self.target.clone()));
        };

        file.write_all(bytes)
            .await
            .map_err(|e| TokenprintError::from_io(&self.target, e))?;
        file.flush()
            .await
            .map_err(|e| TokenprintError::from_io(&self.target, e))?;

        info!(device = %self.target, bytes = bytes.len(), "data sent over USB");
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush().await {
                debug!(device = %self.target, error = %e, "USB flush on close failed");
            }
        }
    }
}

/// Builds `UsbTransport`s.  Only Linux hosts with a working USB stack qualify.
pub struct UsbFactory;

impl TransportFactory for UsbFactory {
    fn name(&self) -> &'static str {
        "usb"
    }

    fn build(&self, config: &PrinterConfig) -> Result<Box<dyn TransportDriver>> {
        if !cfg!(target_os = "linux") {
            return Err(TokenprintError::Unsupported(
                "USB printing needs the Linux usblp driver".into(),
            ));
        }
        let selector: UsbSelector = config.connection_string.parse()?;
        list_usb_printers()?;
        Ok(Box::new(UsbTransport::new(selector)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tm88() -> UsbPrinterInfo {
        UsbPrinterInfo {
            vendor_id: 0x04b8,
            product_id: 0x0202,
            serial: Some("J7X0001".into()),
            manufacturer: Some("EPSON".into()),
            product: Some("TM-T88V".into()),
            port: Some("1-1".into()),
        }
    }

    fn pos58_at(port: &str) -> UsbPrinterInfo {
        UsbPrinterInfo {
            vendor_id: 0x0416,
            product_id: 0x5011,
            serial: None,
            manufacturer: None,
            product: Some("POS58".into()),
            port: Some(port.into()),
        }
    }

    #[test]
    fn auto_forms_select_first_printer() {
        for s in ["", "auto", "AUTO-DETECT", " auto "] {
            assert_eq!(s.parse::<UsbSelector>().unwrap(), UsbSelector::FirstPrinter);
        }
    }

    #[test]
    fn device_selector_parses_hex_ids() {
        let sel: UsbSelector = "04b8:0202:J7X0001".parse().unwrap();
        assert_eq!(sel, tm88().selector());
        assert_eq!(sel.to_string(), "04b8:0202:J7X0001");

        let sel: UsbSelector = "04B8:0202".parse().unwrap();
        assert_eq!(sel.to_string(), "04b8:0202");
        assert!(sel.matches(&tm88()));
    }

    #[test]
    fn serial_must_match_when_given() {
        let sel: UsbSelector = "04b8:0202:OTHER".parse().unwrap();
        assert!(!sel.matches(&tm88()));
        assert!(UsbSelector::FirstPrinter.matches(&tm88()));
    }

    #[test]
    fn serial_less_twins_are_told_apart_by_port() {
        let left = pos58_at("1-1.2");
        let right = pos58_at("1-1.3");
        assert_eq!(left.selector().to_string(), "0416:5011@1-1.2");
        assert_ne!(left.selector(), right.selector());

        let sel: UsbSelector = "0416:5011@1-1.3".parse().unwrap();
        assert_eq!(sel, right.selector());
        assert!(sel.matches(&right));
        assert!(!sel.matches(&left));

        // A serial wins over the port, so the printer can be moved.
        assert_eq!(tm88().selector().to_string(), "04b8:0202:J7X0001");
        let both: UsbSelector = "04b8:0202:J7X0001@2-4".parse().unwrap();
        assert!(!both.matches(&tm88()));
    }

    #[test]
    fn port_is_bus_and_chain() {
        assert_eq!(format_port("1", &[1, 4]).as_deref(), Some("1-1.4"));
        assert_eq!(format_port("2", &[3]).as_deref(), Some("2-3"));
        assert_eq!(format_port("1", &[]), None);
    }

    #[test]
    fn garbage_selector_is_unsupported() {
        assert!(matches!(
            "printer-one".parse::<UsbSelector>(),
            Err(TokenprintError::Unsupported(_))
        ));
    }

    #[test]
    fn missing_usbmisc_class_is_device_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_lp_node(&dir.path().join("usbmisc"), &UsbSelector::FirstPrinter)
            .unwrap_err();
        assert!(matches!(err, TokenprintError::DeviceNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn lp_node_matches_sysfs_descriptor() {
        let root = tempfile::tempdir().unwrap();
        let device = root.path().join("devices/1-1");
        let interface = device.join("1-1:1.0");
        std::fs::create_dir_all(&interface).unwrap();
        std::fs::write(device.join("idVendor"), "04b8\n").unwrap();
        std::fs::write(device.join("idProduct"), "0202\n").unwrap();
        std::fs::write(device.join("serial"), "J7X0001\n").unwrap();

        let usbmisc = root.path().join("usbmisc");
        std::fs::create_dir_all(usbmisc.join("lp0")).unwrap();
        std::os::unix::fs::symlink(&interface, usbmisc.join("lp0/device")).unwrap();

        let node = find_lp_node(&usbmisc, &tm88().selector()).unwrap();
        assert_eq!(node, Path::new("/dev/usb/lp0"));

        let other: UsbSelector = "0416:5011".parse().unwrap();
        assert!(find_lp_node(&usbmisc, &other).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn serial_less_twins_map_to_their_own_lp_nodes() {
        let root = tempfile::tempdir().unwrap();
        let usbmisc = root.path().join("usbmisc");
        for (lp, port) in [("lp0", "1-1.2"), ("lp1", "1-1.3")] {
            let device = root.path().join("devices").join(port);
            let interface = device.join(format!("{port}:1.0"));
            std::fs::create_dir_all(&interface).unwrap();
            std::fs::write(device.join("idVendor"), "0416\n").unwrap();
            std::fs::write(device.join("idProduct"), "5011\n").unwrap();
            std::fs::create_dir_all(usbmisc.join(lp)).unwrap();
            std::os::unix::fs::symlink(&interface, usbmisc.join(lp).join("device")).unwrap();
        }

        let node = find_lp_node(&usbmisc, &pos58_at("1-1.3").selector()).unwrap();
        assert_eq!(node, Path::new("/dev/usb/lp1"));
        let node = find_lp_node(&usbmisc, &pos58_at("1-1.2").selector()).unwrap();
        assert_eq!(node, Path::new("/dev/usb/lp0"));
    }
}
