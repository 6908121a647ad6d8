// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// USB printer discovery.  A host without a usable USB stack simply has no
// USB printers.

use async_trait::async_trait;
use tracing::debug;

use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{DiscoveredPrinter, TransportType};

use super::Scanner;
use crate::transport::usb::{UsbPrinterInfo, list_usb_printers};

/// USB printer-class device scanner.
pub struct UsbScanner;

#[async_trait]
impl Scanner for UsbScanner {
    fn transport(&self) -> TransportType {
        TransportType::Usb
    }

    async fn scan(&self) -> Result<Vec<DiscoveredPrinter>> {
        let listed = tokio::task::spawn_blocking(list_usb_printers)
            .await
            .map_err(|e| TokenprintError::Discovery(format!("USB enumeration task: {e}")))?;

        match listed {
            Ok(devices) => Ok(candidates(&devices)),
            Err(e) => {
                debug!(error = %e, "USB driver unavailable; no USB printers");
                Ok(Vec::new())
            }
        }
    }
}

/// One candidate per device, numbered from 1 in enumeration order.
fn candidates(devices: &[UsbPrinterInfo]) -> Vec<DiscoveredPrinter> {
    devices
        .iter()
        .enumerate()
        .map(|(i, dev)| {
            let product = dev.product.as_deref().unwrap_or("Unknown");
            DiscoveredPrinter::new(
                TransportType::Usb,
                dev.selector().to_string(),
                format!("USB Thermal Printer {} ({product})", i + 1),
                format!("USB Device: {product}"),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(product_id: u16, serial: Option<&str>, product: Option<&str>) -> UsbPrinterInfo {
        UsbPrinterInfo {
            vendor_id: 0x0416,
            product_id,
            serial: serial.map(String::from),
            manufacturer: None,
            product: product.map(String::from),
            port: Some(format!("1-{product_id}")),
        }
    }

    fn twin(port: &str) -> UsbPrinterInfo {
        UsbPrinterInfo {
            port: Some(port.into()),
            ..device(0x5011, None, Some("POS58"))
        }
    }

    #[test]
    fn identical_models_get_distinct_ids() {
        let found = candidates(&[
            device(0x5011, Some("A1"), Some("POS58")),
            device(0x5011, Some("B2"), Some("POS58")),
        ]);
        assert_eq!(found[0].connection_string, "0416:5011:A1");
        assert_eq!(found[0].id, "usb_0416_5011_A1_e2a4b6b0");
        assert_ne!(found[0].id, found[1].id);
        assert_eq!(found[1].name, "USB Thermal Printer 2 (POS58)");
    }

    #[test]
    fn serial_less_twins_both_survive_dedup() {
        let found = candidates(&[twin("1-1.2"), twin("1-1.3")]);
        assert_eq!(found[0].connection_string, "0416:5011@1-1.2");
        assert_eq!(found[0].id, "usb_0416_5011_1_1_2_ebb16b3e");
        assert_eq!(found[1].id, "usb_0416_5011_1_1_3_feb06d6e");

        let kept = crate::discovery::dedup_by_id(found);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn missing_product_string_is_unknown() {
        let found = candidates(&[UsbPrinterInfo {
            port: None,
            ..device(0x5011, None, None)
        }]);
        assert_eq!(found[0].name, "USB Thermal Printer 1 (Unknown)");
        assert_eq!(found[0].description, "USB Device: Unknown");
        assert_eq!(found[0].connection_string, "0416:5011");
    }
}
