// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bluetooth printer discovery.
//
// With the `ble` feature we run a BLE scan filtered to the common printer
// service (0x18F0).  Without it, or when the adapter is unavailable, we ask
// the OS for its paired devices: `bluetoothctl` on Linux, PowerShell's
// `Get-PnpDevice` on Windows.  Every other host yields nothing.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use tokenprint_core::config::DiscoveryConfig;
use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{DiscoveredPrinter, TransportType};

use super::Scanner;

/// Upper bound on the paired-device query.
const PAIRED_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether an advertised or paired device name looks like a printer.
pub fn looks_like_printer(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    ["printer", "pos", "receipt"]
        .iter()
        .any(|needle| name.contains(needle))
}

/// Bluetooth printer scanner.
pub struct BluetoothScanner {
    #[cfg_attr(not(feature = "ble"), allow(dead_code))]
    config: DiscoveryConfig,
}

impl BluetoothScanner {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Scanner for BluetoothScanner {
    fn transport(&self) -> TransportType {
        TransportType::Bluetooth
    }

    async fn scan(&self) -> Result<Vec<DiscoveredPrinter>> {
        if let Some(found) = self.scan_ble().await {
            return Ok(found);
        }
        paired_printers().await
    }
}

impl BluetoothScanner {
    #[cfg(feature = "ble")]
    async fn scan_ble(&self) -> Option<Vec<DiscoveredPrinter>> {
        match ble::scan(self.config.ble_window()).await {
            Ok(found) => Some(found),
            Err(e) => {
                info!(error = %e, "BLE scan unavailable; listing paired devices");
                None
            }
        }
    }

    #[cfg(not(feature = "ble"))]
    async fn scan_ble(&self) -> Option<Vec<DiscoveredPrinter>> {
        None
    }
}

/// Paired devices whose name passes [`looks_like_printer`].
async fn paired_printers() -> Result<Vec<DiscoveredPrinter>> {
    let Some(command) = paired_device_command() else {
        debug!("no paired-device listing on this host");
        return Ok(Vec::new());
    };

    let Some(output) = run_paired_query(command, PAIRED_QUERY_TIMEOUT).await? else {
        return Ok(Vec::new());
    };

    let devices = if cfg!(windows) {
        parse_pnp_devices(&output)
    } else {
        parse_bluetoothctl_devices(&output)
    };

    let printers: Vec<_> = devices
        .into_iter()
        .filter(|(_, name)| looks_like_printer(name))
        .map(|(address, name)| {
            DiscoveredPrinter::new(
                TransportType::Bluetooth,
                address,
                format!("Bluetooth Printer ({name})"),
                format!("Paired Bluetooth device: {name}"),
            )
        })
        .collect();
    info!(count = printers.len(), "paired Bluetooth printers listed");
    Ok(printers)
}

/// Run the paired-device listing and return its stdout.
///
/// `None` when the tool is not installed.  The child is killed if `limit`
/// elapses first.
async fn run_paired_query(mut command: Command, limit: Duration) -> Result<Option<String>> {
    command.kill_on_drop(true);

    let output = match tokio::time::timeout(limit, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            debug!(error = %e, "paired-device tool not installed");
            return Ok(None);
        }
        Ok(Err(e)) => return Err(TokenprintError::from_io("list paired Bluetooth devices", e)),
        Err(_) => {
            return Err(TokenprintError::Timeout(
                "listing paired Bluetooth devices".into(),
            ));
        }
    };

    if !output.status.success() {
        return Err(TokenprintError::Discovery(format!(
            "paired-device query exited with {}",
            output.status
        )));
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
}

fn paired_device_command() -> Option<Command> {
    if cfg!(target_os = "linux") {
        let mut command = Command::new("bluetoothctl");
        command.args(["devices", "Paired"]);
        Some(command)
    } else if cfg!(windows) {
        let mut command = Command::new("powershell");
        command.args([
            "-NoProfile",
            "-Command",
            "Get-PnpDevice -Class Bluetooth | ForEach-Object { \"$($_.InstanceId)|$($_.FriendlyName)\" }",
        ]);
        Some(command)
    } else {
        None
    }
}

/// `(address, name)` pairs from `bluetoothctl devices` output
/// (`Device AA:BB:CC:DD:EE:FF Name`).
pub fn parse_bluetoothctl_devices(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Device ")?;
            let (address, name) = rest.split_once(' ')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (address.to_owned(), name.to_owned()))
        })
        .collect()
}

/// `(instance id, friendly name)` pairs from `InstanceId|FriendlyName` lines.
pub fn parse_pnp_devices(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let (id, name) = line.trim().split_once('|')?;
            let (id, name) = (id.trim(), name.trim());
            (!id.is_empty() && !name.is_empty()).then(|| (id.to_owned(), name.to_owned()))
        })
        .collect()
}

#[cfg(feature = "ble")]
mod ble {
    use std::time::Duration;

    use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
    use btleplug::platform::Manager;
    use tracing::debug;
    use uuid::Uuid;

    use tokenprint_core::error::{Result, TokenprintError};
    use tokenprint_core::types::{DiscoveredPrinter, TransportType};

    use super::looks_like_printer;

    /// 16-bit service 0x18F0 widened to the Bluetooth base UUID.
    const PRINTER_SERVICE: Uuid = Uuid::from_u128(0x0000_18f0_0000_1000_8000_0080_5f9b_34fb);

    fn ble_err(what: &str) -> impl FnOnce(btleplug::Error) -> TokenprintError + '_ {
        move |e| TokenprintError::Discovery(format!("{what}: {e}"))
    }

    pub(super) async fn scan(window: Duration) -> Result<Vec<DiscoveredPrinter>> {
        let manager = Manager::new().await.map_err(ble_err("BLE manager"))?;
        let central = manager
            .adapters()
            .await
            .map_err(ble_err("BLE adapters"))?
            .into_iter()
            .next()
            .ok_or_else(|| TokenprintError::Discovery("no BLE adapter".into()))?;

        central
            .start_scan(ScanFilter {
                services: vec![PRINTER_SERVICE],
            })
            .await
            .map_err(ble_err("start BLE scan"))?;
        tokio::time::sleep(window).await;
        let peripherals = central.peripherals().await.map_err(ble_err("BLE peripherals"));
        if let Err(e) = central.stop_scan().await {
            debug!(error = %e, "stop BLE scan failed");
        }

        let mut printers = Vec::new();
        for peripheral in peripherals? {
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            printers.extend(advert_candidate(
                peripheral.address().to_string(),
                props.local_name.as_deref(),
                props.rssi,
            ));
        }
        Ok(printers)
    }

    /// Candidate for an advertisement whose local name looks like a printer.
    fn advert_candidate(
        address: String,
        name: Option<&str>,
        rssi: Option<i16>,
    ) -> Option<DiscoveredPrinter> {
        let name = name.filter(|n| looks_like_printer(n))?;
        let rssi = rssi.map_or_else(|| "?".to_owned(), |r| r.to_string());
        Some(DiscoveredPrinter::new(
            TransportType::Bluetooth,
            address,
            format!("Bluetooth Printer ({name})"),
            format!("Bluetooth: {name} - RSSI: {rssi}dBm"),
        ))
    }

}
