// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// Every section falls back to its defaults field-by-field, so a config file
// written by an older build (or a hand-edited partial file) still loads.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Persistent application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub discovery: DiscoveryConfig,
    pub connection: ConnectionConfig,
    pub receipt: ReceiptConfig,
}

/// Timeouts and fan-out limits for the discovery scanners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Per-probe TCP connect timeout for the network sweep.
    pub probe_timeout_ms: u64,
    /// Per-probe TCP connect timeout for the Wi-Fi fallback sweep.
    pub wifi_probe_timeout_ms: u64,
    /// Upper bound on the Wi-Fi identify probe (connect + write ESC @).
    pub identify_timeout_ms: u64,
    /// How long to listen for mDNS answers.
    pub mdns_window_secs: u64,
    /// How long to run a BLE scan.
    pub ble_window_secs: u64,
    /// Maximum concurrent TCP probes.
    pub max_in_flight_probes: usize,
    /// Host offsets 1..=N probed on each /24 by the network scanner.
    pub network_host_limit: u8,
    /// Host offsets 1..=N probed on each /24 by the Wi-Fi fallback.
    pub wifi_host_limit: u8,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 1000,
            wifi_probe_timeout_ms: 500,
            identify_timeout_ms: 1000,
            mdns_window_secs: 5,
            ble_window_secs: 10,
            max_in_flight_probes: 60,
            network_host_limit: 20,
            wifi_host_limit: 10,
        }
    }
}

impl DiscoveryConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn wifi_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.wifi_probe_timeout_ms)
    }

    pub fn identify_timeout(&self) -> Duration {
        Duration::from_millis(self.identify_timeout_ms)
    }

    pub fn mdns_window(&self) -> Duration {
        Duration::from_secs(self.mdns_window_secs)
    }

    pub fn ble_window(&self) -> Duration {
        Duration::from_secs(self.ble_window_secs)
    }
}

/// Transport-level connection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// TCP connect timeout for network, Wi-Fi, and bridge printers.
    pub connect_timeout_secs: u64,
    /// Baud rate for serial and RFCOMM printers (8N1, no flow control).
    pub serial_baud_rate: u32,
    /// Port assumed when a network connection string omits one.
    pub default_network_port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            serial_baud_rate: 9600,
            default_network_port: 9100,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Fixed text of the token receipt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptConfig {
    pub title: String,
    pub separator: String,
    pub instruction: String,
    /// `chrono` format string for the date/time line.
    pub date_format: String,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            title: "TOKEN SYSTEM".into(),
            separator: "================".into(),
            instruction: "Please wait for your turn".into(),
            date_format: "%d/%m/%Y %H:%M:%S".into(),
        }
    }
}
