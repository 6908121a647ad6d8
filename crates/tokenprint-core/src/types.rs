// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the tokenprint printer subsystem.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::TokenprintError;

/// Unique identifier for a stored printer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrinterId(pub Uuid);

impl PrinterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PrinterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrinterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PrinterId {
    type Err = TokenprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| TokenprintError::Database(format!("invalid printer id '{s}': {e}")))
    }
}

/// Physical link used to reach a printer.
///
/// `Wifi` is not protocol-distinct from `Network`; it records that the link
/// happens to be wireless and uses the same socket transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Usb,
    Network,
    Wifi,
    Serial,
    Bluetooth,
}

impl TransportType {
    /// Every transport, in the order discovery reports them.
    pub const ALL: [TransportType; 5] = [
        TransportType::Usb,
        TransportType::Network,
        TransportType::Wifi,
        TransportType::Bluetooth,
        TransportType::Serial,
    ];

    /// Lowercase tag used in identifiers, storage, and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Network => "network",
            Self::Wifi => "wifi",
            Self::Serial => "serial",
            Self::Bluetooth => "bluetooth",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = TokenprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usb" => Ok(Self::Usb),
            "network" | "tcp" | "ethernet" => Ok(Self::Network),
            "wifi" | "wi-fi" => Ok(Self::Wifi),
            "serial" | "com" => Ok(Self::Serial),
            "bluetooth" | "bt" => Ok(Self::Bluetooth),
            other => Err(TokenprintError::Unsupported(format!(
                "unknown printer type '{other}'"
            ))),
        }
    }
}

/// Per-printer presentation settings, stored alongside the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSettings {
    /// Paper width in millimetres.
    pub width: u32,
    pub font_size: String,
    pub auto_cut: bool,
    pub encoding: String,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            width: 48,
            font_size: "normal".into(),
            auto_cut: true,
            encoding: "utf8".into(),
        }
    }
}

/// A persisted printer configuration.
///
/// `connection_string` depends on `transport_type`: `host:port` for
/// network/wifi, a device path for serial, an address or bound RFCOMM path for
/// bluetooth (or `host:port` for a Bluetooth-to-IP bridge), and `auto` or
/// `vvvv:pppp[:serial]` for usb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub id: PrinterId,
    pub name: String,
    pub transport_type: TransportType,
    pub connection_string: String,
    pub is_default: bool,
    pub is_connected: bool,
    #[serde(default)]
    pub settings: PrinterSettings,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PrinterConfig {
    pub fn new(
        name: impl Into<String>,
        transport_type: TransportType,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            id: PrinterId::new(),
            name: name.into(),
            transport_type,
            connection_string: connection_string.into(),
            is_default: false,
            is_connected: false,
            settings: PrinterSettings::default(),
            last_used: None,
            created_at: Utc::now(),
        }
    }

    /// Builder-style helper for marking a config as the default printer.
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// Availability reported for a discovery candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    Available,
}

/// A printer candidate produced by a discovery scan.  Never persisted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPrinter {
    pub id: String,
    pub name: String,
    pub transport_type: TransportType,
    pub connection_string: String,
    pub status: CandidateStatus,
    pub description: String,
}

impl DiscoveredPrinter {
    pub fn new(
        transport_type: TransportType,
        connection_string: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let connection_string = connection_string.into();
        Self {
            id: Self::derive_id(transport_type, &connection_string),
            name: name.into(),
            transport_type,
            connection_string,
            status: CandidateStatus::Available,
            description: description.into(),
        }
    }

    /// Stable identifier for a `(transport, connection string)` pair.
    ///
    /// A readable slug (non-alphanumerics folded to `_`) followed by the first
    /// 8 hex digits of the SHA-256 of the raw connection string, so
    /// `(network, "192.168.1.5:9100")` becomes
    /// `network_192_168_1_5_9100_<hash>`.  The hash keeps strings that fold to
    /// the same slug (`AA:BB`, `AA-BB`) apart.
    pub fn derive_id(transport_type: TransportType, connection_string: &str) -> String {
        let slug: String = connection_string
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let digest = Sha256::digest(connection_string.as_bytes());
        format!(
            "{}_{}_{}",
            transport_type.as_str(),
            slug,
            hex::encode(&digest[..4])
        )
    }
}

/// Lifecycle of the connection manager's single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Connected,
    Disconnected,
}

/// A request to print one queue token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenJob {
    pub token_number: u32,
    /// Wall-clock time printed on the ticket.
    pub timestamp: NaiveDateTime,
}

impl TokenJob {
    pub fn new(token_number: u32, timestamp: NaiveDateTime) -> Self {
        Self {
            token_number,
            timestamp,
        }
    }

    /// A job stamped with the local time right now.
    pub fn now(token_number: u32) -> Self {
        Self::new(token_number, chrono::Local::now().naive_local())
    }
}

/// Classified failure reasons for connection and print operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NoPrinterConfigured,
    Unsupported,
    DeviceNotFound,
    PermissionDenied,
    Timeout,
    ConnectionRefused,
    Unknown,
}

/// Outcome of a single print request, returned as data rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintResult {
    pub success: bool,
    pub token_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_detail: Option<String>,
}

impl PrintResult {
    pub fn printed(token_number: u32) -> Self {
        Self {
            success: true,
            token_number,
            error_category: None,
            user_message: None,
            technical_detail: None,
        }
    }

    pub fn failed(
        token_number: u32,
        category: ErrorCategory,
        user_message: String,
        technical_detail: String,
    ) -> Self {
        Self {
            success: false,
            token_number,
            error_category: Some(category),
            user_message: Some(user_message),
            technical_detail: Some(technical_detail),
        }
    }
}

/// Aggregate status of a batch of print requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Partial,
    Failed,
}

/// Summary of a batch, derived from its per-job results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub status: BatchStatus,
    pub printed: usize,
    pub failed: usize,
    pub results: Vec<PrintResult>,
}

impl BatchSummary {
    pub fn from_results(results: Vec<PrintResult>) -> Self {
        let printed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - printed;
        let status = if failed == 0 {
            BatchStatus::Success
        } else if printed == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        };
        Self {
            status,
            printed,
            failed,
            results,
        }
    }
}
