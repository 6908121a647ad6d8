// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// tokenprint Print: printer transports, ESC/POS receipt formatting,
// connection management, and multi-transport discovery.  This crate bridges
// the domain types in `tokenprint-core` and the devices on the counter.
//
// Features:
//
// - `ble` (off by default): native BLE printer scanning through `btleplug`.
//   It links the platform Bluetooth stack (BlueZ over D-Bus on Linux), so the
//   default build lists paired devices through the OS tools instead.  Build
//   and test the BLE path with `--features ble`.

pub mod connection;
pub mod discovery;
pub mod escpos;
pub mod executor;
pub mod store;
pub mod transport;

pub use connection::ConnectionManager;
pub use discovery::DiscoveryEngine;
pub use escpos::ReceiptFormatter;
pub use executor::PrintJobExecutor;
pub use store::{MemoryPrinterStore, PrinterStore, SqlitePrinterStore};
pub use transport::{TransportDriver, TransportFactory, TransportRegistry};
