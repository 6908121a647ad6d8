// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer configuration storage.
//
// The connection manager only needs to look configs up and record whether a
// link came up; everything else here serves the CLI's printer management.
// Both implementations keep at most one printer flagged as default.

mod memory;
mod sqlite;

pub use memory::MemoryPrinterStore;
pub use sqlite::SqlitePrinterStore;

use chrono::{DateTime, Utc};

use tokenprint_core::error::Result;
use tokenprint_core::types::{PrinterConfig, PrinterId};

/// Persistence for `PrinterConfig`s.
///
/// Calls are synchronous and may block on disk; the connection manager runs
/// them on the blocking pool.
pub trait PrinterStore: Send + Sync {
    fn find_by_id(&self, id: &PrinterId) -> Result<Option<PrinterConfig>>;

    /// The printer flagged `is_default`, if any.
    fn find_default(&self) -> Result<Option<PrinterConfig>>;

    /// Every stored printer, default first, then newest first.
    fn list(&self) -> Result<Vec<PrinterConfig>>;

    /// Store a new printer.  Inserting one flagged default clears the flag on
    /// every other printer.
    fn insert(&self, config: &PrinterConfig) -> Result<()>;

    /// Replace a stored printer.  Fails if it does not exist.
    fn update(&self, config: &PrinterConfig) -> Result<()>;

    /// Remove a printer.  Removing an unknown id is not an error.
    fn delete(&self, id: &PrinterId) -> Result<()>;

    /// Make `id` the only default printer.
    fn set_default(&self, id: &PrinterId) -> Result<()>;

    /// Record the outcome of a connection attempt.  `last_used` is left
    /// untouched when `None`.
    fn record_connectivity(
        &self,
        id: &PrinterId,
        connected: bool,
        last_used: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// Sort order shared by both stores for `list`.
pub(crate) fn sort_for_listing(printers: &mut [PrinterConfig]) {
    printers.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then(b.created_at.cmp(&a.created_at))
    });
}
