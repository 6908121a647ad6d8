// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory printer store, used when the database cannot be opened and in
// tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{PrinterConfig, PrinterId};

use super::{PrinterStore, sort_for_listing};

/// Printer configs held in a map.  Nothing survives a restart.
#[derive(Default)]
pub struct MemoryPrinterStore {
    printers: RwLock<HashMap<PrinterId, PrinterConfig>>,
}

impl MemoryPrinterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with `printers`, inserted in order.
    pub fn with_printers(printers: impl IntoIterator<Item = PrinterConfig>) -> Result<Self> {
        let store = Self::new();
        for printer in printers {
            store.insert(&printer)?;
        }
        Ok(store)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PrinterId, PrinterConfig>> {
        self.printers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PrinterId, PrinterConfig>> {
        self.printers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(id: &PrinterId) -> TokenprintError {
    TokenprintError::Database(format!("printer {id} not found"))
}

fn clear_default_except(printers: &mut HashMap<PrinterId, PrinterConfig>, keep: &PrinterId) {
    for (id, printer) in printers.iter_mut() {
        if id != keep {
            printer.is_default = false;
        }
    }
}

impl PrinterStore for MemoryPrinterStore {
    fn find_by_id(&self, id: &PrinterId) -> Result<Option<PrinterConfig>> {
        Ok(self.read().get(id).cloned())
    }

    fn find_default(&self) -> Result<Option<PrinterConfig>> {
        Ok(self.read().values().find(|p| p.is_default).cloned())
    }

    fn list(&self) -> Result<Vec<PrinterConfig>> {
        let mut printers: Vec<_> = self.read().values().cloned().collect();
        sort_for_listing(&mut printers);
        Ok(printers)
    }

    fn insert(&self, config: &PrinterConfig) -> Result<()> {
        let mut printers = self.write();
        if printers.contains_key(&config.id) {
            return Err(TokenprintError::Database(format!(
                "printer {} already exists",
                config.id
            )));
        }
        if config.is_default {
            clear_default_except(&mut printers, &config.id);
        }
        printers.insert(config.id, config.clone());
        Ok(())
    }

    fn update(&self, config: &PrinterConfig) -> Result<()> {
        let mut printers = self.write();
        if !printers.contains_key(&config.id) {
            return Err(not_found(&config.id));
        }
        if config.is_default {
            clear_default_except(&mut printers, &config.id);
        }
        printers.insert(config.id, config.clone());
        Ok(())
    }

    fn delete(&self, id: &PrinterId) -> Result<()> {
        self.write().remove(id);
        Ok(())
    }

    fn set_default(&self, id: &PrinterId) -> Result<()> {
        let mut printers = self.write();
        if !printers.contains_key(id) {
            return Err(not_found(id));
        }
        for (pid, printer) in printers.iter_mut() {
            printer.is_default = pid == id;
        }
        Ok(())
    }

    fn record_connectivity(
        &self,
        id: &PrinterId,
        connected: bool,
        last_used: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut printers = self.write();
        let printer = printers.get_mut(id).ok_or_else(|| not_found(id))?;
        printer.is_connected = connected;
        if let Some(when) = last_used {
            printer.last_used = Some(when);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokenprint_core::types::TransportType;

    use super::*;

    #[test]
    fn single_default_is_kept() {
        let a = PrinterConfig::new("A", TransportType::Usb, "auto").as_default();
        let b = PrinterConfig::new("B", TransportType::Wifi, "10.0.0.8:9100").as_default();
        let store = MemoryPrinterStore::with_printers([a.clone(), b.clone()]).unwrap();

        assert_eq!(store.find_default().unwrap().unwrap().id, b.id);
        assert!(!store.find_by_id(&a.id).unwrap().unwrap().is_default);

        store.set_default(&a.id).unwrap();
        let list = store.list().unwrap();
        assert_eq!(list[0].id, a.id);
        assert_eq!(list.iter().filter(|p| p.is_default).count(), 1);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let a = PrinterConfig::new("A", TransportType::Usb, "auto");
        let store = MemoryPrinterStore::with_printers([a.clone()]).unwrap();
        assert!(store.insert(&a).is_err());
    }

    #[test]
    fn connectivity_on_unknown_printer_fails() {
        let store = MemoryPrinterStore::new();
        assert!(store.record_connectivity(&PrinterId::new(), true, None).is_err());
    }
}
