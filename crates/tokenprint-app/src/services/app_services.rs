// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: constructs the store, discovery engine, connection
// manager, and print executor exactly once and hands out methods the CLI
// commands call.
//
// The printer store is SQLite in the data directory.  When that database
// cannot be opened the services fall back to an in-memory store so discovery
// and test prints still work for the lifetime of the process.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokenprint_core::AppConfig;
use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{
    BatchSummary, ConnectionState, DiscoveredPrinter, PrintResult, PrinterConfig, PrinterId,
    TokenJob, TransportType,
};
use tokenprint_print::{
    ConnectionManager, DiscoveryEngine, MemoryPrinterStore, PrintJobExecutor, PrinterStore,
    ReceiptFormatter, SqlitePrinterStore, TransportRegistry,
};
use tracing::{info, warn};

use super::data_dir;

const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "printers.db";

/// Shared application services.
///
/// All fields are Arc-wrapped so the struct is cheap to clone into tasks.
#[derive(Clone)]
pub struct AppServices {
    store: Arc<dyn PrinterStore>,
    discovery: Arc<DiscoveryEngine>,
    connection: Arc<ConnectionManager>,
    executor: Arc<PrintJobExecutor>,
    data_dir: PathBuf,
    config: Arc<AppConfig>,
}

impl AppServices {
    /// Initialise all services.  Call once at startup.
    ///
    /// Creates the data directory, loads (or writes) the config file, and
    /// opens the printer database.
    pub fn init() -> Result<Self> {
        let dir = data_dir::data_dir();
        info!(path = %dir.display(), "initialising app services");

        let config = load_or_create_config(&dir);
        let store = SqlitePrinterStore::open(dir.join(DATABASE_FILE))?;
        Ok(Self::build(Arc::new(store), config, dir))
    }

    /// Services over an in-memory store, for when the database is unusable.
    pub fn fallback() -> Self {
        let dir = data_dir::data_dir();
        let config = load_config(&dir).unwrap_or_default();
        Self::build(Arc::new(MemoryPrinterStore::new()), config, dir)
    }

    fn build(store: Arc<dyn PrinterStore>, config: AppConfig, data_dir: PathBuf) -> Self {
        let registry = TransportRegistry::with_defaults(&config.connection);
        let connection = Arc::new(ConnectionManager::new(
            Arc::clone(&store),
            registry,
            ReceiptFormatter::new(config.receipt.clone()),
        ));
        let executor = Arc::new(PrintJobExecutor::new(
            Arc::clone(&connection),
            ReceiptFormatter::new(config.receipt.clone()),
        ));
        let discovery = Arc::new(DiscoveryEngine::new(&config.discovery));

        Self {
            store,
            discovery,
            connection,
            executor,
            data_dir,
            config: Arc::new(config),
        }
    }

    // -- Discovery -----------------------------------------------------------

    /// Scan for printers.  `quick` skips the network and Wi-Fi sweeps.
    pub async fn discover(&self, quick: bool) -> Vec<DiscoveredPrinter> {
        if quick {
            self.discovery.quick_discovery().await
        } else {
            self.discovery.full_discovery().await
        }
    }

    // -- Printer configuration -----------------------------------------------

    pub fn printers(&self) -> Result<Vec<PrinterConfig>> {
        self.store.list()
    }

    /// Save a new printer configuration.
    pub fn add_printer(
        &self,
        name: &str,
        transport_type: TransportType,
        connection_string: &str,
        make_default: bool,
    ) -> Result<PrinterConfig> {
        let mut printer = PrinterConfig::new(name, transport_type, connection_string);
        // The first printer becomes the default so printing works right away.
        printer.is_default = make_default || self.store.find_default()?.is_none();
        self.store.insert(&printer)?;
        info!(printer_id = %printer.id, name = %printer.name, "printer added");
        Ok(printer)
    }

    /// Save a discovery candidate as a printer.  Runs a full discovery first
    /// when the candidate is not in the cache.
    pub async fn add_discovered(
        &self,
        candidate_id: &str,
        name: Option<&str>,
        make_default: bool,
    ) -> Result<PrinterConfig> {
        let mut candidates = self.discovery.cached_printers();
        if !candidates.iter().any(|c| c.id == candidate_id) {
            candidates = self.discovery.full_discovery().await;
        }
        let candidate = candidates
            .into_iter()
            .find(|c| c.id == candidate_id)
            .ok_or_else(|| {
                TokenprintError::DeviceNotFound(format!("no discovered printer '{candidate_id}'"))
            })?;

        self.add_printer(
            name.unwrap_or(&candidate.name),
            candidate.transport_type,
            &candidate.connection_string,
            make_default,
        )
    }

    pub fn remove_printer(&self, id: &PrinterId) -> Result<()> {
        self.store.delete(id)?;
        info!(printer_id = %id, "printer removed");
        Ok(())
    }

    pub fn set_default_printer(&self, id: &PrinterId) -> Result<()> {
        self.store.set_default(id)
    }

    // -- Connection ----------------------------------------------------------

    /// Print the test page on `printer`, or on the default printer.
    pub async fn test_printer(&self, printer: Option<PrinterId>) -> Result<PrinterConfig> {
        let resolved = self.connection.initialize(printer).await?;
        self.connection.test_connection().await?;
        Ok(resolved)
    }

    pub async fn printer_status(&self, id: PrinterId) -> ConnectionState {
        self.connection.probe_status(id).await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    // -- Printing ------------------------------------------------------------

    pub async fn print_tokens(&self, tokens: &[u32]) -> BatchSummary {
        let jobs: Vec<TokenJob> = tokens.iter().map(|&t| TokenJob::now(t)).collect();
        self.executor.print_many(&jobs).await
    }

    pub async fn reprint_token(&self, token: u32) -> PrintResult {
        self.executor.reprint(&TokenJob::now(token)).await
    }

    // -- Config Persistence --------------------------------------------------

    /// The config the services were built from.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Path to the data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

// -- Config file persistence -------------------------------------------------

fn load_config(data_dir: &Path) -> Option<AppConfig> {
    let path = data_dir.join(CONFIG_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
            None
        }
    }
}

/// Load the config, writing the defaults out on first run so operators have
/// a file to edit.
fn load_or_create_config(data_dir: &Path) -> AppConfig {
    if let Some(config) = load_config(data_dir) {
        return config;
    }
    let config = AppConfig::default();
    if !data_dir.join(CONFIG_FILE).exists() {
        if let Err(e) = persist_config(data_dir, &config) {
            warn!(error = %e, "failed to write default config");
        }
    }
    config
}

fn persist_config(data_dir: &Path, config: &AppConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_services(dir: &Path) -> AppServices {
        AppServices::build(
            Arc::new(MemoryPrinterStore::new()),
            AppConfig::default(),
            dir.to_path_buf(),
        )
    }

    #[test]
    fn first_run_writes_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_create_config(dir.path());
        assert_eq!(config, AppConfig::default());
        assert_eq!(load_config(dir.path()), Some(AppConfig::default()));
    }

    #[test]
    fn corrupt_config_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        assert_eq!(load_or_create_config(dir.path()), AppConfig::default());
        assert_eq!(
            std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap(),
            "{not json"
        );
    }

    #[test]
    fn first_printer_becomes_default() {
        let dir = tempfile::tempdir().unwrap();
        let svc = memory_services(dir.path());

        let a = svc
            .add_printer("Front", TransportType::Network, "10.0.0.5:9100", false)
            .unwrap();
        let b = svc
            .add_printer("Back", TransportType::Serial, "/dev/ttyUSB0", false)
            .unwrap();
        assert!(a.is_default);
        assert!(!b.is_default);

        svc.set_default_printer(&b.id).unwrap();
        let printers = svc.printers().unwrap();
        assert_eq!(printers[0].id, b.id);
        assert_eq!(printers.iter().filter(|p| p.is_default).count(), 1);

        svc.remove_printer(&a.id).unwrap();
        assert_eq!(svc.printers().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn printing_without_printers_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let svc = memory_services(dir.path());

        let summary = svc.print_tokens(&[1, 2]).await;
        assert_eq!(summary.failed, 2);
        assert!(!svc.reprint_token(3).await.success);
    }
}
