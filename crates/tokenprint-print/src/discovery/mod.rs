// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer discovery across every transport.
//
// One scanner per transport runs as its own task.  The engine waits for all
// of them, keeps what each one found, and logs the ones that failed; a failed
// or panicking scanner contributes nothing and never stops the others.  The
// merged, de-duplicated result replaces the cached candidate list as a whole.

pub mod bluetooth;
pub mod network;
pub mod serial;
pub mod usb;
pub mod wifi;

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use tokenprint_core::config::DiscoveryConfig;
use tokenprint_core::error::Result;
use tokenprint_core::types::{DiscoveredPrinter, TransportType};

/// Finds printer candidates reachable over one transport.
#[async_trait]
pub trait Scanner: Send + Sync {
    fn transport(&self) -> TransportType;

    async fn scan(&self) -> Result<Vec<DiscoveredPrinter>>;
}

/// Transports scanned by `quick_discovery`: none of them sweep the network.
const QUICK_TRANSPORTS: [TransportType; 3] = [
    TransportType::Usb,
    TransportType::Serial,
    TransportType::Bluetooth,
];

/// Runs scanners and caches the last result set.
pub struct DiscoveryEngine {
    scanners: Vec<Arc<dyn Scanner>>,
    cache: RwLock<Arc<[DiscoveredPrinter]>>,
}

impl DiscoveryEngine {
    /// The stock scanner for every transport.
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self::with_scanners(vec![
            Arc::new(usb::UsbScanner),
            Arc::new(network::NetworkScanner::new(config.clone())),
            Arc::new(wifi::WifiScanner::new(config.clone())),
            Arc::new(bluetooth::BluetoothScanner::new(config.clone())),
            Arc::new(serial::SerialScanner),
        ])
    }

    /// An engine over an explicit scanner list.  Results keep list order.
    pub fn with_scanners(scanners: Vec<Arc<dyn Scanner>>) -> Self {
        Self {
            scanners,
            cache: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Run every scanner concurrently.
    #[instrument(skip(self))]
    pub async fn full_discovery(&self) -> Vec<DiscoveredPrinter> {
        let found = run_scanners(&self.scanners).await;
        info!(count = found.len(), "full discovery finished");
        self.replace_cache(&found);
        found
    }

    /// Run only the USB, serial, and Bluetooth scanners.
    #[instrument(skip(self))]
    pub async fn quick_discovery(&self) -> Vec<DiscoveredPrinter> {
        let quick: Vec<_> = self
            .scanners
            .iter()
            .filter(|s| QUICK_TRANSPORTS.contains(&s.transport()))
            .cloned()
            .collect();
        let found = run_scanners(&quick).await;
        info!(count = found.len(), "quick discovery finished");
        self.replace_cache(&found);
        found
    }

    /// The result of the most recent discovery, without scanning.
    pub fn cached_printers(&self) -> Vec<DiscoveredPrinter> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.to_vec()
    }

    fn replace_cache(&self, found: &[DiscoveredPrinter]) {
        let snapshot: Arc<[DiscoveredPrinter]> = Arc::from(found);
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

/// Spawn one task per scanner, await them in order, merge and de-duplicate.
async fn run_scanners(scanners: &[Arc<dyn Scanner>]) -> Vec<DiscoveredPrinter> {
    let tasks: Vec<_> = scanners
        .iter()
        .map(|scanner| {
            let scanner = Arc::clone(scanner);
            let transport = scanner.transport();
            (transport, tokio::spawn(async move { scanner.scan().await }))
        })
        .collect();

    let mut found = Vec::new();
    for (transport, task) in tasks {
        match task.await {
            Ok(Ok(printers)) => {
                debug!(%transport, count = printers.len(), "scanner finished");
                found.extend(printers);
            }
            Ok(Err(e)) => warn!(%transport, error = %e, "scanner failed"),
            Err(e) => warn!(%transport, error = %e, "scanner task aborted"),
        }
    }
    dedup_by_id(found)
}

/// Keep the first candidate for each id.
pub fn dedup_by_id(printers: Vec<DiscoveredPrinter>) -> Vec<DiscoveredPrinter> {
    let mut seen = HashSet::new();
    printers
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokenprint_core::error::TokenprintError;

    use super::*;

    struct Fixed {
        transport: TransportType,
        printers: Vec<DiscoveredPrinter>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(transport: TransportType, conns: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                transport,
                printers: conns
                    .iter()
                    .map(|c| DiscoveredPrinter::new(transport, *c, "P", "test"))
                    .collect(),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Scanner for Fixed {
        fn transport(&self) -> TransportType {
            self.transport
        }

        async fn scan(&self) -> Result<Vec<DiscoveredPrinter>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.printers.clone())
        }
    }

    struct Failing(TransportType);

    #[async_trait]
    impl Scanner for Failing {
        fn transport(&self) -> TransportType {
            self.0
        }

        async fn scan(&self) -> Result<Vec<DiscoveredPrinter>> {
            Err(TokenprintError::Discovery("adapter missing".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Scanner for Panicking {
        fn transport(&self) -> TransportType {
            TransportType::Wifi
        }

        async fn scan(&self) -> Result<Vec<DiscoveredPrinter>> {
            panic!("driver crashed");
        }
    }

    fn ids(printers: &[DiscoveredPrinter]) -> Vec<&str> {
        printers.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn failing_scanners_are_isolated() {
        let engine = DiscoveryEngine::with_scanners(vec![
            Fixed::new(TransportType::Usb, &["04b8:0202"]),
            Arc::new(Failing(TransportType::Network)),
            Arc::new(Panicking),
            Arc::new(Failing(TransportType::Bluetooth)),
            Fixed::new(TransportType::Serial, &["/dev/ttyUSB0"]),
        ]);

        let found = engine.full_discovery().await;
        assert_eq!(ids(&found), vec!["usb_04b8_0202_f9bcc95b", "serial__dev_ttyUSB0_c0ee77d8"]);
    }

    #[tokio::test]
    async fn results_keep_scanner_order_regardless_of_timing() {
        let slow = Arc::new(Fixed {
            delay: Duration::from_millis(50),
            ..Arc::into_inner(Fixed::new(TransportType::Usb, &["auto"])).unwrap()
        });
        let engine = DiscoveryEngine::with_scanners(vec![
            slow,
            Fixed::new(TransportType::Network, &["10.0.0.5:9100"]),
        ]);

        let found = engine.full_discovery().await;
        assert_eq!(ids(&found), vec!["usb_auto_929260ad", "network_10_0_0_5_9100_0c7d849a"]);
    }

    #[tokio::test]
    async fn repeated_discovery_is_stable_and_deduplicated() {
        let engine = DiscoveryEngine::with_scanners(vec![
            Fixed::new(TransportType::Network, &["10.0.0.5:9100", "10.0.0.5:9100"]),
            Fixed::new(TransportType::Wifi, &["10.0.0.5:9100"]),
        ]);

        let first = engine.full_discovery().await;
        let second = engine.full_discovery().await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn quick_discovery_skips_network_scanners() {
        let network = Fixed::new(TransportType::Network, &["10.0.0.5:9100"]);
        let wifi = Fixed::new(TransportType::Wifi, &["10.0.0.6:9100"]);
        let serial = Fixed::new(TransportType::Serial, &["COM3"]);
        let engine = DiscoveryEngine::with_scanners(vec![
            network.clone(),
            wifi.clone(),
            serial.clone(),
        ]);

        let found = engine.quick_discovery().await;
        assert_eq!(ids(&found), vec!["serial_COM3_6b8aaefd"]);
        assert_eq!(network.calls.load(Ordering::SeqCst), 0);
        assert_eq!(wifi.calls.load(Ordering::SeqCst), 0);
        assert_eq!(serial.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_holds_last_result_set() {
        let engine = DiscoveryEngine::with_scanners(vec![
            Fixed::new(TransportType::Network, &["10.0.0.5:9100"]),
            Fixed::new(TransportType::Serial, &["COM3"]),
        ]);
        assert!(engine.cached_printers().is_empty());

        engine.full_discovery().await;
        assert_eq!(engine.cached_printers().len(), 2);

        engine.quick_discovery().await;
        assert_eq!(ids(&engine.cached_printers()), vec!["serial_COM3_6b8aaefd"]);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let a = DiscoveredPrinter::new(TransportType::Usb, "auto", "first", "");
        let b = DiscoveredPrinter::new(TransportType::Usb, "auto", "second", "");
        let kept = dedup_by_id(vec![a, b]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "first");
    }
}
