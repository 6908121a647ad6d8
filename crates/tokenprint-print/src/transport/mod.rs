// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer transports.
//
// A transport is anything that can be opened, written to, and closed.  Which
// concrete driver serves a `PrinterConfig` is decided by the
// `TransportRegistry`: each `TransportType` maps to an ordered list of
// factories, and the first factory that accepts the config wins.  Bluetooth
// uses this to prefer a native RFCOMM link and fall back to a network bridge.

pub mod bluetooth;
pub mod network;
pub mod serial;
pub mod usb;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use tokenprint_core::config::ConnectionConfig;
use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{PrinterConfig, TransportType};

/// Byte sink for one physical printer link.
///
/// Drivers start closed.  `open` on an open driver fails with `AlreadyOpen`,
/// `write` on a closed one fails with `NotOpen`, and `close` is idempotent.
#[async_trait]
pub trait TransportDriver: Send {
    /// Link that actually carries the bytes.  A Bluetooth printer reached
    /// through an IP bridge reports `Network`.
    fn kind(&self) -> TransportType;

    /// Device path or address, for logs and error detail.
    fn target(&self) -> &str;

    fn is_open(&self) -> bool;

    async fn open(&mut self) -> Result<()>;

    async fn write(&mut self, bytes: &[u8]) -> Result<()>;

    async fn close(&mut self);
}

/// Open the driver, write `bytes`, and close it again.
///
/// The driver is closed on every path, including a failed write.
pub async fn transmit(driver: &mut dyn TransportDriver, bytes: &[u8]) -> Result<()> {
    driver.open().await?;
    let written = driver.write(bytes).await;
    driver.close().await;
    if written.is_ok() {
        debug!(device = driver.target(), bytes = bytes.len(), "transmitted");
    }
    written
}

/// Builds a driver for a printer config.
///
/// Factories never touch the device.  A factory that cannot serve the config
/// on this host returns `Unsupported`, which lets the registry try the next
/// one.
pub trait TransportFactory: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn build(&self, config: &PrinterConfig) -> Result<Box<dyn TransportDriver>>;
}

/// Ordered factory lists keyed by transport type.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: HashMap<TransportType, Vec<Arc<dyn TransportFactory>>>,
}

impl TransportRegistry {
    /// A registry with no factories at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The stock drivers for every transport type.
    pub fn with_defaults(config: &ConnectionConfig) -> Self {
        let mut registry = Self::empty();

        let network: Arc<dyn TransportFactory> =
            Arc::new(network::NetworkFactory::new(config));
        registry.register_shared(TransportType::Network, Arc::clone(&network));
        registry.register_shared(TransportType::Wifi, network);

        registry.register(TransportType::Serial, serial::SerialFactory::new(config));
        registry.register(TransportType::Usb, usb::UsbFactory);

        registry.register(
            TransportType::Bluetooth,
            bluetooth::RfcommFactory::new(config),
        );
        registry.register(
            TransportType::Bluetooth,
            bluetooth::NetworkBridgeFactory::new(config),
        );

        registry
    }

    /// Append a factory to the end of a transport's list.
    pub fn register(&mut self, transport: TransportType, factory: impl TransportFactory + 'static) {
        self.register_shared(transport, Arc::new(factory));
    }

    pub fn register_shared(&mut self, transport: TransportType, factory: Arc<dyn TransportFactory>) {
        self.factories.entry(transport).or_default().push(factory);
    }

    /// Names of the factories registered for a transport, in priority order.
    pub fn factory_names(&self, transport: TransportType) -> Vec<&'static str> {
        self.factories
            .get(&transport)
            .map(|list| list.iter().map(|f| f.name()).collect())
            .unwrap_or_default()
    }

    /// Build a driver for `config` from the first factory that accepts it.
    pub fn resolve(&self, config: &PrinterConfig) -> Result<Box<dyn TransportDriver>> {
        let candidates = self
            .factories
            .get(&config.transport_type)
            .filter(|list| !list.is_empty())
            .ok_or_else(|| {
                TokenprintError::Unsupported(format!(
                    "no driver registered for {} printers",
                    config.transport_type
                ))
            })?;

        let mut last_unsupported = None;
        for (rank, factory) in candidates.iter().enumerate() {
            match factory.build(config) {
                Ok(driver) => {
                    if rank > 0 {
                        info!(
                            printer = %config.name,
                            driver = factory.name(),
                            "using fallback transport"
                        );
                    }
                    return Ok(driver);
                }
                Err(TokenprintError::Unsupported(reason)) => {
                    warn!(
                        printer = %config.name,
                        driver = factory.name(),
                        reason = %reason,
                        "transport unavailable"
                    );
                    last_unsupported = Some(reason);
                }
                Err(other) => return Err(other),
            }
        }

        Err(TokenprintError::Unsupported(last_unsupported.unwrap_or_else(
            || format!("no driver accepted {}", config.connection_string),
        )))
    }
}

/// Split `host:port`, falling back to `default_port` when no port is given.
///
/// IPv6 literals must be bracketed (`[fe80::1]:9100`).
pub fn parse_host_port(target: &str, default_port: u16) -> Option<(String, u16)> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    match split_host_port(target) {
        Some(pair) => Some(pair),
        None if !target.contains(':') => Some((target.to_string(), default_port)),
        None if target.starts_with('[') && target.ends_with(']') => {
            Some((target[1..target.len() - 1].to_string(), default_port))
        }
        None => None,
    }
}

/// Split a strict `host:port` pair.  Returns `None` unless both are present.
pub fn split_host_port(target: &str) -> Option<(String, u16)> {
    let (host, port) = target.trim().rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let host = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        Some(v6) => v6,
        None if host.contains(':') => return None,
        None => host,
    };
    if host.is_empty() || port == 0 {
        return None;
    }
    Some((host.to_string(), port))
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory driver that records every call, for connection and
    //! executor tests.

    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default)]
    pub struct Recording {
        pub opens: usize,
        pub closes: usize,
        pub writes: Vec<Vec<u8>>,
    }

    /// How the recorded driver should misbehave.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum Fault {
        #[default]
        None,
        OpenRefused,
        WriteFails,
    }

    pub struct RecordingDriver {
        target: String,
        open: bool,
        fault: Fault,
        log: Arc<Mutex<Recording>>,
    }

    #[async_trait]
    impl TransportDriver for RecordingDriver {
        fn kind(&self) -> TransportType {
            TransportType::Network
        }

        fn target(&self) -> &str {
            &self.target
        }

        fn is_open(&self) -> bool {
            self.open
        }

        async fn open(&mut self) -> Result<()> {
            if self.open {
                return Err(TokenprintError::AlreadyOpen(self.target.clone()));
            }
            if self.fault == Fault::OpenRefused {
                return Err(TokenprintError::ConnectionRefused(self.target.clone()));
            }
            self.open = true;
            self.log.lock().unwrap().opens += 1;
            Ok(())
        }

        async fn write(&mut self, bytes: &[u8]) -> Result<()> {
            if !self.open {
                return Err(TokenprintError::NotOpen(self.target.clone()));
            }
            if self.fault == Fault::WriteFails {
                return Err(TokenprintError::Transport(format!(
                    "{}: paper jam",
                    self.target
                )));
            }
            self.log.lock().unwrap().writes.push(bytes.to_vec());
            Ok(())
        }

        async fn close(&mut self) {
            if self.open {
                self.open = false;
                self.log.lock().unwrap().closes += 1;
            }
        }
    }

    /// Factory handing out `RecordingDriver`s that share one log.
    #[derive(Clone, Default)]
    pub struct RecordingFactory {
        pub log: Arc<Mutex<Recording>>,
        pub fault: Arc<Mutex<Fault>>,
    }

    impl RecordingFactory {
        pub fn set_fault(&self, fault: Fault) {
            *self.fault.lock().unwrap() = fault;
        }

        pub fn registry(&self) -> TransportRegistry {
            let mut registry = TransportRegistry::empty();
            for transport in TransportType::ALL {
                registry.register(transport, self.clone());
            }
            registry
        }
    }

    impl TransportFactory for RecordingFactory {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn build(&self, config: &PrinterConfig) -> Result<Box<dyn TransportDriver>> {
            Ok(Box::new(RecordingDriver {
                target: config.connection_string.clone(),
                open: false,
                fault: *self.fault.lock().unwrap(),
                log: Arc::clone(&self.log),
            }))
        }
    }
}
