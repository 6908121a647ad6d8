// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connection management.
//
// The manager owns at most one session: a resolved printer config plus the
// driver built for it.  `initialize` closes whatever session exists before
// resolving the next one, and every connect/print operation runs under the
// same lock, so two device handles are never open at once.
//
// Connectivity is written back to the printer store after every initialize
// attempt.  Those writes are best effort: a store failure is logged and the
// connection outcome stands.  Store lookups and driver construction block
// (SQLite, USB enumeration), so they run on the blocking pool.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{ConnectionState, PrinterConfig, PrinterId};

use crate::escpos::{self, ReceiptFormatter};
use crate::store::PrinterStore;
use crate::transport::{self, TransportDriver, TransportRegistry};

/// A printer config bound to the driver that serves it.
struct Session {
    printer: PrinterConfig,
    driver: Box<dyn TransportDriver>,
}

struct Inner {
    state: ConnectionState,
    session: Option<Session>,
}

/// Resolves printer configs to drivers and runs I/O against the current one.
pub struct ConnectionManager {
    store: Arc<dyn PrinterStore>,
    registry: Arc<TransportRegistry>,
    formatter: ReceiptFormatter,
    inner: Mutex<Inner>,
}

/// Run a blocking store or driver call off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TokenprintError::Transport(format!("blocking task failed: {e}")))?
}

impl ConnectionManager {
    pub fn new(
        store: Arc<dyn PrinterStore>,
        registry: TransportRegistry,
        formatter: ReceiptFormatter,
    ) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            formatter,
            inner: Mutex::new(Inner {
                state: ConnectionState::Uninitialized,
                session: None,
            }),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// The printer the current session is bound to.
    pub async fn current_printer(&self) -> Option<PrinterConfig> {
        self.inner
            .lock()
            .await
            .session
            .as_ref()
            .map(|s| s.printer.clone())
    }

    /// Bind a session to `printer_id`, or to the default printer when `None`.
    ///
    /// Any existing session is closed first.  Does not touch the device: a
    /// `Connected` session means a driver exists for the printer, and the
    /// device itself is only opened for the duration of each write.
    #[instrument(skip(self))]
    pub async fn initialize(&self, printer_id: Option<PrinterId>) -> Result<PrinterConfig> {
        let mut inner = self.inner.lock().await;
        self.initialize_locked(&mut inner, printer_id).await
    }

    /// Print the diagnostic test page on the current printer, initializing the
    /// default printer first if no session is connected.
    #[instrument(skip(self))]
    pub async fn test_connection(&self) -> Result<()> {
        let page = escpos::encode(&self.formatter.test_page(Local::now().naive_local()));
        self.transmit(&page).await?;
        info!("printer test page sent");
        Ok(())
    }

    /// Open the current printer, write `bytes`, and close it again.
    ///
    /// Initializes the default printer when no session is connected.  On an
    /// I/O failure the session is dropped and the state becomes
    /// `Disconnected`.
    pub async fn transmit(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != ConnectionState::Connected || inner.session.is_none() {
            debug!("no connected session; initializing default printer");
            self.initialize_locked(&mut inner, None).await?;
        }

        let Some(session) = inner.session.as_mut() else {
            return Err(TokenprintError::NoPrinterConfigured);
        };

        match transport::transmit(session.driver.as_mut(), bytes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    printer = %session.printer.name,
                    device = session.driver.target(),
                    error = %e,
                    "printer I/O failed; dropping session"
                );
                let printer_id = session.printer.id;
                inner.session = None;
                inner.state = ConnectionState::Disconnected;
                self.record_status(printer_id, false, None).await;
                Err(e)
            }
        }
    }

    /// Close the current session, if any.  Never fails.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(mut session) = inner.session.take() {
            session.driver.close().await;
            info!(printer = %session.printer.name, "printer disconnected");
        }
        inner.state = ConnectionState::Disconnected;
    }

    /// Try to bring up `printer_id` and report the resulting state.
    ///
    /// The attempt replaces the current session, as any `initialize` does.
    pub async fn probe_status(&self, printer_id: PrinterId) -> ConnectionState {
        match self.initialize(Some(printer_id)).await {
            Ok(_) => ConnectionState::Connected,
            Err(e) => {
                debug!(printer_id = %printer_id, error = %e, "status probe failed");
                ConnectionState::Disconnected
            }
        }
    }

    async fn initialize_locked(
        &self,
        inner: &mut Inner,
        printer_id: Option<PrinterId>,
    ) -> Result<PrinterConfig> {
        if let Some(mut previous) = inner.session.take() {
            previous.driver.close().await;
            debug!(printer = %previous.printer.name, "closed previous session");
        }
        inner.state = ConnectionState::Connecting;

        let store = Arc::clone(&self.store);
        let lookup = blocking(move || match printer_id {
            Some(id) => store.find_by_id(&id),
            None => store.find_default(),
        })
        .await;
        let mut printer = match lookup {
            Ok(Some(printer)) => printer,
            Ok(None) => {
                inner.state = ConnectionState::Disconnected;
                return Err(TokenprintError::NoPrinterConfigured);
            }
            Err(e) => {
                inner.state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        let registry = Arc::clone(&self.registry);
        let config = printer.clone();
        match blocking(move || registry.resolve(&config)).await {
            Ok(driver) => {
                let now = Utc::now();
                printer.is_connected = true;
                printer.last_used = Some(now);
                self.record_status(printer.id, true, Some(now)).await;

                info!(
                    printer = %printer.name,
                    transport = %printer.transport_type,
                    device = driver.target(),
                    "printer initialized"
                );
                inner.session = Some(Session {
                    printer: printer.clone(),
                    driver,
                });
                inner.state = ConnectionState::Connected;
                Ok(printer)
            }
            Err(e) => {
                warn!(printer = %printer.name, error = %e, "printer initialization failed");
                self.record_status(printer.id, false, None).await;
                inner.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Persist connectivity; failures are logged, never returned.
    async fn record_status(
        &self,
        printer_id: PrinterId,
        connected: bool,
        last_used: Option<DateTime<Utc>>,
    ) {
        let store = Arc::clone(&self.store);
        let outcome =
            blocking(move || store.record_connectivity(&printer_id, connected, last_used)).await;
        if let Err(e) = outcome {
            error!(printer_id = %printer_id, error = %e, "failed to record printer status");
        }
    }
}
