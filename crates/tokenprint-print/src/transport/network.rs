// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP transport (JetDirect style, usually port 9100).
//
// Open a socket, dump ESC/POS bytes, shut the socket down.  Used for wired
// and Wi-Fi printers alike, and for Bluetooth printers that sit behind an IP
// bridge.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use tokenprint_core::config::ConnectionConfig;
use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{PrinterConfig, TransportType};

use super::{TransportDriver, TransportFactory, parse_host_port};

/// Write granularity; keeps a slow printer from stalling one huge write.
const CHUNK_SIZE: usize = 8192;

/// TCP socket to a printer.
pub struct NetworkTransport {
    target: String,
    host: String,
    port: u16,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl NetworkTransport {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        let host = host.into();
        Self {
            target: format!("{host}:{port}"),
            host,
            port,
            connect_timeout,
            stream: None,
        }
    }
}

#[async_trait]
impl TransportDriver for NetworkTransport {
    fn kind(&self) -> TransportType {
        TransportType::Network
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(TokenprintError::AlreadyOpen(self.target.clone()));
        }

        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| {
            TokenprintError::Timeout(format!(
                "connect to {} timed out after {}ms",
                self.target,
                self.connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| TokenprintError::from_io(&self.target, e))?;

        debug!(device = %self.target, "socket connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TokenprintError::NotOpen(self.target.clone()));
        };

        let mut sent = 0usize;
        for chunk in bytes.chunks(CHUNK_SIZE) {
            stream.write_all(chunk).await.map_err(|e| {
                TokenprintError::from_io(format!("{} (after {sent} bytes)", self.target), e)
            })?;
            sent += chunk.len();
        }
        stream
            .flush()
            .await
            .map_err(|e| TokenprintError::from_io(&self.target, e))?;

        info!(device = %self.target, bytes = sent, "data sent over TCP");
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(device = %self.target, error = %e, "socket shutdown failed");
            }
        }
    }
}

/// Builds `NetworkTransport`s from `host[:port]` connection strings.
pub struct NetworkFactory {
    default_port: u16,
    connect_timeout: Duration,
}

impl NetworkFactory {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            default_port: config.default_network_port,
            connect_timeout: config.connect_timeout(),
        }
    }
}

impl TransportFactory for NetworkFactory {
    fn name(&self) -> &'static str {
        "network"
    }

    fn build(&self, config: &PrinterConfig) -> Result<Box<dyn TransportDriver>> {
        let (host, port) = parse_host_port(&config.connection_string, self.default_port)
            .ok_or_else(|| {
                TokenprintError::Unsupported(format!(
                    "'{}' is not a host or host:port",
                    config.connection_string
                ))
            })?;
        Ok(Box::new(NetworkTransport::new(
            host,
            port,
            self.connect_timeout,
        )))
    }
}
