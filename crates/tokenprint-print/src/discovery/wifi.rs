// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wi-Fi printer discovery.
//
// We browse mDNS for the IPP, LPD, and raw-socket printer service types for a
// fixed window.  When the mDNS daemon cannot start on this host we fall back
// to a short TCP sweep over a wider port set, and keep only the hosts that
// accept an ESC/POS initialize without the socket erroring.  That identify
// step is a weak signal: any listener that swallows two bytes passes it.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use tokenprint_core::config::DiscoveryConfig;
use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{DiscoveredPrinter, TransportType};

use super::Scanner;
use super::network::{candidate_hosts, local_ipv4_bases, sweep};
use crate::escpos::ESC;

/// mDNS service types printers advertise.
pub const MDNS_SERVICES: [&str; 3] = [
    "_ipp._tcp.local.",
    "_printer._tcp.local.",
    "_pdl-datastream._tcp.local.",
];

/// Ports swept when mDNS is unavailable, in order of preference.
pub const WIFI_PORTS: [u16; 5] = [9100, 515, 631, 8080, 80];

/// How long the identify probe waits for the peer to reset the connection.
const IDENTIFY_SETTLE: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Wi-Fi printer scanner.
pub struct WifiScanner {
    config: DiscoveryConfig,
}

impl WifiScanner {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Sweep `hosts` on the Wi-Fi ports and keep the ones that pass the
    /// identify probe.
    pub async fn sweep_hosts(&self, hosts: &[Ipv4Addr], ports: &[u16]) -> Vec<DiscoveredPrinter> {
        let hits = sweep(
            hosts,
            ports,
            self.config.wifi_probe_timeout(),
            self.config.max_in_flight_probes,
        )
        .await;

        let timeout = self.config.identify_timeout();
        let mut probes = JoinSet::new();
        for (rank, addr) in hits.into_iter().enumerate() {
            probes.spawn(async move {
                identify_printer(addr.into(), timeout)
                    .await
                    .then_some((rank, addr))
            });
        }

        let mut printers = Vec::new();
        while let Some(joined) = probes.join_next().await {
            if let Ok(Some(hit)) = joined {
                printers.push(hit);
            }
        }
        printers.sort_unstable_by_key(|&(rank, _)| rank);
        printers
            .into_iter()
            .map(|(_, addr)| sweep_candidate(addr))
            .collect()
    }

    async fn sweep_fallback(&self) -> Result<Vec<DiscoveredPrinter>> {
        let bases = local_ipv4_bases()?;
        if bases.is_empty() {
            debug!("no non-loopback IPv4 interface; skipping Wi-Fi sweep");
            return Ok(Vec::new());
        }
        let hosts = candidate_hosts(&bases, self.config.wifi_host_limit);
        info!(
            networks = bases.len(),
            probes = hosts.len() * WIFI_PORTS.len(),
            "scanning for Wi-Fi printers by port sweep"
        );
        Ok(self.sweep_hosts(&hosts, &WIFI_PORTS).await)
    }
}

#[async_trait]
impl Scanner for WifiScanner {
    fn transport(&self) -> TransportType {
        TransportType::Wifi
    }

    async fn scan(&self) -> Result<Vec<DiscoveredPrinter>> {
        let daemon = match ServiceDaemon::new() {
            Ok(daemon) => daemon,
            Err(e) => {
                info!(error = %e, "mDNS unavailable; falling back to port sweep");
                return self.sweep_fallback().await;
            }
        };

        let window = self.config.mdns_window();
        tokio::task::spawn_blocking(move || browse(daemon, window))
            .await
            .map_err(|e| TokenprintError::Discovery(format!("mDNS browse task: {e}")))?
    }
}

/// Browse every printer service type for `window`, then stop and shut the
/// daemon down.  Resolved services are de-duplicated by id.
fn browse(daemon: ServiceDaemon, window: Duration) -> Result<Vec<DiscoveredPrinter>> {
    let mut receivers = Vec::with_capacity(MDNS_SERVICES.len());
    for service in MDNS_SERVICES {
        match daemon.browse(service) {
            Ok(receiver) => receivers.push(receiver),
            Err(e) => warn!(service_type = service, error = %e, "mDNS browse failed"),
        }
    }

    let mut found: HashMap<String, DiscoveredPrinter> = HashMap::new();
    let deadline = Instant::now() + window;
    while Instant::now() < deadline {
        for receiver in &receivers {
            while let Ok(event) = receiver.try_recv() {
                match event {
                    ServiceEvent::SearchStarted(stype) => {
                        debug!(service_type = %stype, "mDNS search started");
                    }
                    ServiceEvent::ServiceFound(stype, fullname) => {
                        debug!(service_type = %stype, name = %fullname, "service found");
                    }
                    ServiceEvent::ServiceResolved(info) => match mdns_candidate(&info) {
                        Some(printer) => {
                            info!(
                                name = %printer.name,
                                address = %printer.connection_string,
                                "Wi-Fi printer resolved"
                            );
                            found.entry(printer.id.clone()).or_insert(printer);
                        }
                        None => {
                            debug!(name = %info.get_fullname(), "resolved service has no address");
                        }
                    },
                    _ => {}
                }
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    for service in MDNS_SERVICES {
        if let Err(e) = daemon.stop_browse(service) {
            debug!(service_type = service, error = %e, "stop browse failed");
        }
    }
    if let Err(e) = daemon.shutdown() {
        debug!(error = %e, "mDNS daemon shutdown failed");
    }

    let mut printers: Vec<_> = found.into_values().collect();
    printers.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(printers)
}

/// Candidate for a resolved mDNS service, preferring an IPv4 address.
fn mdns_candidate(info: &ServiceInfo) -> Option<DiscoveredPrinter> {
    let addresses = info.get_addresses();
    let ip: IpAddr = addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.iter().next())
        .copied()?;

    let service_type = info.get_type();
    let instance = instance_name(info.get_fullname(), service_type);
    let address = SocketAddr::new(ip, info.get_port());

    Some(DiscoveredPrinter::new(
        TransportType::Wifi,
        address.to_string(),
        format!("WiFi Printer ({instance})"),
        format!("WiFi: {instance} - {service_type}"),
    ))
}

/// The instance label of an mDNS full name (`Front Desk._ipp._tcp.local.`).
pub fn instance_name<'a>(fullname: &'a str, service_type: &str) -> &'a str {
    fullname
        .strip_suffix(service_type)
        .map(|rest| rest.trim_end_matches('.'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(fullname)
}

fn sweep_candidate(addr: SocketAddrV4) -> DiscoveredPrinter {
    DiscoveredPrinter::new(
        TransportType::Wifi,
        addr.to_string(),
        format!("WiFi Printer ({})", addr.ip()),
        format!("WiFi network printer on port {}", addr.port()),
    )
}

/// Connect, send ESC @, and treat the host as a printer unless the socket
/// errors before the settle window ends.
pub async fn identify_printer(addr: SocketAddr, timeout: Duration) -> bool {
    let mut stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        _ => return false,
    };

    let written = tokio::time::timeout(timeout, stream.write_all(&[ESC, b'@'])).await;
    if !matches!(written, Ok(Ok(()))) {
        return false;
    }

    let mut buf = [0u8; 64];
    match tokio::time::timeout(IDENTIFY_SETTLE, stream.read(&mut buf)).await {
        Ok(Err(e)) => {
            debug!(%addr, error = %e, "identify probe rejected");
            false
        }
        // Silence, a reply, or an orderly close all count.
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn fast_config() -> DiscoveryConfig {
        DiscoveryConfig {
            wifi_probe_timeout_ms: 300,
            identify_timeout_ms: 300,
            ..DiscoveryConfig::default()
        }
    }

    #[tokio::test]
    async fn identify_accepts_a_silent_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2];
            socket.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, [ESC, b'@']);
            tokio::time::sleep(Duration::from_millis(700)).await;
        });

        assert!(identify_printer(addr, Duration::from_millis(500)).await);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn identify_rejects_a_closed_port() {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, closed_port().await));
        assert!(!identify_printer(addr, Duration::from_millis(300)).await);
    }

    #[tokio::test]
    async fn sweep_keeps_identified_hosts_once_per_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _held = socket;
                    tokio::time::sleep(Duration::from_secs(2)).await;
                });
            }
        });

        let scanner = WifiScanner::new(fast_config());
        let found = scanner
            .sweep_hosts(&[Ipv4Addr::LOCALHOST], &[closed_port().await, port])
            .await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].transport_type, TransportType::Wifi);
        assert_eq!(found[0].connection_string, format!("127.0.0.1:{port}"));
        assert_eq!(found[0].name, "WiFi Printer (127.0.0.1)");
        assert_eq!(
            found[0].description,
            format!("WiFi network printer on port {port}")
        );
    }

    #[test]
    fn instance_name_strips_service_type() {
        assert_eq!(
            instance_name("Front Desk._ipp._tcp.local.", "_ipp._tcp.local."),
            "Front Desk"
        );
        assert_eq!(
            instance_name("odd-name", "_ipp._tcp.local."),
            "odd-name"
        );
    }
}
