// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded TCP sweep of the local /24 networks.
//
// Only the first few host offsets of each subnet are probed, on the raw,
// LPD, and IPP ports.  A completed TCP handshake counts as a hit.  Probes
// run concurrently under a semaphore so the sweep never has more than
// `max_in_flight_probes` sockets connecting at once.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use tokenprint_core::config::DiscoveryConfig;
use tokenprint_core::error::{Result, TokenprintError};
use tokenprint_core::types::{DiscoveredPrinter, TransportType};

use super::Scanner;

/// Raw (JetDirect), LPD, IPP, in order of preference.
pub const NETWORK_PORTS: [u16; 3] = [9100, 515, 631];

/// The `/24` network (`a.b.c.0`) of every non-loopback IPv4 interface.
pub fn local_ipv4_bases() -> Result<Vec<Ipv4Addr>> {
    let interfaces = if_addrs::get_if_addrs()
        .map_err(|e| TokenprintError::Discovery(format!("list network interfaces: {e}")))?;

    let mut bases = Vec::new();
    for iface in interfaces {
        if iface.is_loopback() {
            continue;
        }
        if let IpAddr::V4(ip) = iface.ip() {
            let [a, b, c, _] = ip.octets();
            let base = Ipv4Addr::new(a, b, c, 0);
            if !bases.contains(&base) {
                debug!(interface = %iface.name, %base, "local IPv4 network");
                bases.push(base);
            }
        }
    }
    Ok(bases)
}

/// Host offsets `1..=limit` on each base network.
pub fn candidate_hosts(bases: &[Ipv4Addr], limit: u8) -> Vec<Ipv4Addr> {
    let limit = limit.min(254);
    bases
        .iter()
        .flat_map(|base| {
            let [a, b, c, _] = base.octets();
            (1..=limit).map(move |host| Ipv4Addr::new(a, b, c, host))
        })
        .collect()
}

/// Whether a TCP connection to `addr` completes within `timeout`.
pub async fn probe_tcp(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Probe every `host × port` pair and return the ones that answered, ordered
/// by host (input order) and then by port (input order).
pub async fn sweep(
    hosts: &[Ipv4Addr],
    ports: &[u16],
    timeout: Duration,
    max_in_flight: usize,
) -> Vec<SocketAddrV4> {
    let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut probes = JoinSet::new();

    for (host_rank, host) in hosts.iter().enumerate() {
        for (port_rank, port) in ports.iter().enumerate() {
            let permits = Arc::clone(&permits);
            let addr = SocketAddrV4::new(*host, *port);
            probes.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                probe_tcp(addr.into(), timeout)
                    .await
                    .then_some((host_rank, port_rank, addr))
            });
        }
    }

    let mut hits = Vec::new();
    while let Some(joined) = probes.join_next().await {
        if let Ok(Some(hit)) = joined {
            hits.push(hit);
        }
    }
    hits.sort_unstable_by_key(|&(host_rank, port_rank, _)| (host_rank, port_rank));
    hits.into_iter().map(|(_, _, addr)| addr).collect()
}

/// Keep only the first responding port of each host.
pub fn first_port_per_host(hits: Vec<SocketAddrV4>) -> Vec<SocketAddrV4> {
    let mut seen = HashSet::new();
    hits.into_iter().filter(|addr| seen.insert(*addr.ip())).collect()
}

/// Wired-network printer scanner.
pub struct NetworkScanner {
    config: DiscoveryConfig,
    ports: Vec<u16>,
}

impl NetworkScanner {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            ports: NETWORK_PORTS.to_vec(),
        }
    }

    /// Probe `hosts` on this scanner's ports, one candidate per host.
    pub async fn scan_hosts(&self, hosts: &[Ipv4Addr]) -> Vec<DiscoveredPrinter> {
        let hits = sweep(
            hosts,
            &self.ports,
            self.config.probe_timeout(),
            self.config.max_in_flight_probes,
        )
        .await;

        first_port_per_host(hits)
            .into_iter()
            .map(|addr| {
                DiscoveredPrinter::new(
                    TransportType::Network,
                    addr.to_string(),
                    format!("Network Printer ({})", addr.ip()),
                    format!("Network device responding on port {}", addr.port()),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Scanner for NetworkScanner {
    fn transport(&self) -> TransportType {
        TransportType::Network
    }

    async fn scan(&self) -> Result<Vec<DiscoveredPrinter>> {
        let bases = local_ipv4_bases()?;
        if bases.is_empty() {
            debug!("no non-loopback IPv4 interface; skipping network sweep");
            return Ok(Vec::new());
        }

        let hosts = candidate_hosts(&bases, self.config.network_host_limit);
        info!(
            networks = bases.len(),
            probes = hosts.len() * self.ports.len(),
            "scanning for network printers"
        );
        Ok(self.scan_hosts(&hosts).await)
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    const LOCALHOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

    /// A loopback port with nothing listening on it.
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn fast_config() -> DiscoveryConfig {
        DiscoveryConfig {
            probe_timeout_ms: 300,
            ..DiscoveryConfig::default()
        }
    }

    #[test]
    fn hosts_cover_requested_offsets() {
        let bases = [Ipv4Addr::new(192, 168, 1, 0), Ipv4Addr::new(10, 0, 0, 0)];
        let hosts = candidate_hosts(&bases, 20);
        assert_eq!(hosts.len(), 40);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hosts[19], Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(hosts[20], Ipv4Addr::new(10, 0, 0, 1));
    }

    #[tokio::test]
    async fn refusing_host_contributes_nothing() {
        let scanner = NetworkScanner {
            config: fast_config(),
            ports: vec![closed_port().await, closed_port().await, closed_port().await],
        };
        assert!(scanner.scan_hosts(&[LOCALHOST]).await.is_empty());
    }

    #[tokio::test]
    async fn one_candidate_per_host_with_preferred_port() {
        let preferred = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let secondary = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let p1 = preferred.local_addr().unwrap().port();
        let p2 = secondary.local_addr().unwrap().port();

        let scanner = NetworkScanner {
            config: fast_config(),
            ports: vec![closed_port().await, p1, p2],
        };
        let found = scanner.scan_hosts(&[LOCALHOST]).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].connection_string, format!("127.0.0.1:{p1}"));
        assert_eq!(
            found[0].id,
            DiscoveredPrinter::derive_id(TransportType::Network, &format!("127.0.0.1:{p1}"))
        );
        assert_eq!(found[0].name, "Network Printer (127.0.0.1)");
    }

    #[tokio::test]
    async fn sweep_respects_port_order_under_single_permit() {
        let a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let pa = a.local_addr().unwrap().port();
        let pb = b.local_addr().unwrap().port();

        let hits = sweep(&[LOCALHOST], &[pb, pa], Duration::from_millis(300), 1).await;
        assert_eq!(
            hits,
            vec![
                SocketAddrV4::new(LOCALHOST, pb),
                SocketAddrV4::new(LOCALHOST, pa)
            ]
        );
    }

    #[test]
    fn dedup_by_host() {
        let hits = vec![
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 9100),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 631),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 3), 515),
        ];
        let kept = first_port_per_host(hits);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].port(), 9100);
        assert_eq!(kept[1].port(), 515);
    }
}
