//! Datagram transport
//!
//! [`DatagramSink`] is the seam between the pipeline and the network. The
//! production implementation, [`UdpSender`], fires each encoded datagram at a
//! single collector with no acknowledgement and no retry: sFlow is lossy
//! telemetry, a lost datagram shows up as a sequence gap at the collector.

use crate::sflow::AgentAddress;
use crate::{ReplayError, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

/// Largest UDP payload in an IPv4 datagram
pub const IPV4_MAX_UDP_PAYLOAD: usize = 65_507;
/// Largest UDP payload in an IPv6 datagram without jumbograms
pub const IPV6_MAX_UDP_PAYLOAD: usize = 65_527;

/// Destination for encoded sFlow datagrams
#[async_trait::async_trait]
pub trait DatagramSink: Send {
    /// Send one encoded datagram
    ///
    /// Either the whole payload leaves as one datagram or an error is returned.
    async fn send_datagram(&mut self, payload: &[u8]) -> Result<()>;

    /// Human-readable destination for logs and errors
    fn destination(&self) -> String;
}

/// UDP sender bound to one collector
pub struct UdpSender {
    socket: UdpSocket,
    destination: SocketAddr,
    source_address: IpAddr,
}

impl UdpSender {
    /// Resolve `host:port` and bind a socket of the matching address family
    pub async fn connect(target: &str) -> Result<Self> {
        let destination = resolve(target).await?;
        Self::bind(destination).await
    }

    pub async fn bind(destination: SocketAddr) -> Result<Self> {
        let bind_addr: SocketAddr = match destination {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| ReplayError::send_io(destination.to_string(), e))?;

        let source_address = route_source_address(destination).await;
        info!("Sending sFlow to {} from {}", destination, source_address);

        Ok(Self { socket, destination, source_address })
    }

    pub fn destination_addr(&self) -> SocketAddr {
        self.destination
    }

    /// Address the kernel would pick to reach the collector
    pub fn source_address(&self) -> IpAddr {
        self.source_address
    }

    /// Agent address to advertise when none is configured
    pub fn agent_address(&self) -> AgentAddress {
        AgentAddress::from(self.source_address)
    }

    /// Hard payload limit of the destination's address family
    pub fn max_payload(&self) -> usize {
        match self.destination {
            SocketAddr::V4(_) => IPV4_MAX_UDP_PAYLOAD,
            SocketAddr::V6(_) => IPV6_MAX_UDP_PAYLOAD,
        }
    }
}

#[async_trait::async_trait]
impl DatagramSink for UdpSender {
    async fn send_datagram(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload() {
            return Err(ReplayError::send_failed(
                self.destination.to_string(),
                format!(
                    "datagram of {} bytes exceeds the {} byte UDP payload limit",
                    payload.len(),
                    self.max_payload()
                ),
            ));
        }

        // Unconnected send: ICMP port-unreachable from an idle collector must
        // not turn into an error on the following send
        let sent = self
            .socket
            .send_to(payload, self.destination)
            .await
            .map_err(|e| ReplayError::send_io(self.destination.to_string(), e))?;

        if sent != payload.len() {
            return Err(ReplayError::send_failed(
                self.destination.to_string(),
                format!("short send: {} of {} bytes", sent, payload.len()),
            ));
        }

        trace!("Sent {} bytes to {}", sent, self.destination);
        Ok(())
    }

    fn destination(&self) -> String {
        self.destination.to_string()
    }
}

/// Resolve a `host:port` target to its first socket address
pub async fn resolve(target: &str) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host(target)
        .await
        .map_err(|e| ReplayError::Resolve { target: target.to_string(), source: Some(e) })?;

    let addr = addrs
        .next()
        .ok_or_else(|| ReplayError::Resolve { target: target.to_string(), source: None })?;
    debug!("Resolved {} to {}", target, addr);
    Ok(addr)
}

/// Connecting a throwaway UDP socket picks a route without sending anything
async fn route_source_address(destination: SocketAddr) -> IpAddr {
    let unspecified: IpAddr = match destination {
        SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };

    let probe = match UdpSocket::bind(SocketAddr::new(unspecified, 0)).await {
        Ok(socket) => socket,
        Err(_) => return unspecified,
    };
    if probe.connect(destination).await.is_err() {
        return unspecified;
    }
    probe.local_addr().map(|addr| addr.ip()).unwrap_or(unspecified)
}
