//! Helpers for introspecting the local network configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// The well-known address dialed to discover the preferred outbound interface;
/// no traffic is actually sent to it
const PROBE_ADDR: &str = "8.8.8.8:80";

/// Returns the IPv4 address of the interface the host routes external traffic
/// through, falling back to loopback when no route is configured
///
/// Binds an ephemeral UDP socket and connects it; connect on UDP only selects
/// a route, nothing is sent
pub fn local_ipv4() -> Ipv4Addr {
    let fallback = Ipv4Addr::LOCALHOST;
    let Ok(socket) = UdpSocket::bind("0.0.0.0:0") else {
        return fallback;
    };
    if socket.connect(PROBE_ADDR).is_err() {
        return fallback;
    }

    match socket.local_addr() {
        Ok(SocketAddr::V4(addr)) => *addr.ip(),
        _ => fallback,
    }
}

/// Derives the /24 directed-broadcast address for the given host address
///
/// The fabric targets flat LAN segments, so a /24 mask is assumed when the
/// interface's true mask is unavailable
pub fn subnet_broadcast(addr: Ipv4Addr) -> Ipv4Addr {
    let octets = addr.octets();
    Ipv4Addr::new(octets[0], octets[1], octets[2], 255)
}

/// Whether the given address lies in one of the RFC 1918 private ranges
pub fn is_private(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(_) => false,
    }
}
