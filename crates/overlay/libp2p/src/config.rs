//! Swarm construction parameters.

use std::net::Ipv4Addr;
use std::time::Duration;

use libp2p::connection_limits::ConnectionLimits;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, StreamProtocol, kad};

/// Identify protocol version announced to remote peers.
pub const IDENTIFY_PROTOCOL: &str = "/meshlite/id/1.0.0";

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 128;
pub const DEFAULT_MAX_INCOMING_CONNECTIONS: u32 = 64;
pub const DEFAULT_MAX_CONNECTIONS_PER_PEER: u32 = 8;
pub const DEFAULT_MAX_PENDING_INCOMING: u32 = 64;

/// `/ip4/0.0.0.0/tcp/<port>`. Port 0 lets the OS pick.
pub fn tcp_listen_addr(port: u16) -> Multiaddr {
    Multiaddr::empty()
        .with(Protocol::Ip4(Ipv4Addr::UNSPECIFIED))
        .with(Protocol::Tcp(port))
}

/// Caps on concurrent connections. `None` leaves a count unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimitsConfig {
    pub max_established: Option<u32>,
    pub max_established_incoming: Option<u32>,
    pub max_established_per_peer: Option<u32>,
    /// Inbound connections still negotiating security and multiplexing.
    pub max_pending_incoming: Option<u32>,
}

impl ConnectionLimitsConfig {
    pub fn unlimited() -> Self {
        Self {
            max_established: None,
            max_established_incoming: None,
            max_established_per_peer: None,
            max_pending_incoming: None,
        }
    }

    pub(crate) fn to_limits(self) -> ConnectionLimits {
        ConnectionLimits::default()
            .with_max_established(self.max_established)
            .with_max_established_incoming(self.max_established_incoming)
            .with_max_established_per_peer(self.max_established_per_peer)
            .with_max_pending_incoming(self.max_pending_incoming)
    }
}

impl Default for ConnectionLimitsConfig {
    fn default() -> Self {
        Self {
            max_established: Some(DEFAULT_MAX_CONNECTIONS),
            max_established_incoming: Some(DEFAULT_MAX_INCOMING_CONNECTIONS),
            max_established_per_peer: Some(DEFAULT_MAX_CONNECTIONS_PER_PEER),
            max_pending_incoming: Some(DEFAULT_MAX_PENDING_INCOMING),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub listen_addrs: Vec<Multiaddr>,
    /// Force Kademlia server mode instead of deciding from confirmed external
    /// addresses. Set when the node has no seeds to join through.
    pub server_mode: bool,
    pub kad_protocol: StreamProtocol,
    /// Upper bound on a single `connect`, including waiting on a dial already
    /// in flight.
    pub dial_timeout: Duration,
    pub idle_connection_timeout: Duration,
    pub limits: ConnectionLimitsConfig,
    /// Capacity of the channel between the ports and the swarm driver.
    pub command_buffer: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addrs: vec![tcp_listen_addr(0)],
            server_mode: false,
            kad_protocol: kad::PROTOCOL_NAME,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            idle_connection_timeout: DEFAULT_IDLE_CONNECTION_TIMEOUT,
            limits: ConnectionLimitsConfig::default(),
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_formats_like_a_tcp_multiaddr() {
        assert_eq!(tcp_listen_addr(4001).to_string(), "/ip4/0.0.0.0/tcp/4001");
        assert_eq!(
            NetworkConfig::default().listen_addrs,
            vec!["/ip4/0.0.0.0/tcp/0".parse::<Multiaddr>().unwrap()]
        );
    }
}
