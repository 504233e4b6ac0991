//! Assembly of the node configuration from parsed arguments.

use libp2p::StreamProtocol;
use meshlite_net_peers::{AddressBook, RetryPolicy};
use meshlite_overlay::{EventBusConfig, OverlayConfig, SessionConfig};
use meshlite_overlay_libp2p::{ConnectionLimitsConfig, NetworkConfig, tcp_listen_addr};

use crate::args::{NetworkArgs, OverlayArgs};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid protocol {0:?}: must start with '/'")]
    Protocol(String),
    #[error("--bootstrap.max-attempts must be at least 1")]
    NoAttempts,
}

/// Everything the binary needs to start a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Seed peers. Entries that failed to parse are kept and skipped at bootstrap.
    pub seeds: AddressBook,
    pub overlay: OverlayConfig,
    pub network: NetworkConfig,
}

impl NodeConfig {
    pub fn from_args(network: &NetworkArgs, overlay: &OverlayArgs) -> Result<Self, ConfigError> {
        let protocol = StreamProtocol::try_from_owned(overlay.protocol.clone())
            .map_err(|_| ConfigError::Protocol(overlay.protocol.clone()))?;
        if overlay.bootstrap_max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }

        let seeds = AddressBook::parse(&network.peers);

        let listen_addrs = if network.listen_addrs.is_empty() {
            vec![tcp_listen_addr(network.port)]
        } else {
            network.listen_addrs.clone()
        };

        let overlay = OverlayConfig {
            protocol,
            bootstrap: RetryPolicy::new(
                overlay.bootstrap_max_attempts,
                overlay.bootstrap_retry_delay,
            ),
            inbound_connect_timeout: overlay.inbound_connect_timeout,
            session: SessionConfig {
                write_interval: overlay.session_write_interval,
            },
            watch_interval: overlay.routing_watch_interval,
            removed_policy: overlay.routing_peer_removed,
            events: EventBusConfig {
                capacity: overlay.events_capacity,
                overflow: overlay.events_overflow,
            },
        };

        // Without seeds there is nobody to join through, so answer queries
        // right away.
        let network = NetworkConfig {
            listen_addrs,
            server_mode: seeds.is_empty(),
            dial_timeout: network.dial_timeout,
            idle_connection_timeout: network.idle_connection_timeout,
            limits: ConnectionLimitsConfig {
                max_established: Some(network.max_connections),
                max_established_incoming: Some(network.max_incoming_connections),
                max_established_per_peer: Some(network.max_connections_per_peer),
                max_pending_incoming: Some(network.max_pending_incoming),
            },
            ..Default::default()
        };

        Ok(Self {
            seeds,
            overlay,
            network,
        })
    }
}
