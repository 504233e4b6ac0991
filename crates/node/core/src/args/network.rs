use std::time::Duration;

use clap::Args;
use libp2p::Multiaddr;

/// Parameters for configuring the network
#[derive(Debug, Clone, Args, PartialEq, Eq)]
#[command(next_help_heading = "Networking")]
pub struct NetworkArgs {
    /// Seed peers to bootstrap from, separated by ',' or ';'.
    ///
    /// /ip4/123.123.123.123/tcp/4001/p2p/PeerID,/ip4/...
    #[arg(value_name = "PEERS", env = "peerList", default_value = "")]
    pub peers: String,

    /// TCP port to listen on. 0 picks a free port.
    #[arg(value_name = "PORT", env = "portNbr", default_value_t = 0)]
    pub port: u16,

    /// Comma separated multiaddrs to listen on, replacing `/ip4/0.0.0.0/tcp/<PORT>`.
    #[arg(long = "listen-addr", value_name = "MULTIADDR", value_delimiter = ',')]
    pub listen_addrs: Vec<Multiaddr>,

    /// Hex of a protobuf-encoded libp2p private key. A secp256k1 key is
    /// generated when unset.
    #[arg(
        long = "private-key",
        env = "PRIVATE_KEY",
        value_name = "HEX",
        hide_env_values = true
    )]
    pub private_key: Option<String>,

    /// Upper bound on a single dial.
    #[arg(
        long = "dial-timeout",
        value_name = "DURATION",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub dial_timeout: Duration,

    /// Close connections that carry no stream for this long.
    #[arg(
        long = "idle-connection-timeout",
        value_name = "DURATION",
        default_value = "60s",
        value_parser = humantime::parse_duration
    )]
    pub idle_connection_timeout: Duration,

    /// Maximum established connections in total.
    #[arg(long = "max-connections", value_name = "COUNT", default_value_t = 128)]
    pub max_connections: u32,

    /// Maximum established inbound connections.
    #[arg(long = "max-incoming-connections", value_name = "COUNT", default_value_t = 64)]
    pub max_incoming_connections: u32,

    /// Maximum established connections to a single peer.
    #[arg(long = "max-connections-per-peer", value_name = "COUNT", default_value_t = 8)]
    pub max_connections_per_peer: u32,

    /// Maximum inbound connections still in their handshake.
    #[arg(long = "max-pending-incoming", value_name = "COUNT", default_value_t = 64)]
    pub max_pending_incoming: u32,
}
