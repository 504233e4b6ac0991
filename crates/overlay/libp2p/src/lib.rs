//! libp2p implementation of the overlay's [`Host`](meshlite_overlay::Host) and
//! [`RoutingTable`](meshlite_overlay::RoutingTable) ports.
//!
//! TCP with TLS or noise security and yamux multiplexing. Kademlia over an
//! in-memory store provides the routing table, identify feeds it listen
//! addresses, and `libp2p-stream` carries the overlay protocol. A single driver
//! task owns the swarm; see [`Network::spawn`].

mod behaviour;
pub mod config;
mod driver;
mod host;
mod network;
mod routing;

pub use config::{ConnectionLimitsConfig, NetworkConfig, tcp_listen_addr};
pub use driver::KAD_SOURCE;
pub use host::Libp2pHost;
pub use network::Network;
pub use routing::Libp2pRouting;
