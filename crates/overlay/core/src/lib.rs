//! Peer lifecycle orchestration for the meshlite overlay.
//!
//! Bridges routing-table membership into connections and duplex sessions:
//!
//! - [`BootstrapCoordinator`] joins the routing substrate and dials the seed peers
//!   with bounded retries.
//! - [`PeerLifecycleManager`] drains membership events from the event bus.
//! - [`InboundStreamHandler`] accepts streams opened by remote peers.
//! - [`Sessions`] runs the read and write halves of each stream and tracks them in
//!   a [`SessionRegistry`].
//! - [`RoutingTableWatcher`] logs the routing table periodically.
//!
//! The transport and the routing substrate sit behind the [`Host`] and
//! [`RoutingTable`] ports. [`OverlayNode`] wires everything together.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod inbound;
pub mod lifecycle;
pub mod node;
pub mod ports;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod watcher;

pub use bootstrap::{BootstrapCoordinator, BootstrapReport, SeedOutcome};
pub use config::{EventBusConfig, OverlayConfig, RemovedPeerPolicy, SessionConfig};
pub use error::{
    AcceptError, BootstrapJoinError, ConnectError, NodeError, RoutingRegistrationError,
    StreamIoError, StreamOpenError,
};
pub use inbound::{InboundOutcome, InboundStreamHandler};
pub use lifecycle::{EventOutcome, PeerLifecycleManager};
pub use node::{NodeHandle, OverlayNode, full_multiaddr};
pub use ports::{Connectedness, Host, RoutingTable, RoutingTableSnapshot};
pub use session::{
    SessionId, SessionInfo, SessionKey, SessionRegistry, SessionSource, SessionState, Sessions,
};
pub use watcher::RoutingTableWatcher;
