//! Boundaries to the transport and the routing substrate.
//!
//! Both are expected to be safe under concurrent use. Nothing in this crate adds
//! locking around them, and concurrent `connect` calls for the same peer must be
//! harmless.

use async_trait::async_trait;
use futures::Stream;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use meshlite_net_peers::PeerRecord;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::error::{
    AcceptError, BootstrapJoinError, ConnectError, RoutingRegistrationError, StreamOpenError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Connectedness {
    Connected,
    NotConnected,
}

/// Transport, security and multiplexing, as seen by the overlay.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Duplex byte stream scoped to one protocol.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;
    /// Inbound streams for a protocol, with the remote peer that opened them.
    type Incoming: Stream<Item = (PeerId, Self::Stream)> + Send + Unpin + 'static;

    fn local_peer_id(&self) -> PeerId;

    fn listen_addrs(&self) -> Vec<Multiaddr>;

    /// Ensure a connection to `peer`. Returns immediately when already connected.
    async fn connect(&self, peer: &PeerRecord) -> Result<(), ConnectError>;

    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: &StreamProtocol,
    ) -> Result<Self::Stream, StreamOpenError>;

    async fn connectedness(&self, peer: &PeerId) -> Connectedness;

    /// Register as the handler for inbound streams of `protocol`.
    fn accept(&self, protocol: StreamProtocol) -> Result<Self::Incoming, AcceptError>;
}

/// The routing substrate.
///
/// Membership callbacks are not part of this trait. Implementations receive an
/// [`EventSink`](meshlite_net_peers::EventSink) at construction and publish
/// [`PeerEvent`](meshlite_net_peers::PeerEvent)s into it.
#[async_trait]
pub trait RoutingTable: Send + Sync + 'static {
    /// Run the substrate's own join protocol.
    async fn bootstrap(&self) -> Result<(), BootstrapJoinError>;

    /// Returns `Ok(true)` when the peer was added, `Ok(false)` when rejected.
    async fn try_add_peer(
        &self,
        peer: &PeerRecord,
        trusted: bool,
        query: bool,
    ) -> Result<bool, RoutingRegistrationError>;

    async fn is_useful(&self, peer: &PeerId) -> bool;

    async fn size(&self) -> usize;

    async fn list_peers(&self) -> Vec<PeerId>;
}

/// Point-in-time view of the routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTableSnapshot {
    pub size: usize,
    pub peers: Vec<PeerId>,
}

impl RoutingTableSnapshot {
    pub async fn capture<R: RoutingTable + ?Sized>(routing: &R) -> Self {
        let size = routing.size().await;
        let peers = routing.list_peers().await;
        Self { size, peers }
    }

    pub fn log(&self) {
        info!(size = self.size, "routing table");
        for peer in &self.peers {
            info!(%peer, "routing table member");
        }
    }
}
