use async_trait::async_trait;
use libp2p::PeerId;
use meshlite_net_peers::PeerRecord;
use meshlite_overlay::{BootstrapJoinError, RoutingRegistrationError, RoutingTable};

use crate::driver::{Command, Handle};

/// [`RoutingTable`] backed by the Kademlia behaviour in the swarm driver.
///
/// The `query` flag of [`RoutingTable::try_add_peer`] has no Kademlia
/// counterpart and is ignored. A trusted registration into an empty table
/// starts a bootstrap query.
#[derive(Clone)]
pub struct Libp2pRouting {
    handle: Handle,
}

impl Libp2pRouting {
    pub(crate) fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl std::fmt::Debug for Libp2pRouting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Libp2pRouting").finish_non_exhaustive()
    }
}

#[async_trait]
impl RoutingTable for Libp2pRouting {
    /// Starts a bootstrap query. With no known peers yet this is a no-op that
    /// succeeds.
    async fn bootstrap(&self) -> Result<(), BootstrapJoinError> {
        self.handle
            .request(|reply| Command::Bootstrap { reply })
            .await
            .ok_or(BootstrapJoinError::Closed)
    }

    async fn try_add_peer(
        &self,
        peer: &PeerRecord,
        trusted: bool,
        _query: bool,
    ) -> Result<bool, RoutingRegistrationError> {
        let record = peer.clone();
        self.handle
            .request(|reply| Command::AddPeer {
                record,
                trusted,
                reply,
            })
            .await
            .unwrap_or(Err(RoutingRegistrationError::Closed))
    }

    async fn is_useful(&self, peer: &PeerId) -> bool {
        let peer = *peer;
        self.handle
            .request(|reply| Command::IsUseful { peer, reply })
            .await
            .unwrap_or(false)
    }

    async fn size(&self) -> usize {
        self.list_peers().await.len()
    }

    async fn list_peers(&self) -> Vec<PeerId> {
        self.handle
            .request(|reply| Command::ListPeers { reply })
            .await
            .unwrap_or_default()
    }
}
