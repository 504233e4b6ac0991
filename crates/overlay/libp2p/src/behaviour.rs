use libp2p::identity::Keypair;
use libp2p::kad::store::MemoryStore;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{connection_limits, identify, kad};

use crate::config::{IDENTIFY_PROTOCOL, NetworkConfig};

/// Composite behaviour driven by the swarm.
#[derive(NetworkBehaviour)]
pub(crate) struct OverlayBehaviour {
    pub(crate) limits: connection_limits::Behaviour,
    pub(crate) kademlia: kad::Behaviour<MemoryStore>,
    pub(crate) identify: identify::Behaviour,
    pub(crate) stream: libp2p_stream::Behaviour,
}

impl OverlayBehaviour {
    pub(crate) fn new(keypair: &Keypair, config: &NetworkConfig) -> Self {
        let local_peer_id = keypair.public().to_peer_id();

        let mut kademlia = kad::Behaviour::with_config(
            local_peer_id,
            MemoryStore::new(local_peer_id),
            kad::Config::new(config.kad_protocol.clone()),
        );
        if config.server_mode {
            kademlia.set_mode(Some(kad::Mode::Server));
        }

        let identify = identify::Behaviour::new(
            identify::Config::new(IDENTIFY_PROTOCOL.to_string(), keypair.public())
                .with_agent_version(format!("meshlite/{}", env!("CARGO_PKG_VERSION"))),
        );

        Self {
            limits: connection_limits::Behaviour::new(config.limits.to_limits()),
            kademlia,
            identify,
            stream: libp2p_stream::Behaviour::new(),
        }
    }
}
