//! The task that owns the swarm.
//!
//! Every port call becomes a [`Command`] carrying a oneshot reply. The driver
//! interleaves commands with swarm events, so no lock is ever held across the
//! swarm.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::swarm::{DialError, SwarmEvent};
use libp2p::{Multiaddr, PeerId, StreamProtocol, Swarm, identify, kad};
use meshlite_net_peers::{EventSink, PeerEvent, PeerRecord};
use meshlite_overlay::{ConnectError, RoutingRegistrationError};
use meshlite_tasks::Shutdown;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::behaviour::{OverlayBehaviour, OverlayBehaviourEvent};

/// Source tag on membership events published by the driver.
pub const KAD_SOURCE: &str = "kad";

pub(crate) enum Command {
    Dial {
        peer: PeerId,
        addrs: Vec<Multiaddr>,
        reply: oneshot::Sender<Result<(), ConnectError>>,
    },
    IsConnected {
        peer: PeerId,
        reply: oneshot::Sender<bool>,
    },
    AddPeer {
        record: PeerRecord,
        trusted: bool,
        reply: oneshot::Sender<Result<bool, RoutingRegistrationError>>,
    },
    Bootstrap {
        reply: oneshot::Sender<()>,
    },
    IsUseful {
        peer: PeerId,
        reply: oneshot::Sender<bool>,
    },
    ListPeers {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
}

/// Shared by the host and routing ports.
#[derive(Clone)]
pub(crate) struct Handle {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) local_peer_id: PeerId,
    pub(crate) listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
}

impl Handle {
    /// Send a command and wait for its reply. `None` when the driver is gone.
    pub(crate) async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(command(reply)).await.ok()?;
        rx.await.ok()
    }
}

type DialWaiter = oneshot::Sender<Result<(), ConnectError>>;

pub(crate) struct SwarmDriver {
    swarm: Swarm<OverlayBehaviour>,
    commands: mpsc::Receiver<Command>,
    events: EventSink<PeerEvent>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
    listening: Option<oneshot::Sender<()>>,
    kad_protocol: StreamProtocol,
    /// Callers waiting on the outcome of a dial, keyed by peer. Concurrent dials
    /// for the same peer share one outcome.
    pending_dials: HashMap<PeerId, Vec<DialWaiter>>,
    /// Last address each peer was seen at, used for identifier-only records.
    observed: HashMap<PeerId, Multiaddr>,
}

impl SwarmDriver {
    pub(crate) fn new(
        swarm: Swarm<OverlayBehaviour>,
        commands: mpsc::Receiver<Command>,
        events: EventSink<PeerEvent>,
        listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
        listening: oneshot::Sender<()>,
        kad_protocol: StreamProtocol,
    ) -> Self {
        Self {
            swarm,
            commands,
            events,
            listen_addrs,
            listening: Some(listening),
            kad_protocol,
            pending_dials: HashMap::new(),
            observed: HashMap::new(),
        }
    }

    pub(crate) async fn run(mut self, mut shutdown: Shutdown) {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    debug!("swarm driver shutting down");
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("all port handles dropped");
                        break;
                    }
                },
                event = self.swarm.select_next_some() => self.on_swarm_event(event),
            }
        }

        for (_, waiters) in self.pending_dials.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(ConnectError::Closed));
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Dial { peer, addrs, reply } => self.dial(peer, addrs, reply),
            Command::IsConnected { peer, reply } => {
                let _ = reply.send(self.swarm.is_connected(&peer));
            }
            Command::AddPeer {
                record,
                trusted,
                reply,
            } => {
                let _ = reply.send(self.add_peer(record, trusted));
            }
            Command::Bootstrap { reply } => {
                self.bootstrap();
                let _ = reply.send(());
            }
            Command::IsUseful { peer, reply } => {
                let _ = reply.send(self.is_useful(&peer));
            }
            Command::ListPeers { reply } => {
                let _ = reply.send(self.routing_peers());
            }
        }
    }

    fn dial(&mut self, peer: PeerId, mut addrs: Vec<Multiaddr>, reply: DialWaiter) {
        if self.swarm.is_connected(&peer) {
            let _ = reply.send(Ok(()));
            return;
        }
        if addrs.is_empty() {
            addrs.extend(self.observed.get(&peer).cloned());
        }

        let opts = DialOpts::peer_id(peer)
            .addresses(addrs)
            .extend_addresses_through_behaviour()
            .condition(PeerCondition::DisconnectedAndNotDialing)
            .build();

        match self.swarm.dial(opts) {
            Ok(()) | Err(DialError::DialPeerConditionFalse(_)) => {
                self.pending_dials.entry(peer).or_default().push(reply);
            }
            Err(DialError::NoAddresses) => {
                let _ = reply.send(Err(ConnectError::NoAddress(peer)));
            }
            Err(error) => {
                let _ = reply.send(Err(ConnectError::Dial {
                    peer,
                    reason: error.to_string(),
                }));
            }
        }
    }

    fn resolve_dial(&mut self, peer: PeerId, outcome: Result<(), String>) {
        let Some(waiters) = self.pending_dials.remove(&peer) else {
            return;
        };
        for waiter in waiters {
            let result = match &outcome {
                Ok(()) => Ok(()),
                Err(reason) => Err(ConnectError::Dial {
                    peer,
                    reason: reason.clone(),
                }),
            };
            let _ = waiter.send(result);
        }
    }

    fn add_peer(
        &mut self,
        record: PeerRecord,
        trusted: bool,
    ) -> Result<bool, RoutingRegistrationError> {
        let peer = record.id();
        let mut addrs = record.addrs().to_vec();
        if addrs.is_empty() {
            addrs.extend(self.observed.get(&peer).cloned());
        }
        if addrs.is_empty() {
            return Err(RoutingRegistrationError::NoAddress(peer));
        }

        let was_empty = self.routing_size() == 0;
        let mut added = false;
        for addr in addrs {
            match self.swarm.behaviour_mut().kademlia.add_address(&peer, addr) {
                kad::RoutingUpdate::Success => added = true,
                kad::RoutingUpdate::Pending | kad::RoutingUpdate::Failed => {}
            }
        }

        // A join attempted with an empty table had nothing to query; retry it
        // through the first trusted peer.
        if added && trusted && was_empty {
            self.bootstrap();
        }
        Ok(added)
    }

    fn bootstrap(&mut self) {
        match self.swarm.behaviour_mut().kademlia.bootstrap() {
            Ok(query) => debug!(?query, "bootstrap query started"),
            Err(_) => debug!("no known peers, bootstrap deferred"),
        }
    }

    fn is_useful(&mut self, peer: &PeerId) -> bool {
        match self.swarm.behaviour_mut().kademlia.kbucket(*peer) {
            Some(bucket) => {
                bucket.num_entries() < kad::K_VALUE.get()
                    || bucket.iter().any(|entry| entry.node.key.preimage() == peer)
            }
            // The local key has no bucket.
            None => false,
        }
    }

    fn in_routing_table(&mut self, peer: &PeerId) -> bool {
        self.swarm
            .behaviour_mut()
            .kademlia
            .kbucket(*peer)
            .is_some_and(|bucket| bucket.iter().any(|entry| entry.node.key.preimage() == peer))
    }

    fn routing_size(&mut self) -> usize {
        self.swarm
            .behaviour_mut()
            .kademlia
            .kbuckets()
            .map(|bucket| bucket.num_entries())
            .sum()
    }

    fn routing_peers(&mut self) -> Vec<PeerId> {
        let mut peers = Vec::new();
        for bucket in self.swarm.behaviour_mut().kademlia.kbuckets() {
            for entry in bucket.iter() {
                peers.push(*entry.node.key.preimage());
            }
        }
        peers
    }

    fn on_swarm_event(&mut self, event: SwarmEvent<OverlayBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "listening");
                self.listen_addrs.write().push(address);
                if let Some(listening) = self.listening.take() {
                    let _ = listening.send(());
                }
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                debug!(%address, "listen address expired");
                self.listen_addrs.write().retain(|addr| addr != &address);
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                endpoint,
                num_established,
                ..
            } => {
                let address = endpoint.get_remote_address().clone();
                debug!(%peer_id, %address, num_established, "connection established");
                metrics::gauge!("overlay.libp2p.connections").increment(1.0);
                if endpoint.is_dialer() {
                    self.observed.insert(peer_id, address);
                } else {
                    self.observed.entry(peer_id).or_insert(address);
                }
                self.resolve_dial(peer_id, Ok(()));
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                cause,
                num_established,
                ..
            } => {
                debug!(%peer_id, ?cause, num_established, "connection closed");
                metrics::gauge!("overlay.libp2p.connections").decrement(1.0);
                if num_established == 0 && !self.in_routing_table(&peer_id) {
                    self.observed.remove(&peer_id);
                }
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                debug!(%peer_id, %error, "outgoing connection failed");
                self.resolve_dial(peer_id, Err(error.to_string()));
            }
            SwarmEvent::IncomingConnectionError {
                send_back_addr,
                error,
                ..
            } => {
                debug!(%send_back_addr, %error, "incoming connection failed");
            }
            SwarmEvent::Behaviour(OverlayBehaviourEvent::Kademlia(event)) => {
                self.on_kademlia_event(event)
            }
            SwarmEvent::Behaviour(OverlayBehaviourEvent::Identify(event)) => {
                self.on_identify_event(event)
            }
            _ => {}
        }
    }

    fn on_kademlia_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::RoutingUpdated {
                peer,
                is_new_peer,
                old_peer,
                ..
            } => {
                if is_new_peer {
                    info!(%peer, "peer added to routing table");
                    self.events.publish(PeerEvent::added(peer, KAD_SOURCE));
                }
                if let Some(old_peer) = old_peer {
                    info!(peer = %old_peer, "peer removed from routing table");
                    self.events.publish(PeerEvent::removed(old_peer, KAD_SOURCE));
                }
            }
            kad::Event::OutboundQueryProgressed {
                result: kad::QueryResult::Bootstrap(result),
                ..
            } => match result {
                Ok(ok) => debug!(
                    peer = %ok.peer,
                    remaining = ok.num_remaining,
                    "bootstrap progressed"
                ),
                Err(error) => warn!(%error, "bootstrap query failed"),
            },
            kad::Event::UnroutablePeer { peer } => trace!(%peer, "unroutable peer"),
            event => trace!(?event, "kademlia event"),
        }
    }

    fn on_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                debug!(
                    %peer_id,
                    agent = %info.agent_version,
                    addrs = info.listen_addrs.len(),
                    "identify received"
                );
                if let Some(addr) = info.listen_addrs.first() {
                    self.observed.insert(peer_id, addr.clone());
                }
                // Only peers speaking our Kademlia protocol belong in the table.
                if info.protocols.contains(&self.kad_protocol) {
                    for addr in info.listen_addrs {
                        let _ = self
                            .swarm
                            .behaviour_mut()
                            .kademlia
                            .add_address(&peer_id, addr);
                    }
                }
            }
            identify::Event::Error { peer_id, error, .. } => {
                debug!(%peer_id, %error, "identify failed");
            }
            _ => {}
        }
    }
}
