//! In-memory [`Host`] and [`RoutingTable`] for tests without a network.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use meshlite_net_peers::{EventSink, PeerEvent, PeerRecord};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf, duplex};

use crate::error::{
    AcceptError, BootstrapJoinError, ConnectError, RoutingRegistrationError, StreamOpenError,
};
use crate::ports::{Connectedness, Host, RoutingTable};

const STREAM_CAPACITY: usize = 64 * 1024;

/// Local end of an in-memory stream whose two directions close independently.
#[derive(Debug)]
pub struct MockStream {
    read: DuplexStream,
    write: DuplexStream,
}

/// Remote end of a [`MockStream`].
#[derive(Debug)]
pub struct RemoteEnd {
    /// Bytes written here are read by the local end. Dropping it is EOF for the local reader.
    pub tx: DuplexStream,
    /// Bytes the local end wrote. Dropping it makes local writes fail.
    pub rx: DuplexStream,
}

pub fn stream_pair(capacity: usize) -> (MockStream, RemoteEnd) {
    let (read, tx) = duplex(capacity);
    let (write, rx) = duplex(capacity);
    (MockStream { read, write }, RemoteEnd { tx, rx })
}

impl AsyncRead for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().read).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().write).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().write).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().write).poll_shutdown(cx)
    }
}

#[derive(Debug, Default)]
struct HostState {
    connected: HashSet<PeerId>,
    /// Remaining failures per peer. `usize::MAX` fails forever.
    connect_failures: HashMap<PeerId, usize>,
    connect_delays: HashMap<PeerId, Duration>,
    stream_failures: HashSet<PeerId>,
    connect_calls: Vec<PeerId>,
    open_calls: Vec<PeerId>,
    remotes: HashMap<PeerId, Vec<RemoteEnd>>,
    incoming: Option<mpsc::UnboundedReceiver<(PeerId, MockStream)>>,
}

/// Scriptable [`Host`] that records every connect and stream-open call.
#[derive(Debug)]
pub struct MockHost {
    local: PeerId,
    listen: Vec<Multiaddr>,
    incoming_tx: mpsc::UnboundedSender<(PeerId, MockStream)>,
    state: Mutex<HostState>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new(PeerId::random())
    }
}

impl MockHost {
    pub fn new(local: PeerId) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded();
        Self {
            local,
            listen: vec![
                Multiaddr::empty()
                    .with(Protocol::Ip4(Ipv4Addr::LOCALHOST))
                    .with(Protocol::Tcp(4001)),
            ],
            incoming_tx,
            state: Mutex::new(HostState {
                incoming: Some(incoming_rx),
                ..Default::default()
            }),
        }
    }

    pub fn fail_connect(&self, peer: PeerId, times: usize) {
        self.state.lock().connect_failures.insert(peer, times);
    }

    pub fn fail_connect_always(&self, peer: PeerId) {
        self.fail_connect(peer, usize::MAX);
    }

    pub fn delay_connect(&self, peer: PeerId, delay: Duration) {
        self.state.lock().connect_delays.insert(peer, delay);
    }

    pub fn fail_streams(&self, peer: PeerId) {
        self.state.lock().stream_failures.insert(peer);
    }

    pub fn mark_connected(&self, peer: PeerId) {
        self.state.lock().connected.insert(peer);
    }

    pub fn connect_calls(&self, peer: &PeerId) -> usize {
        self.state
            .lock()
            .connect_calls
            .iter()
            .filter(|p| *p == peer)
            .count()
    }

    pub fn total_connect_calls(&self) -> usize {
        self.state.lock().connect_calls.len()
    }

    pub fn open_calls(&self, peer: &PeerId) -> usize {
        self.state
            .lock()
            .open_calls
            .iter()
            .filter(|p| *p == peer)
            .count()
    }

    /// Remote end of the oldest outbound stream to `peer` not yet taken.
    pub fn take_remote(&self, peer: &PeerId) -> Option<RemoteEnd> {
        let mut state = self.state.lock();
        let remotes = state.remotes.get_mut(peer)?;
        if remotes.is_empty() {
            None
        } else {
            Some(remotes.remove(0))
        }
    }

    /// Simulate `peer` opening a stream to us. Returns the remote end.
    pub fn inject_inbound(&self, peer: PeerId) -> RemoteEnd {
        let (local, remote) = stream_pair(STREAM_CAPACITY);
        let _ = self.incoming_tx.unbounded_send((peer, local));
        remote
    }
}

#[async_trait]
impl Host for MockHost {
    type Stream = MockStream;
    type Incoming = mpsc::UnboundedReceiver<(PeerId, MockStream)>;

    fn local_peer_id(&self) -> PeerId {
        self.local
    }

    fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listen.clone()
    }

    async fn connect(&self, peer: &PeerRecord) -> Result<(), ConnectError> {
        let id = peer.id();
        let delay = {
            let mut state = self.state.lock();
            state.connect_calls.push(id);
            state.connect_delays.get(&id).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(remaining) = state.connect_failures.get_mut(&id) {
            if *remaining > 0 {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                return Err(ConnectError::Dial {
                    peer: id,
                    reason: "connection refused".to_string(),
                });
            }
        }
        state.connected.insert(id);
        Ok(())
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: &StreamProtocol,
    ) -> Result<MockStream, StreamOpenError> {
        let mut state = self.state.lock();
        state.open_calls.push(peer);
        if state.stream_failures.contains(&peer) {
            return Err(StreamOpenError::UnsupportedProtocol {
                peer,
                protocol: protocol.clone(),
            });
        }
        let (local, remote) = stream_pair(STREAM_CAPACITY);
        state.remotes.entry(peer).or_default().push(remote);
        Ok(local)
    }

    async fn connectedness(&self, peer: &PeerId) -> Connectedness {
        if self.state.lock().connected.contains(peer) {
            Connectedness::Connected
        } else {
            Connectedness::NotConnected
        }
    }

    fn accept(&self, protocol: StreamProtocol) -> Result<Self::Incoming, AcceptError> {
        self.state
            .lock()
            .incoming
            .take()
            .ok_or(AcceptError::AlreadyRegistered(protocol))
    }
}

#[derive(Debug, Default)]
struct RoutingState {
    members: Vec<PeerId>,
    registrations: Vec<(PeerId, bool, bool)>,
    rejected: HashSet<PeerId>,
    bootstrap_error: Option<String>,
    bootstraps: usize,
    listings: usize,
}

/// In-memory [`RoutingTable`] that publishes membership changes to an [`EventSink`].
#[derive(Debug, Default)]
pub struct MockRouting {
    sink: Option<EventSink<PeerEvent>>,
    state: Mutex<RoutingState>,
}

impl MockRouting {
    pub const SOURCE: &'static str = "mock";

    pub fn new(sink: EventSink<PeerEvent>) -> Self {
        Self {
            sink: Some(sink),
            state: Mutex::default(),
        }
    }

    pub fn fail_bootstrap(&self, reason: &str) {
        self.state.lock().bootstrap_error = Some(reason.to_string());
    }

    pub fn reject(&self, peer: PeerId) {
        self.state.lock().rejected.insert(peer);
    }

    /// Membership callback for a peer entering the table.
    pub fn add_member(&self, peer: PeerId) {
        let added = {
            let mut state = self.state.lock();
            if state.members.contains(&peer) {
                false
            } else {
                state.members.push(peer);
                true
            }
        };
        if added {
            self.publish(PeerEvent::added(peer, Self::SOURCE));
        }
    }

    /// Membership callback for a peer leaving the table.
    pub fn remove_member(&self, peer: PeerId) {
        self.state.lock().members.retain(|p| *p != peer);
        self.publish(PeerEvent::removed(peer, Self::SOURCE));
    }

    pub fn registrations(&self) -> Vec<(PeerId, bool, bool)> {
        self.state.lock().registrations.clone()
    }

    pub fn bootstraps(&self) -> usize {
        self.state.lock().bootstraps
    }

    /// Number of member listings served so far.
    pub fn listings(&self) -> usize {
        self.state.lock().listings
    }

    fn publish(&self, event: PeerEvent) {
        if let Some(sink) = &self.sink {
            sink.publish(event);
        }
    }
}

#[async_trait]
impl RoutingTable for MockRouting {
    async fn bootstrap(&self) -> Result<(), BootstrapJoinError> {
        let mut state = self.state.lock();
        state.bootstraps += 1;
        match &state.bootstrap_error {
            Some(reason) => Err(BootstrapJoinError::Query(reason.clone())),
            None => Ok(()),
        }
    }

    async fn try_add_peer(
        &self,
        peer: &PeerRecord,
        trusted: bool,
        query: bool,
    ) -> Result<bool, RoutingRegistrationError> {
        let id = peer.id();
        let rejected = {
            let mut state = self.state.lock();
            state.registrations.push((id, trusted, query));
            state.rejected.contains(&id)
        };
        if rejected {
            return Ok(false);
        }
        self.add_member(id);
        Ok(true)
    }

    async fn is_useful(&self, peer: &PeerId) -> bool {
        !self.state.lock().rejected.contains(peer)
    }

    async fn size(&self) -> usize {
        self.state.lock().members.len()
    }

    async fn list_peers(&self) -> Vec<PeerId> {
        let mut state = self.state.lock();
        state.listings += 1;
        state.members.clone()
    }
}

/// Shared handles for scenario tests.
pub fn mock_pair(sink: EventSink<PeerEvent>) -> (Arc<MockHost>, Arc<MockRouting>) {
    (Arc::new(MockHost::default()), Arc::new(MockRouting::new(sink)))
}
