use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use libp2p_stream::{Control, OpenStreamError};
use meshlite_net_peers::PeerRecord;
use meshlite_overlay::{AcceptError, ConnectError, Connectedness, Host, StreamOpenError};
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};

use crate::driver::{Command, Handle};

/// [`Host`] backed by the swarm driver and `libp2p-stream`.
#[derive(Clone)]
pub struct Libp2pHost {
    handle: Handle,
    control: Control,
    dial_timeout: Duration,
}

impl Libp2pHost {
    pub(crate) fn new(handle: Handle, control: Control, dial_timeout: Duration) -> Self {
        Self {
            handle,
            control,
            dial_timeout,
        }
    }
}

impl std::fmt::Debug for Libp2pHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Libp2pHost")
            .field("local_peer_id", &self.handle.local_peer_id)
            .field("dial_timeout", &self.dial_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Host for Libp2pHost {
    type Stream = Compat<libp2p::Stream>;
    type Incoming = BoxStream<'static, (PeerId, Self::Stream)>;

    fn local_peer_id(&self) -> PeerId {
        self.handle.local_peer_id
    }

    fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.handle.listen_addrs.read().clone()
    }

    async fn connect(&self, peer: &PeerRecord) -> Result<(), ConnectError> {
        let id = peer.id();
        let addrs = peer.addrs().to_vec();
        let request = self.handle.request(|reply| Command::Dial {
            peer: id,
            addrs,
            reply,
        });

        match tokio::time::timeout(self.dial_timeout, request).await {
            Ok(Some(result)) => result,
            Ok(None) => Err(ConnectError::Closed),
            Err(_) => Err(ConnectError::Timeout {
                peer: id,
                timeout: self.dial_timeout,
            }),
        }
    }

    async fn open_stream(
        &self,
        peer: PeerId,
        protocol: &StreamProtocol,
    ) -> Result<Self::Stream, StreamOpenError> {
        let mut control = self.control.clone();
        let stream = control
            .open_stream(peer, protocol.clone())
            .await
            .map_err(|error| match error {
                OpenStreamError::UnsupportedProtocol(protocol) => {
                    StreamOpenError::UnsupportedProtocol { peer, protocol }
                }
                other => StreamOpenError::Open {
                    peer,
                    protocol: protocol.clone(),
                    reason: other.to_string(),
                },
            })?;
        Ok(stream.compat())
    }

    async fn connectedness(&self, peer: &PeerId) -> Connectedness {
        let peer = *peer;
        match self
            .handle
            .request(|reply| Command::IsConnected { peer, reply })
            .await
        {
            Some(true) => Connectedness::Connected,
            Some(false) | None => Connectedness::NotConnected,
        }
    }

    fn accept(&self, protocol: StreamProtocol) -> Result<Self::Incoming, AcceptError> {
        let incoming = self
            .control
            .clone()
            .accept(protocol.clone())
            .map_err(|_| AcceptError::AlreadyRegistered(protocol))?;
        Ok(incoming
            .map(|(peer, stream)| (peer, stream.compat()))
            .boxed())
    }
}
