//! Handling of streams opened by remote peers.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use libp2p::PeerId;
use meshlite_net_peers::PeerRecord;
use meshlite_tasks::Shutdown;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_INBOUND_CONNECT_TIMEOUT;
use crate::error::ConnectError;
use crate::ports::{Connectedness, Host, RoutingTable};
use crate::session::{SessionKey, SessionSource, Sessions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    SessionStarted(SessionKey),
    /// The connect-back failed; the stream was dropped.
    Abandoned,
}

pub struct InboundStreamHandler<H, R> {
    host: Arc<H>,
    routing: Arc<R>,
    sessions: Sessions,
    connect_timeout: Duration,
}

impl<H: Host, R: RoutingTable> InboundStreamHandler<H, R> {
    pub fn new(host: Arc<H>, routing: Arc<R>, sessions: Sessions) -> Self {
        Self {
            host,
            routing,
            sessions,
            connect_timeout: DEFAULT_INBOUND_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Handle one inbound stream. Never fails: every error ends with a log line.
    pub async fn handle(&self, peer: PeerId, stream: H::Stream) -> InboundOutcome {
        debug!(%peer, "inbound stream");
        let record = PeerRecord::from_peer_id(peer);

        if self.host.connectedness(&peer).await == Connectedness::NotConnected {
            let connect = tokio::time::timeout(self.connect_timeout, self.host.connect(&record));
            let result = match connect.await {
                Ok(result) => result,
                Err(_) => Err(ConnectError::Timeout {
                    peer,
                    timeout: self.connect_timeout,
                }),
            };
            if let Err(e) = result {
                warn!(%peer, error = %e, "failed to connect back to inbound peer, dropping stream");
                return InboundOutcome::Abandoned;
            }
        }

        match self.routing.try_add_peer(&record, true, true).await {
            Ok(true) => debug!(%peer, "inbound peer added to routing table"),
            Ok(false) => debug!(%peer, "routing table rejected inbound peer"),
            Err(e) => warn!(%peer, error = %e, "failed to add inbound peer to routing table"),
        }

        let useful = self.routing.is_useful(&peer).await;
        let size = self.routing.size().await;
        info!(%peer, useful, routing_table_size = size, "accepted inbound stream");

        InboundOutcome::SessionStarted(self.sessions.start(peer, stream, SessionSource::Inbound))
    }

    /// Spawn a handler task per stream from `incoming` until shutdown.
    pub async fn serve(self: Arc<Self>, mut incoming: H::Incoming, mut shutdown: Shutdown) {
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!("inbound stream loop received shutdown signal");
                    break;
                }

                next = incoming.next() => {
                    let Some((peer, stream)) = next else {
                        debug!("inbound stream source closed");
                        break;
                    };
                    let handler = self.clone();
                    self.sessions.executor().spawn(async move {
                        handler.handle(peer, stream).await;
                    });
                }
            }
        }
    }
}
