//! Consumer of routing-table membership events.

use std::sync::Arc;

use libp2p::StreamProtocol;
use meshlite_net_peers::{EventReceiver, PeerAction, PeerEvent};
use meshlite_tasks::Shutdown;
use tracing::{debug, info, warn};

use crate::config::RemovedPeerPolicy;
use crate::ports::Host;
use crate::session::{SessionKey, SessionSource, Sessions};

/// What handling one event amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    SessionStarted(SessionKey),
    ConnectFailed,
    StreamFailed,
    /// Sessions closed for a removed peer.
    TornDown(usize),
    Ignored,
}

/// Turns each membership event into at most one connect, one stream open and
/// one session. Failures are logged and never re-queued.
pub struct PeerLifecycleManager<H> {
    host: Arc<H>,
    sessions: Sessions,
    protocol: StreamProtocol,
    removed_policy: RemovedPeerPolicy,
}

impl<H: Host> PeerLifecycleManager<H> {
    pub fn new(host: Arc<H>, sessions: Sessions, protocol: StreamProtocol) -> Self {
        Self {
            host,
            sessions,
            protocol,
            removed_policy: RemovedPeerPolicy::default(),
        }
    }

    pub fn with_removed_policy(mut self, policy: RemovedPeerPolicy) -> Self {
        self.removed_policy = policy;
        self
    }

    /// Drain `events` in order until shutdown or until every producer is gone.
    ///
    /// Sessions already started are left running on exit.
    pub async fn run(self, mut events: EventReceiver<PeerEvent>, mut shutdown: Shutdown) {
        debug!(policy = %self.removed_policy, "peer lifecycle manager started");
        let mut handled = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!(handled, "peer lifecycle manager received shutdown signal");
                    break;
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        debug!(handled, "peer event bus closed");
                        break;
                    };
                    handled += 1;
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => {
                            debug!(handled, "peer lifecycle manager received shutdown signal");
                            break;
                        }
                        _ = self.handle_event(event) => {}
                    }
                }
            }
        }

        if events.dropped() > 0 {
            warn!(dropped = events.dropped(), "peer events were dropped on overflow");
        }
    }

    pub async fn handle_event(&self, event: PeerEvent) -> EventOutcome {
        let peer = event.peer_id();
        debug!(%peer, action = %event.action, source = event.source, "peer event");

        match (event.action, self.removed_policy) {
            (PeerAction::Added, _) | (PeerAction::Removed, RemovedPeerPolicy::Reconnect) => {
                self.connect_and_open(&event).await
            }
            (PeerAction::Removed, RemovedPeerPolicy::Teardown) => {
                let closed = self.sessions.registry().close_peer(&peer);
                info!(%peer, closed, "peer left routing table, sessions closed");
                EventOutcome::TornDown(closed)
            }
            (PeerAction::Removed, RemovedPeerPolicy::Ignore) => {
                debug!(%peer, "peer left routing table");
                EventOutcome::Ignored
            }
        }
    }

    async fn connect_and_open(&self, event: &PeerEvent) -> EventOutcome {
        let peer = event.peer_id();
        if peer == self.host.local_peer_id() {
            return EventOutcome::Ignored;
        }

        if let Err(e) = self.host.connect(&event.record).await {
            warn!(%peer, error = %e, "failed to connect to discovered peer");
            return EventOutcome::ConnectFailed;
        }

        let stream = match self.host.open_stream(peer, &self.protocol).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%peer, error = %e, "failed to open stream to discovered peer");
                return EventOutcome::StreamFailed;
            }
        };

        info!(%peer, source = event.source, "connected to discovered peer");
        EventOutcome::SessionStarted(self.sessions.start(peer, stream, SessionSource::Discovery))
    }
}
