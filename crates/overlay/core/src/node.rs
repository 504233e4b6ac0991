//! Overlay start sequence.

use std::sync::Arc;

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use meshlite_net_peers::{AddressBook, EventReceiver, PeerEvent};
use meshlite_tasks::TaskExecutor;
use tokio::sync::oneshot;
use tracing::info;

use crate::bootstrap::{BootstrapCoordinator, BootstrapReport};
use crate::config::OverlayConfig;
use crate::error::NodeError;
use crate::inbound::InboundStreamHandler;
use crate::lifecycle::PeerLifecycleManager;
use crate::ports::{Host, RoutingTable};
use crate::session::{SessionRegistry, Sessions};
use crate::watcher::RoutingTableWatcher;

/// `addr` with `/p2p/<peer>` appended, unless it already names a peer.
pub fn full_multiaddr(addr: &Multiaddr, peer: PeerId) -> Multiaddr {
    addr.clone().with_p2p(peer).unwrap_or_else(|addr| addr)
}

/// Wires a [`Host`] and a [`RoutingTable`] into the running overlay.
pub struct OverlayNode<H, R> {
    host: Arc<H>,
    routing: Arc<R>,
    config: OverlayConfig,
}

impl<H: Host, R: RoutingTable> OverlayNode<H, R> {
    pub fn new(host: Arc<H>, routing: Arc<R>, config: OverlayConfig) -> Self {
        Self {
            host,
            routing,
            config,
        }
    }

    /// Start the overlay.
    ///
    /// Registers the inbound stream handler and joins the routing substrate; either
    /// failing is fatal. Then spawns the inbound loop, the lifecycle manager and the
    /// watcher on `executor`, and dials the seeds in the background.
    pub async fn start(
        self,
        seeds: AddressBook,
        events: EventReceiver<PeerEvent>,
        executor: &TaskExecutor,
    ) -> Result<NodeHandle, NodeError> {
        let Self {
            host,
            routing,
            config,
        } = self;

        let local_peer_id = host.local_peer_id();
        let listen_addrs: Vec<Multiaddr> = host
            .listen_addrs()
            .iter()
            .map(|addr| full_multiaddr(addr, local_peer_id))
            .collect();
        for addr in &listen_addrs {
            info!(address = %addr, "node listening");
        }
        let local_addr = listen_addrs
            .first()
            .cloned()
            .unwrap_or_else(|| Multiaddr::empty().with(Protocol::P2p(local_peer_id)));

        let registry = SessionRegistry::new();
        let sessions = Sessions::new(
            registry.clone(),
            config.session.clone(),
            local_addr.to_string(),
            executor.clone(),
        );

        let incoming = host.accept(config.protocol.clone())?;

        let coordinator = BootstrapCoordinator::new(
            host.clone(),
            routing.clone(),
            sessions.clone(),
            config.protocol.clone(),
        )
        .with_retry_policy(config.bootstrap);
        coordinator.join().await?;

        let shutdown = executor.on_shutdown_signal().clone();

        let inbound = Arc::new(
            InboundStreamHandler::new(host.clone(), routing.clone(), sessions.clone())
                .with_connect_timeout(config.inbound_connect_timeout),
        );
        executor.spawn_critical("overlay.inbound", inbound.serve(incoming, shutdown.clone()));

        let manager = PeerLifecycleManager::new(host, sessions, config.protocol.clone())
            .with_removed_policy(config.removed_policy);
        executor.spawn_critical("overlay.lifecycle", manager.run(events, shutdown.clone()));

        let watcher = RoutingTableWatcher::new(routing).with_interval(config.watch_interval);
        executor.spawn_critical("overlay.watcher", watcher.run(shutdown.clone()));

        let (report_tx, report_rx) = oneshot::channel();
        executor.spawn(async move {
            let report = coordinator.connect_seeds(&seeds, &shutdown).await;
            let _ = report_tx.send(report);
        });

        info!(peer_id = %local_peer_id, protocol = %config.protocol, "overlay started");
        Ok(NodeHandle {
            local_peer_id,
            local_addr,
            sessions: registry,
            bootstrap: Some(report_rx),
        })
    }
}

/// Handle to a started overlay.
#[derive(Debug)]
pub struct NodeHandle {
    local_peer_id: PeerId,
    local_addr: Multiaddr,
    sessions: SessionRegistry,
    bootstrap: Option<oneshot::Receiver<BootstrapReport>>,
}

impl NodeHandle {
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// First listen address including `/p2p/<id>`.
    pub fn local_addr(&self) -> &Multiaddr {
        &self.local_addr
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Waits for the seed bootstrap to finish. `None` if it was already taken or
    /// the task ended without reporting.
    pub async fn bootstrap_report(&mut self) -> Option<BootstrapReport> {
        self.bootstrap.take()?.await.ok()
    }

    /// Close every registered session.
    pub fn close_sessions(&self) {
        let closed = self.sessions.close_all();
        info!(closed, "closed all sessions");
    }
}
