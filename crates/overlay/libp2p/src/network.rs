use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use libp2p::identity::Keypair;
use libp2p::{SwarmBuilder, noise, tcp, tls, yamux};
use meshlite_net_peers::{EventSink, PeerEvent};
use meshlite_tasks::TaskExecutor;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::behaviour::OverlayBehaviour;
use crate::config::NetworkConfig;
use crate::driver::{Handle, SwarmDriver};
use crate::host::Libp2pHost;
use crate::routing::Libp2pRouting;

/// How long [`Network::spawn`] waits for the first listen address.
const LISTEN_TIMEOUT: Duration = Duration::from_secs(5);

/// The two overlay ports over one running swarm.
#[derive(Debug, Clone)]
pub struct Network {
    pub host: Arc<Libp2pHost>,
    pub routing: Arc<Libp2pRouting>,
}

impl Network {
    /// Build the swarm, start listening and spawn its driver as a critical task.
    ///
    /// Membership changes of the Kademlia table are published into `events`.
    /// Returns once the first listen address is known, so
    /// [`Host::listen_addrs`](meshlite_overlay::Host::listen_addrs) is populated.
    pub async fn spawn(
        keypair: Keypair,
        config: NetworkConfig,
        events: EventSink<PeerEvent>,
        executor: &TaskExecutor,
    ) -> eyre::Result<Self> {
        let local_peer_id = keypair.public().to_peer_id();

        let mut swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                (tls::Config::new, noise::Config::new),
                yamux::Config::default,
            )
            .wrap_err("failed to configure tcp transport")?
            .with_dns()
            .wrap_err("failed to configure dns resolution")?
            .with_behaviour(|keypair| OverlayBehaviour::new(keypair, &config))?
            .with_swarm_config(|cfg| {
                cfg.with_idle_connection_timeout(config.idle_connection_timeout)
            })
            .build();

        for addr in &config.listen_addrs {
            swarm
                .listen_on(addr.clone())
                .wrap_err_with(|| format!("failed to listen on {addr}"))?;
        }

        let control = swarm.behaviour().stream.new_control();
        let listen_addrs = Arc::new(RwLock::new(Vec::new()));
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer.max(1));
        let (listening_tx, listening_rx) = oneshot::channel();

        let driver = SwarmDriver::new(
            swarm,
            commands_rx,
            events,
            listen_addrs.clone(),
            listening_tx,
            config.kad_protocol.clone(),
        );
        let shutdown = executor.on_shutdown_signal().clone();
        executor.spawn_critical("libp2p.swarm", driver.run(shutdown));

        if !config.listen_addrs.is_empty()
            && !matches!(
                tokio::time::timeout(LISTEN_TIMEOUT, listening_rx).await,
                Ok(Ok(()))
            )
        {
            warn!("no listen address reported yet");
        }
        info!(%local_peer_id, server_mode = config.server_mode, "libp2p network started");

        let handle = Handle {
            commands: commands_tx,
            local_peer_id,
            listen_addrs,
        };
        Ok(Self {
            host: Arc::new(Libp2pHost::new(
                handle.clone(),
                control,
                config.dial_timeout,
            )),
            routing: Arc::new(Libp2pRouting::new(handle)),
        })
    }
}
