//! Command line and node wiring.

use clap::Parser;
use eyre::{Result, WrapErr};
use meshlite_net_peers::event_bus;
use meshlite_node_core::args::{LogArgs, NetworkArgs, OverlayArgs};
use meshlite_node_core::{NodeConfig, NodeIdentity};
use meshlite_overlay::OverlayNode;
use meshlite_overlay_libp2p::Network;
use meshlite_tasks::TaskManager;
use tracing::{info, warn};

/// meshlite - peer-to-peer overlay node
///
/// Joins the overlay through the given seed peers (or waits for others to join
/// it) and keeps a duplex session open with every peer it learns about.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct MeshliteCli {
    #[command(flatten)]
    pub(crate) network: NetworkArgs,

    #[command(flatten)]
    pub(crate) overlay: OverlayArgs,

    /// Logging configuration.
    #[command(flatten)]
    pub(crate) logs: LogArgs,
}

/// Start the node and run it until ctrl-c or a critical task panics.
pub(crate) async fn run(cli: MeshliteCli) -> Result<()> {
    let config = NodeConfig::from_args(&cli.network, &cli.overlay)?;
    for (entry, error) in config.seeds.errors() {
        warn!(entry, %error, "ignoring seed entry");
    }

    let identity = NodeIdentity::load(cli.network.private_key.as_deref())
        .wrap_err("failed to load node identity")?;
    info!(peer_id = %identity.peer_id(), "node identity");

    let mut tasks = TaskManager::current();
    let executor = tasks.executor();

    let (sink, events) = event_bus(
        config.overlay.events.capacity,
        config.overlay.events.overflow,
    );
    let network = Network::spawn(
        identity.keypair().clone(),
        config.network.clone(),
        sink,
        &executor,
    )
    .await
    .wrap_err("failed to start libp2p network")?;

    let node = OverlayNode::new(
        network.host.clone(),
        network.routing.clone(),
        config.overlay.clone(),
    );
    let mut handle = node
        .start(config.seeds, events, &executor)
        .await
        .wrap_err("failed to start overlay node")?;
    info!(addr = %handle.local_addr(), "node started");

    let mut bootstrapping = true;
    let outcome = loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                info!("received ctrl-c, shutting down");
                break result.wrap_err("failed to listen for ctrl-c");
            }
            Some(panicked) = tasks.wait_for_critical_panic() => {
                break Err(panicked.into());
            }
            report = handle.bootstrap_report(), if bootstrapping => {
                bootstrapping = false;
                if let Some(report) = report {
                    info!(
                        seeds = report.outcomes.len(),
                        connected = report.connected(),
                        "seed bootstrap finished"
                    );
                }
            }
        }
    };

    tasks.fire_shutdown();
    handle.close_sessions();
    info!("node stopped");
    outcome
}
