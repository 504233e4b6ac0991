//! CLI argument groups, flattened into the binary's command.

mod log;
mod network;
mod overlay;

pub use log::{DEFAULT_MAX_FILES, LogArgs};
pub use network::NetworkArgs;
pub use overlay::OverlayArgs;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;
    use meshlite_net_peers::OverflowPolicy;
    use meshlite_overlay::RemovedPeerPolicy;

    use super::*;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        network: NetworkArgs,
        #[command(flatten)]
        overlay: OverlayArgs,
        #[command(flatten)]
        log: LogArgs,
    }

    #[test]
    fn positional_peers_and_port() {
        let seed = format!("/ip4/10.0.0.1/tcp/4001/p2p/{}", libp2p::PeerId::random());
        let cli = TestCli::parse_from(["meshlite", seed.as_str(), "4002"]);
        assert!(cli.network.peers.starts_with("/ip4/10.0.0.1"));
        assert_eq!(cli.network.port, 4002);
    }

    #[test]
    fn defaults() {
        let cli = TestCli::parse_from(["meshlite"]);
        assert_eq!(cli.network.port, 0);
        assert_eq!(cli.network.dial_timeout, Duration::from_secs(30));
        assert_eq!(cli.overlay.protocol, "/meshlite/0.1.0");
        assert_eq!(cli.overlay.bootstrap_max_attempts, 3);
        assert_eq!(cli.overlay.bootstrap_retry_delay, Duration::from_secs(5));
        assert_eq!(cli.overlay.session_write_interval, Duration::from_secs(10));
        assert_eq!(cli.overlay.routing_watch_interval, Duration::from_secs(60));
        assert_eq!(cli.overlay.routing_peer_removed, RemovedPeerPolicy::Teardown);
        assert_eq!(cli.overlay.inbound_connect_timeout, Duration::from_secs(5));
        assert_eq!(cli.overlay.events_capacity, 1024);
        assert_eq!(cli.overlay.events_overflow, OverflowPolicy::DropNewest);
        assert_eq!(cli.log, LogArgs::default());
    }

    #[test]
    fn dotted_flags() {
        let cli = TestCli::parse_from([
            "meshlite",
            "--bootstrap.retry-delay",
            "250ms",
            "--routing.peer-removed",
            "reconnect",
            "--events.overflow",
            "drop-oldest",
            "--log.filter",
            "libp2p=warn",
            "-vv",
        ]);
        assert_eq!(cli.overlay.bootstrap_retry_delay, Duration::from_millis(250));
        assert_eq!(cli.overlay.routing_peer_removed, RemovedPeerPolicy::Reconnect);
        assert_eq!(cli.overlay.events_overflow, OverflowPolicy::DropOldest);
        assert_eq!(cli.log.filter.as_deref(), Some("libp2p=warn"));
        assert_eq!(cli.log.verbosity, 2);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(TestCli::try_parse_from(["meshlite", "--routing.peer-removed", "bogus"]).is_err());
    }
}
