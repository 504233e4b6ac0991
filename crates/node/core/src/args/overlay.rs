use std::time::Duration;

use clap::Args;
use meshlite_net_peers::OverflowPolicy;
use meshlite_overlay::RemovedPeerPolicy;

/// Peer lifecycle parameters.
#[derive(Debug, Clone, Args, PartialEq, Eq)]
#[command(next_help_heading = "Overlay")]
pub struct OverlayArgs {
    /// Protocol the overlay streams are opened and accepted under.
    #[arg(long, value_name = "PROTOCOL", default_value = "/meshlite/0.1.0")]
    pub protocol: String,

    /// Dial attempts per seed peer before it is abandoned.
    #[arg(long = "bootstrap.max-attempts", value_name = "COUNT", default_value_t = 3)]
    pub bootstrap_max_attempts: usize,

    /// Pause after a failed seed dial.
    #[arg(
        long = "bootstrap.retry-delay",
        value_name = "DURATION",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    pub bootstrap_retry_delay: Duration,

    /// Pause between two writes on a session.
    #[arg(
        long = "session.write-interval",
        value_name = "DURATION",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub session_write_interval: Duration,

    /// How often the routing table is logged.
    #[arg(
        long = "routing.watch-interval",
        value_name = "DURATION",
        default_value = "60s",
        value_parser = humantime::parse_duration
    )]
    pub routing_watch_interval: Duration,

    /// What to do when a peer leaves the routing table.
    #[arg(long = "routing.peer-removed", value_name = "POLICY", default_value = "teardown")]
    pub routing_peer_removed: RemovedPeerPolicy,

    /// How long an inbound stream waits for the connection back to its peer.
    #[arg(
        long = "inbound.connect-timeout",
        value_name = "DURATION",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    pub inbound_connect_timeout: Duration,

    /// Membership events buffered ahead of the lifecycle manager.
    #[arg(long = "events.capacity", value_name = "COUNT", default_value_t = 1024)]
    pub events_capacity: usize,

    /// Which event to drop when the buffer is full.
    #[arg(long = "events.overflow", value_name = "POLICY", default_value = "drop-newest")]
    pub events_overflow: OverflowPolicy,
}
