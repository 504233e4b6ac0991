//! Overlay configuration.

use std::time::Duration;

use libp2p::StreamProtocol;
use meshlite_net_peers::{DEFAULT_EVENT_BUS_CAPACITY, OverflowPolicy, RetryPolicy};

pub const DEFAULT_PROTOCOL: StreamProtocol = StreamProtocol::new("/meshlite/0.1.0");
pub const DEFAULT_INBOUND_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WRITE_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(60);

/// What the lifecycle manager does with a `Removed` membership event.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[strum(serialize_all = "kebab-case")]
pub enum RemovedPeerPolicy {
    /// Close every registered session with the peer. No connect.
    #[default]
    Teardown,
    /// Handle it exactly like `Added`: connect, open a stream, start a session.
    Reconnect,
    /// Log and move on.
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Pause between two writes of the session payload.
    pub write_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            write_interval: DEFAULT_WRITE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBusConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_BUS_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Protocol every overlay stream is opened and accepted under.
    pub protocol: StreamProtocol,
    /// Dial retries for seed peers.
    pub bootstrap: RetryPolicy,
    pub inbound_connect_timeout: Duration,
    pub session: SessionConfig,
    pub watch_interval: Duration,
    pub removed_policy: RemovedPeerPolicy,
    pub events: EventBusConfig,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_PROTOCOL,
            bootstrap: RetryPolicy::default(),
            inbound_connect_timeout: DEFAULT_INBOUND_CONNECT_TIMEOUT,
            session: SessionConfig::default(),
            watch_interval: DEFAULT_WATCH_INTERVAL,
            removed_policy: RemovedPeerPolicy::default(),
            events: EventBusConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OverlayConfig::default();
        assert_eq!(config.protocol.as_ref(), "/meshlite/0.1.0");
        assert_eq!(config.bootstrap.max_attempts, 3);
        assert_eq!(config.bootstrap.delay, Duration::from_secs(5));
        assert_eq!(config.inbound_connect_timeout, Duration::from_secs(5));
        assert_eq!(config.session.write_interval, Duration::from_secs(10));
        assert_eq!(config.watch_interval, Duration::from_secs(60));
        assert_eq!(config.removed_policy, RemovedPeerPolicy::Teardown);
        assert_eq!(config.events.capacity, 1024);
    }

    #[test]
    fn test_removed_policy_parse() {
        assert_eq!(
            "reconnect".parse::<RemovedPeerPolicy>().unwrap(),
            RemovedPeerPolicy::Reconnect
        );
        assert!("bogus".parse::<RemovedPeerPolicy>().is_err());
    }
}
