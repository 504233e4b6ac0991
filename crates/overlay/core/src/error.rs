//! Error taxonomy of the overlay.
//!
//! Everything except [`BootstrapJoinError`] and [`AcceptError`] is recovered per
//! peer: logged, and that peer's attempt abandoned.

use std::io;
use std::time::Duration;

use libp2p::{PeerId, StreamProtocol};

pub use meshlite_net_peers::{AddressParseError, RetryError};

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("dial {peer} failed: {reason}")]
    Dial { peer: PeerId, reason: String },
    #[error("no known address for {0}")]
    NoAddress(PeerId),
    #[error("connect to {peer} timed out after {timeout:?}")]
    Timeout { peer: PeerId, timeout: Duration },
    #[error("transport is shut down")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum StreamOpenError {
    #[error("peer {peer} does not support {protocol}")]
    UnsupportedProtocol {
        peer: PeerId,
        protocol: StreamProtocol,
    },
    #[error("failed to open {protocol} stream to {peer}: {reason}")]
    Open {
        peer: PeerId,
        protocol: StreamProtocol,
        reason: String,
    },
    #[error("transport is shut down")]
    Closed,
}

/// I/O failure on an established stream. Ends one direction of a session.
#[derive(Debug, thiserror::Error)]
pub enum StreamIoError {
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    #[error("flush failed: {0}")]
    Flush(#[source] io::Error),
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum RoutingRegistrationError {
    #[error("no address known for {0}")]
    NoAddress(PeerId),
    #[error("routing table is shut down")]
    Closed,
}

/// The routing substrate's own join failed. Fatal to node start.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapJoinError {
    #[error("routing bootstrap failed: {0}")]
    Query(String),
    #[error("routing table is shut down")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    #[error("a handler for {0} is already registered")]
    AlreadyRegistered(StreamProtocol),
    #[error("transport is shut down")]
    Closed,
}

/// Failure of the node start sequence.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapJoinError),
    #[error(transparent)]
    Accept(#[from] AcceptError),
}
