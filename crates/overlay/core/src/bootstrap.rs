//! Initial network entry through the configured seed peers.

use std::sync::Arc;

use futures::future::join_all;
use libp2p::{PeerId, StreamProtocol};
use meshlite_net_peers::{AddressBook, PeerRecord, RetryError, RetryPolicy, SeedEntry, retry};
use meshlite_tasks::Shutdown;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::error::{BootstrapJoinError, ConnectError};
use crate::ports::{Host, RoutingTable};
use crate::session::{SessionKey, SessionSource, Sessions};

/// How one seed's bootstrap attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Connected, handshake written, stream handed to a session.
    Connected { peer: PeerId, session: SessionKey },
    Invalid,
    SkippedSelf,
    /// Every dial attempt failed.
    Abandoned { peer: PeerId, attempts: usize },
    /// Connected, but the stream could not be opened or written.
    StreamFailed { peer: PeerId },
    Cancelled { peer: PeerId },
}

#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    /// One outcome per address book entry, in address book order.
    pub outcomes: Vec<SeedOutcome>,
}

impl BootstrapReport {
    pub fn connected(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SeedOutcome::Connected { .. }))
            .count()
    }
}

/// Joins the routing substrate and dials every seed concurrently.
pub struct BootstrapCoordinator<H, R> {
    host: Arc<H>,
    routing: Arc<R>,
    sessions: Sessions,
    protocol: StreamProtocol,
    policy: RetryPolicy,
}

impl<H: Host, R: RoutingTable> BootstrapCoordinator<H, R> {
    pub fn new(
        host: Arc<H>,
        routing: Arc<R>,
        sessions: Sessions,
        protocol: StreamProtocol,
    ) -> Self {
        Self {
            host,
            routing,
            sessions,
            protocol,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Join, then dial all seeds. A join failure aborts before any dial.
    pub async fn run(
        &self,
        seeds: &AddressBook,
        shutdown: &Shutdown,
    ) -> Result<BootstrapReport, BootstrapJoinError> {
        self.join().await?;
        Ok(self.connect_seeds(seeds, shutdown).await)
    }

    /// Run the routing substrate's own join protocol.
    pub async fn join(&self) -> Result<(), BootstrapJoinError> {
        self.routing.bootstrap().await.inspect_err(|e| {
            error!(error = %e, "routing table bootstrap failed");
        })
    }

    /// Dial every seed concurrently. Completes once every seed has an outcome.
    pub async fn connect_seeds(
        &self,
        seeds: &AddressBook,
        shutdown: &Shutdown,
    ) -> BootstrapReport {
        if seeds.is_empty() {
            info!("no seed peers configured");
            return BootstrapReport::default();
        }
        info!(seeds = seeds.len(), "bootstrapping from seed peers");

        let attempts = seeds
            .entries()
            .iter()
            .map(|entry| self.bootstrap_seed(entry, shutdown));
        let outcomes = join_all(attempts).await;
        let report = BootstrapReport { outcomes };
        info!(
            seeds = seeds.len(),
            connected = report.connected(),
            "bootstrap finished"
        );
        report
    }

    async fn bootstrap_seed(&self, entry: &SeedEntry, shutdown: &Shutdown) -> SeedOutcome {
        let record = match &entry.record {
            Ok(record) => record,
            Err(e) => {
                warn!(seed = %entry.raw, error = %e, "skipping invalid seed address");
                return SeedOutcome::Invalid;
            }
        };
        let peer = record.id();
        if peer == self.host.local_peer_id() {
            debug!(seed = %entry.raw, "skipping own address in seed list");
            return SeedOutcome::SkippedSelf;
        }

        self.register(record).await;

        if let Err(e) = self.dial(record, shutdown).await {
            return match e {
                RetryError::Exhausted { attempts, last } => {
                    error!(%peer, attempts, error = %last, "giving up on seed peer");
                    SeedOutcome::Abandoned { peer, attempts }
                }
                RetryError::Cancelled { .. } => {
                    debug!(%peer, "seed bootstrap cancelled");
                    SeedOutcome::Cancelled { peer }
                }
            };
        }
        info!(%peer, "connected to seed peer");

        let mut stream = match self.host.open_stream(peer, &self.protocol).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%peer, error = %e, "failed to open stream to seed peer");
                return SeedOutcome::StreamFailed { peer };
            }
        };

        let hello = format!("Initial hello from {}\n", entry.raw);
        let written = async {
            stream.write_all(hello.as_bytes()).await?;
            stream.flush().await
        };
        if let Err(e) = written.await {
            warn!(%peer, error = %e, "failed to write handshake to seed peer");
            return SeedOutcome::StreamFailed { peer };
        }

        let session = self.sessions.start(peer, stream, SessionSource::Bootstrap);
        SeedOutcome::Connected { peer, session }
    }

    /// Trusted, non-querying registration. Failure does not stop the dial.
    async fn register(&self, record: &PeerRecord) {
        let peer = record.id();
        match self.routing.try_add_peer(record, true, false).await {
            Ok(true) => debug!(%peer, "seed peer added to routing table"),
            Ok(false) => warn!(%peer, "routing table rejected seed peer"),
            Err(e) => warn!(%peer, error = %e, "failed to add seed peer to routing table"),
        }
    }

    async fn dial(
        &self,
        record: &PeerRecord,
        shutdown: &Shutdown,
    ) -> Result<(), RetryError<ConnectError>> {
        let host = &self.host;
        let peer = record.id();
        let max_attempts = self.policy.max_attempts;
        retry(&self.policy, shutdown, move |attempt| async move {
            host.connect(record).await.inspect_err(|e| {
                warn!(%peer, attempt, max_attempts, error = %e, "failed to connect to seed peer");
            })
        })
        .await
    }
}
