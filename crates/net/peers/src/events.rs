//! Routing-table membership events.

use libp2p::PeerId;

use crate::record::PeerRecord;

/// What happened to a peer's routing-table membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum PeerAction {
    Added,
    Removed,
}

/// Membership change delivered to the peer lifecycle worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEvent {
    pub record: PeerRecord,
    pub action: PeerAction,
    /// Subsystem that produced the event, e.g. `"kad"`.
    pub source: &'static str,
}

impl PeerEvent {
    pub fn new(record: PeerRecord, action: PeerAction, source: &'static str) -> Self {
        Self {
            record,
            action,
            source,
        }
    }

    pub fn added(peer: PeerId, source: &'static str) -> Self {
        Self::new(PeerRecord::from_peer_id(peer), PeerAction::Added, source)
    }

    pub fn removed(peer: PeerId, source: &'static str) -> Self {
        Self::new(PeerRecord::from_peer_id(peer), PeerAction::Removed, source)
    }

    pub fn peer_id(&self) -> PeerId {
        self.record.id()
    }

    pub fn is_added(&self) -> bool {
        self.action == PeerAction::Added
    }
}
