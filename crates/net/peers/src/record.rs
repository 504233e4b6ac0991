//! Peer identity plus the addresses it can be reached on.

use std::fmt;
use std::str::FromStr;

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};

/// Failure to turn a seed string into a [`PeerRecord`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("empty peer address")]
    Empty,
    #[error("invalid multiaddr `{input}`: {reason}")]
    Multiaddr { input: String, reason: String },
    #[error("address `{0}` does not end in a /p2p/<peer id> component")]
    MissingPeerId(String),
}

/// A peer identifier and zero or more dialable addresses. Immutable once built.
///
/// Records with no addresses are partial: routing-table membership callbacks only
/// know the identifier, and the transport resolves addresses on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerRecord {
    id: PeerId,
    addrs: Vec<Multiaddr>,
}

impl PeerRecord {
    pub fn new(id: PeerId, addrs: Vec<Multiaddr>) -> Self {
        Self { id, addrs }
    }

    pub fn from_peer_id(id: PeerId) -> Self {
        Self {
            id,
            addrs: Vec::new(),
        }
    }

    /// Split `/ip4/1.2.3.4/tcp/4001/p2p/<id>` into the peer id and its transport address.
    pub fn from_p2p_addr(addr: &Multiaddr) -> Result<Self, AddressParseError> {
        let mut transport = addr.clone();
        match transport.pop() {
            Some(Protocol::P2p(id)) => {
                let addrs = if transport.is_empty() {
                    Vec::new()
                } else {
                    vec![transport]
                };
                Ok(Self { id, addrs })
            }
            _ => Err(AddressParseError::MissingPeerId(addr.to_string())),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn addrs(&self) -> &[Multiaddr] {
        &self.addrs
    }

    pub fn is_partial(&self) -> bool {
        self.addrs.is_empty()
    }
}

impl FromStr for PeerRecord {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(AddressParseError::Empty);
        }
        let addr: Multiaddr = input.parse().map_err(|e: libp2p::multiaddr::Error| {
            AddressParseError::Multiaddr {
                input: input.to_string(),
                reason: e.to_string(),
            }
        })?;
        Self::from_p2p_addr(&addr)
    }
}

impl fmt::Display for PeerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if !self.addrs.is_empty() {
            let addrs: Vec<String> = self.addrs.iter().map(ToString::to_string).collect();
            write!(f, " [{}]", addrs.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_parse_full_address() {
        let id = PeerId::random();
        let input = format!("/ip4/10.0.0.1/tcp/4001/p2p/{id}");

        let record: PeerRecord = input.parse().unwrap();
        assert_eq!(record.id(), id);
        assert_eq!(
            record.addrs(),
            &["/ip4/10.0.0.1/tcp/4001".parse::<Multiaddr>().unwrap()]
        );
        assert!(!record.is_partial());
    }

    #[test]
    fn test_parse_bare_p2p() {
        let id = PeerId::random();
        let record: PeerRecord = format!("/p2p/{id}").parse().unwrap();
        assert_eq!(record.id(), id);
        assert!(record.is_partial());
    }

    #[test]
    fn test_missing_peer_id() {
        let err = "/ip4/10.0.0.1/tcp/4001".parse::<PeerRecord>().unwrap_err();
        assert_matches!(err, AddressParseError::MissingPeerId(_));
    }

    #[test]
    fn test_garbage_and_empty() {
        assert_matches!(
            "not-a-multiaddr".parse::<PeerRecord>(),
            Err(AddressParseError::Multiaddr { .. })
        );
        assert_matches!("   ".parse::<PeerRecord>(), Err(AddressParseError::Empty));
    }

    #[test]
    fn test_display() {
        let id = PeerId::random();
        assert_eq!(PeerRecord::from_peer_id(id).to_string(), id.to_string());
    }
}
