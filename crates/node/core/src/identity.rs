//! Node identity.
//!
//! The keypair is either supplied as hex of its protobuf encoding (the
//! `PRIVATE_KEY` environment variable or `--private-key`) or generated fresh as
//! secp256k1 on every start.

use libp2p::PeerId;
use libp2p::identity::{DecodingError, Keypair};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("private key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("private key is not a protobuf-encoded libp2p key: {0}")]
    Decode(#[from] DecodingError),
}

/// The node's keypair and the peer id derived from it.
#[derive(Clone)]
pub struct NodeIdentity {
    keypair: Keypair,
    peer_id: PeerId,
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("peer_id", &self.peer_id)
            .field("key_type", &self.keypair.key_type())
            .finish_non_exhaustive()
    }
}

impl NodeIdentity {
    pub fn from_keypair(keypair: Keypair) -> Self {
        let peer_id = keypair.public().to_peer_id();
        Self { keypair, peer_id }
    }

    /// Fresh secp256k1 identity.
    pub fn generate() -> Self {
        Self::from_keypair(Keypair::generate_secp256k1())
    }

    /// Decode hex of a protobuf-encoded private key.
    pub fn from_hex(encoded: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(encoded.trim())?;
        Ok(Self::from_keypair(Keypair::from_protobuf_encoding(&bytes)?))
    }

    /// Decode `private_key` when present and non-empty, otherwise generate.
    pub fn load(private_key: Option<&str>) -> Result<Self, IdentityError> {
        match private_key.map(str::trim) {
            Some(encoded) if !encoded.is_empty() => Self::from_hex(encoded),
            _ => Ok(Self::generate()),
        }
    }

    /// Hex of the protobuf encoding, the inverse of [`NodeIdentity::from_hex`].
    pub fn to_hex(&self) -> Result<String, IdentityError> {
        Ok(hex::encode(self.keypair.to_protobuf_encoding()?))
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }
}
