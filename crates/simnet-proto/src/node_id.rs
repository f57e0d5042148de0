//! Node identity.

use std::fmt;

use crate::ProtoError;

/// Length of a node identity in bytes (an uncompressed secp256k1 public key
/// without its format prefix).
pub const NODE_ID_LEN: usize = 64;

/// Opaque, comparable node identifier.
///
/// Used as the key for every peer lookup. `Display` prints the first 8 bytes
/// in hex, which is enough to tell nodes apart in logs; use
/// [`NodeId::to_hex`] for the full form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// Wrap raw identity bytes.
    pub const fn new(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an identity from a byte slice of exactly [`NODE_ID_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtoError> {
        let raw: [u8; NODE_ID_LEN] = bytes.try_into().map_err(|_| ProtoError::InvalidNodeId {
            reason: format!("expected {NODE_ID_LEN} bytes, got {}", bytes.len()),
        })?;
        Ok(Self(raw))
    }

    /// Parse the full 128-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, ProtoError> {
        let bytes =
            hex::decode(s).map_err(|e| ProtoError::InvalidNodeId { reason: e.to_string() })?;
        Self::from_slice(&bytes)
    }

    /// Raw identity bytes.
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Full hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Human-readable peer name derived from the identity.
    pub fn name(&self) -> String {
        format!("node-{self}")
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

impl From<[u8; NODE_ID_LEN]> for NodeId {
    fn from(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for NodeId {
    type Error = ProtoError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(bytes)
    }
}
