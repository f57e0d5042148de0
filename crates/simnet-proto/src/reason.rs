//! Protocol-level disconnect reasons.

use std::fmt;

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Reason attached to a protocol-level disconnect notification.
///
/// Encoded on the wire as a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum DisconnectReason {
    /// Disconnect requested by the local side.
    Requested = 0x00,
    /// Network error on the underlying transport.
    NetworkError = 0x01,
    /// Breach of the base protocol.
    ProtocolError = 0x02,
    /// Peer is of no use to us.
    UselessPeer = 0x03,
    /// Peer limit reached.
    TooManyPeers = 0x04,
    /// Already connected to this peer.
    AlreadyConnected = 0x05,
    /// Incompatible protocol version.
    IncompatibleVersion = 0x06,
    /// Invalid node identity.
    InvalidIdentity = 0x07,
    /// Node is shutting down.
    QuitRequested = 0x08,
    /// Identity did not match the expected one.
    UnexpectedIdentity = 0x09,
    /// Connection to self.
    SelfConnect = 0x0a,
    /// Read timed out.
    ReadTimeout = 0x0b,
    /// A sub-protocol asked for the disconnect.
    SubprotocolError = 0x10,
}

impl DisconnectReason {
    /// Wire byte.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a wire byte. Unknown values map to `None`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::Requested,
            0x01 => Self::NetworkError,
            0x02 => Self::ProtocolError,
            0x03 => Self::UselessPeer,
            0x04 => Self::TooManyPeers,
            0x05 => Self::AlreadyConnected,
            0x06 => Self::IncompatibleVersion,
            0x07 => Self::InvalidIdentity,
            0x08 => Self::QuitRequested,
            0x09 => Self::UnexpectedIdentity,
            0x0a => Self::SelfConnect,
            0x0b => Self::ReadTimeout,
            0x10 => Self::SubprotocolError,
            _ => return None,
        })
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "disconnect requested",
            Self::NetworkError => "network error",
            Self::ProtocolError => "breach of protocol",
            Self::UselessPeer => "useless peer",
            Self::TooManyPeers => "too many peers",
            Self::AlreadyConnected => "already connected",
            Self::IncompatibleVersion => "incompatible p2p protocol version",
            Self::InvalidIdentity => "invalid node identity",
            Self::QuitRequested => "client quitting",
            Self::UnexpectedIdentity => "unexpected identity",
            Self::SelfConnect => "connected to self",
            Self::ReadTimeout => "read timeout",
            Self::SubprotocolError => "subprotocol error",
        };
        f.write_str(s)
    }
}
