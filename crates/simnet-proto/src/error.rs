//! Protocol vocabulary errors.

use thiserror::Error;

/// Errors raised while parsing identities, addresses, or message payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// Node identity has the wrong length or is not valid hex.
    #[error("invalid node id: {reason}")]
    InvalidNodeId {
        /// What was wrong with the input.
        reason: String,
    },

    /// Canonical node address could not be parsed.
    #[error("invalid node address: {reason}")]
    InvalidNodeAddress {
        /// What was wrong with the input.
        reason: String,
    },

    /// No variant of the message set is registered under this code.
    #[error("unknown message code {code}")]
    UnknownCode {
        /// Code carried by the envelope.
        code: u64,
    },

    /// Payload serialization failed.
    #[error("failed to encode payload: {0}")]
    Encode(String),

    /// Payload deserialization failed.
    #[error("failed to decode payload for code {code}: {reason}")]
    Decode {
        /// Code carried by the envelope.
        code: u64,
        /// Decoder error message.
        reason: String,
    },
}

impl ProtoError {
    pub(crate) fn invalid_addr(reason: impl Into<String>) -> Self {
        Self::InvalidNodeAddress { reason: reason.into() }
    }
}
