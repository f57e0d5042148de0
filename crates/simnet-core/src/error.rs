//! Error types for endpoints, adapters, and protocol handlers.

use simnet_proto::{NodeId, ProtoError};
use thiserror::Error;

/// Failure reading from or writing to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// Either half of the link was closed.
    #[error("pipe closed")]
    Closed,
}

/// Failure in a messenger send or receive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessengerError {
    /// The endpoint refused the operation.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// The payload could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] ProtoError),
}

/// Errors from node adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The network directory has no adapter for this identity.
    #[error("node adapter for {0} is missing")]
    AdapterNotFound(NodeId),

    /// The local node already holds a live endpoint for the peer.
    #[error("already connected {local} to peer {remote}")]
    AlreadyConnected {
        /// Node that owns the registry.
        local: NodeId,
        /// Peer whose slot is occupied.
        remote: NodeId,
    },

    /// No live endpoint exists for the peer.
    #[error("peer {remote} already disconnected from {local}")]
    AlreadyDisconnected {
        /// Node that owns the registry.
        local: NodeId,
        /// Peer with no live endpoint.
        remote: NodeId,
    },

    /// Launching the protocol on one side of a link failed.
    #[error("cannot run protocol ({from} -> {to}): {source}")]
    ProtocolLaunch {
        /// Peer as seen by the failing side.
        from: NodeId,
        /// Node whose launch failed.
        to: NodeId,
        /// Underlying failure.
        #[source]
        source: Box<AdapterError>,
    },

    /// The network directory has been dropped.
    #[error("network directory is gone")]
    NetworkGone,

    /// The observed remote endpoint is not a `host:port` pair.
    #[error("invalid remote address '{addr}': {reason}")]
    InvalidRemoteAddress {
        /// Address as observed on the transport.
        addr: String,
        /// Parser error message.
        reason: String,
    },

    /// Identity or node address could not be parsed.
    #[error(transparent)]
    Proto(#[from] ProtoError),
}

/// Error returned by a protocol handler when it exits.
///
/// Delivered verbatim through the peer's termination signal. Assertions
/// compare these by their display string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The link failed underneath the protocol.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// Sending or receiving failed.
    #[error(transparent)]
    Messenger(#[from] MessengerError),

    /// A message could not be decoded.
    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// Protocol-specific failure.
    #[error("{0}")]
    Other(String),
}

impl ProtocolError {
    /// Protocol-specific failure with a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
