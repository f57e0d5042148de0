//! Harness errors.

use std::time::Duration;

use simnet_core::MessengerError;
use simnet_proto::NodeId;
use thiserror::Error;

/// Which half of an exchange an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Outbound send.
    Trigger,
    /// Inbound match.
    Expect,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trigger => f.write_str("trigger"),
            Self::Expect => f.write_str("expect"),
        }
    }
}

/// Failure of a single trigger or expect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The session has no registry entry for the peer.
    #[error("peer {0} does not exist")]
    UnknownPeer(NodeId),

    /// The peer's entry exists but holds no endpoint.
    #[error("peer {0} unreachable")]
    PeerUnreachable(NodeId),

    /// The operation did not finish within its own timeout.
    #[error("{kind} timed out after {after:?} (peer {peer}, code {code})")]
    Timeout {
        /// Trigger or expect.
        kind: OperationKind,
        /// Peer the operation targeted.
        peer: NodeId,
        /// Message code involved.
        code: u64,
        /// Timeout that elapsed.
        after: Duration,
    },

    /// A message arrived but it was not the one expected.
    #[error("unexpected message from {peer}: expected code {expected_code}, got {got_code}: {detail}")]
    UnexpectedMessage {
        /// Peer the message was read from.
        peer: NodeId,
        /// Code the expectation named.
        expected_code: u64,
        /// Code that arrived.
        got_code: u64,
        /// What differed.
        detail: String,
    },

    /// Sending a trigger failed.
    #[error("send to {peer} failed: {source}")]
    Send {
        /// Target peer.
        peer: NodeId,
        /// Underlying failure.
        #[source]
        source: MessengerError,
    },

    /// Reading for an expectation failed.
    #[error("receive from {peer} failed: {source}")]
    Receive {
        /// Source peer.
        peer: NodeId,
        /// Underlying failure.
        #[source]
        source: MessengerError,
    },
}

/// Failure of a harness assertion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// An operation of the exchange failed.
    #[error("exchange {index} failed with: {source}")]
    ExchangeFailed {
        /// Position of the exchange in the run.
        index: usize,
        /// First operation error reported.
        #[source]
        source: OperationError,
    },

    /// The exchange did not settle within the exchange-wide timeout.
    #[error("exchange {index} timed out")]
    ExchangeTimedOut {
        /// Position of the exchange in the run.
        index: usize,
    },

    /// The peer did not come up in time.
    #[error("timed out waiting for peer {peer} to connect")]
    ConnectTimeout {
        /// Peer being waited for.
        peer: NodeId,
    },

    /// The peer's link terminated while waiting for it to come up.
    #[error("peer {peer} disconnected with error {}", .error.as_deref().unwrap_or("<none>"))]
    PeerDisconnected {
        /// Peer that went down.
        peer: NodeId,
        /// Handler error, if any.
        error: Option<String>,
    },

    /// The peer's link did not terminate in time.
    #[error("timed out waiting for peer {peer} to disconnect")]
    DisconnectTimeout {
        /// Peer being waited for.
        peer: NodeId,
    },

    /// The link terminated with a different outcome than expected.
    #[error(
        "unexpected error on peer {peer}: '{}', wanted '{}'",
        .got.as_deref().unwrap_or("<none>"),
        .wanted.as_deref().unwrap_or("<none>")
    )]
    DisconnectMismatch {
        /// Peer that terminated.
        peer: NodeId,
        /// Termination outcome observed.
        got: Option<String>,
        /// Termination outcome expected.
        wanted: Option<String>,
    },

    /// The session has no registry entry for the peer.
    #[error("peer {0} does not exist")]
    UnknownPeer(NodeId),

    /// A harness task panicked or was cancelled.
    #[error("harness task failed: {0}")]
    TaskFailed(String),
}
