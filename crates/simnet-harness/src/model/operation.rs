//! Operations for model-based testing.
//!
//! Operations are the lifecycle actions a simulation can take. They are
//! generated randomly by proptest (or decoded from fuzz input) and applied to
//! both the model and the simulated network.

use arbitrary::Arbitrary;

/// Node index into the simulated network (0-indexed).
pub type NodeIndex = u8;

/// Lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// `from` links to `to`.
    Connect {
        /// Dialing node.
        from: NodeIndex,
        /// Dialed node.
        to: NodeIndex,
    },

    /// `from` drops its link to `to`.
    Disconnect {
        /// Node dropping the link.
        from: NodeIndex,
        /// Peer being dropped.
        to: NodeIndex,
    },
}

impl Operation {
    /// Same operation with node indices folded into `0..num_nodes`.
    #[must_use]
    pub fn clamp(self, num_nodes: usize) -> Self {
        let n = u8::try_from(num_nodes.max(1)).unwrap_or(u8::MAX);
        match self {
            Self::Connect { from, to } => Self::Connect { from: from % n, to: to % n },
            Self::Disconnect { from, to } => Self::Disconnect { from: from % n, to: to % n },
        }
    }
}

/// Result of applying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded.
    Ok,

    /// Operation failed with an expected error.
    Error(LifecycleError),
}

/// Expected lifecycle errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// A node cannot link to itself.
    SelfLink,

    /// The pair is already linked.
    AlreadyConnected,

    /// The pair is not linked.
    AlreadyDisconnected,

    /// Node index out of range.
    InvalidNode,
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}
