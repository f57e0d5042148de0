//! Server error types.

use simnet_core::AdapterError;
use thiserror::Error;

/// Errors from the session controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// No network is registered under this id.
    #[error("network '{0}' not found")]
    NotFound(String),

    /// A network with this id already exists.
    #[error("network '{0}' already exists")]
    AlreadyExists(String),

    /// The requested network shape cannot be built.
    #[error("invalid network config: {0}")]
    InvalidConfig(String),

    /// Linking two nodes failed while building the network.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Session controller failure.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Waiting for the interrupt signal failed.
    #[error("signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}
