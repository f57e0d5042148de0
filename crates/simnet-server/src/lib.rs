//! simnet server.
//!
//! Hosts simulated overlay networks in a long-running process:
//!
//! ```text
//! simnet-server
//!   ├─ SystemEnv          (system clock, OS entropy)
//!   ├─ SessionController  (named networks, shutdown channel)
//!   └─ PingProtocol       (demo protocol on every link)
//! ```
//!
//! The process stops when the controller is destroyed or on ctrl-c.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod controller;
mod error;
mod protocol;
mod system_env;

use std::{sync::Arc, time::Duration};

pub use controller::{NetworkConfig, SessionController, ShutdownReceiver};
pub use error::{ControllerError, ServerError};
pub use protocol::{PING_CODE, PONG_CODE, PingMsg, PingProtocol};
use simnet_core::Environment;
pub use system_env::SystemEnv;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Nodes in the network created at startup.
    pub nodes: usize,
    /// Pause between ping rounds on each link.
    pub ping_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let network = NetworkConfig::default();
        Self { nodes: network.nodes, ping_interval: network.ping_interval }
    }
}

/// Long-running host for one simulated network.
#[derive(Debug)]
pub struct Server<E: Environment = SystemEnv> {
    controller: Arc<SessionController<E>>,
    config: ServerConfig,
}

impl Server {
    /// Server on the system environment.
    pub fn new(config: ServerConfig) -> (Self, ShutdownReceiver) {
        Self::with_env(SystemEnv::new(), config)
    }
}

impl<E: Environment> Server<E> {
    /// Server drawing identities and time from `env`.
    pub fn with_env(env: E, config: ServerConfig) -> (Self, ShutdownReceiver) {
        let (controller, shutdown) = SessionController::with_env(env);
        (Self { controller: Arc::new(controller), config }, shutdown)
    }

    /// Controller for the networks this server hosts.
    pub fn controller(&self) -> Arc<SessionController<E>> {
        Arc::clone(&self.controller)
    }

    /// Create the startup network and run until `shutdown` fires or the
    /// process is interrupted.
    pub async fn run(self, mut shutdown: ShutdownReceiver) -> Result<(), ServerError> {
        let id = self.controller.create(NetworkConfig {
            id: None,
            nodes: self.config.nodes,
            ping_interval: self.config.ping_interval,
        })?;
        tracing::info!("serving network {}", id);

        tokio::select! {
            _ = shutdown.recv() => tracing::info!("shutdown requested"),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("interrupted");
            },
        }

        self.controller.remove_all();
        tracing::info!("server stopped");
        Ok(())
    }
}
