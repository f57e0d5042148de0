//! Environment backed by the system clock and OS entropy.

use std::time::{Duration, Instant};

use simnet_core::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// Node identities drawn from it come from `getrandom`, so two servers
/// never hand out colliding ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Not expected on supported platforms.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
