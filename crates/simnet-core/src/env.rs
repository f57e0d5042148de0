//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the simulator from system resources
//! (time, randomness). Simulations plug in a seeded RNG so node identities
//! and journal timestamps are reproducible; the server binary plugs in the
//! system clock and OS entropy.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

use simnet_proto::{NODE_ID_LEN, NodeId};

/// Abstract environment providing time, randomness, and async sleeping.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    ///
    /// Subsequent calls must return times >= previous calls.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Simulation implementations MUST be deterministic for a given seed.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Draw a fresh node identity from the environment's RNG.
pub fn random_node_id(env: &impl Environment) -> NodeId {
    let mut raw = [0u8; NODE_ID_LEN];
    env.random_bytes(&mut raw);
    NodeId::new(raw)
}

/// Draw `n` node identities.
pub fn random_node_ids(env: &impl Environment, n: usize) -> Vec<NodeId> {
    (0..n).map(|_| random_node_id(env)).collect()
}
