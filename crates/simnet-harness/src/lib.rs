//! Test harness for protocols running on simnet nodes.
//!
//! # Exchange testing
//!
//! [`ExchangeTestSession`] drives scripted message exchanges against the
//! registry halves of simulated nodes, and asserts that peers connect and
//! disconnect as expected. See the [`exchange`] module for the timing rules.
//!
//! # Deterministic simulation
//!
//! [`SimEnv`] seeds every identity and timestamp. [`SimPeerServer`] runs the
//! real-network adapter over turmoil's simulated TCP.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation of the connection
//! lifecycle. Operations are applied to both the model and a simulated
//! network, and their observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod exchange;
mod messenger;
pub mod model;
pub mod sim_env;
pub mod sim_transport;

pub use error::{HarnessError, OperationError, OperationKind};
pub use exchange::{
    Disconnect, Exchange, ExchangeTestSession, Expect, PeerLookup, PeerLookupFn, Trigger,
};
pub use messenger::{CodecMessenger, ExpectError, TestMessenger};
pub use model::{LifecycleError, ModelNetwork, NodeIndex, Operation, OperationResult, SimWorld};
pub use sim_env::SimEnv;
pub use sim_transport::SimPeerServer;
