//! Reference model for model-based testing.
//!
//! The model tracks which node pairs are linked as a plain set. It is the
//! oracle the simulated network is checked against.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Symmetry: A link is an unordered pair, whoever dialed
//! - Quiescence: The real side is compared only after its tasks settle

pub mod operation;
mod world;

pub use operation::{LifecycleError, NodeIndex, Operation, OperationResult};
pub use world::{ModelNetwork, SimWorld};
