//! Node adapters and peer connection lifecycle.
//!
//! A node adapter gives a protocol a uniform way to reach its peers,
//! whether they live in the same process ([`SimNode`]) or across a real
//! network ([`Rlpx`]). The in-process variant is a full network simulator:
//!
//! ```text
//!            SimNetwork (directory + journal)
//!           ┌──────────┼──────────┐
//!           ▼          ▼          ▼
//!        SimNode    SimNode    SimNode
//!        registry   registry   registry
//!           │    msg_pipe   │
//!           └───────────────┘
//! ```
//!
//! Connecting two nodes creates one pipe, stores one half in each node's
//! [`PeerRegistry`], and launches each side's [`Protocol`] once both are
//! registered. A handler's exit tears the link down and delivers its result
//! through the peer's termination signal.
//!
//! # Environment
//!
//! Time and randomness come from an [`Environment`], so simulations driven
//! by a seeded implementation are reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod endpoint;
mod env;
mod error;
mod messenger;
mod network;
mod node;
mod peer;
mod rlpx;

pub use adapter::{
    Network, NodeAdapter, PeerInfo, Protocol, ProtocolFuture, Reporter, protocol,
};
pub use endpoint::{Endpoint, MsgPipeRw, MsgReadWriter, msg_pipe};
pub use env::{Environment, random_node_id, random_node_ids};
pub use error::{AdapterError, EndpointError, MessengerError, ProtocolError};
pub use messenger::{CborMessenger, Messenger};
pub use network::{NetworkEvent, NetworkEventKind, SimNetwork};
pub use node::SimNode;
pub use peer::{PeerHandle, PeerRegistry, Termination};
pub use rlpx::{PeerHook, PeerServer, Rlpx};
