//! Wire vocabulary for the simnet overlay simulator.
//!
//! Everything two peers need to agree on before a protocol can run between
//! them: how nodes are named ([`NodeId`]), how a node is dialed
//! ([`NodeAddr`]), and how a message travels ([`Msg`]).
//!
//! # Message dispatch
//!
//! A protocol's messages form a closed sum type implementing [`MessageSet`].
//! Decoding is a static `code → variant` match, so there is no runtime type
//! introspection anywhere in the stack:
//!
//! ```text
//! Msg { code, payload: CBOR bytes }
//!            │
//!            ▼
//!   MessageSet::decode(code, payload)
//!            │
//!     ┌──────┴──────┐
//!     ▼             ▼
//!  Variant A     Variant B ...
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod msg;
mod node_addr;
mod node_id;
mod reason;

pub use error::ProtoError;
pub use msg::{Cap, MessageSet, Msg, decode_payload, encode_payload};
pub use node_addr::NodeAddr;
pub use node_id::{NODE_ID_LEN, NodeId};
pub use reason::DisconnectReason;
