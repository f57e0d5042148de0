//! Node adapter abstraction.
//!
//! A protocol is written once against [`Endpoint`]s and [`Messenger`]s and
//! runs unchanged over either adapter variant:
//!
//! - [`SimNode`](crate::SimNode): in-process links through a
//!   [`Network`] directory
//! - [`Rlpx`](crate::Rlpx): real connections through a
//!   [`PeerServer`](crate::PeerServer)

use std::{future::Future, pin::Pin, sync::Arc};

use async_trait::async_trait;
use simnet_proto::{Cap, NodeId};

use crate::{AdapterError, Endpoint, Messenger, ProtocolError, SimNode};

/// Capabilities shared by every node adapter.
#[async_trait]
pub trait NodeAdapter: Send + Sync {
    /// Codec used by protocols running on this adapter.
    type Messenger: Messenger;

    /// Address other nodes use to reach this one.
    fn local_addr(&self) -> Vec<u8>;

    /// Build a dialable address from a self-advertised one and the remote
    /// endpoint observed on the transport.
    fn parse_addr(&self, advertised: &[u8], observed: &str) -> Result<Vec<u8>, AdapterError>;

    /// Establish a link to `remote`.
    async fn connect(&self, remote: &[u8]) -> Result<(), AdapterError>;

    /// Tear down the link to `remote`.
    async fn disconnect(&self, remote: &[u8]) -> Result<(), AdapterError>;

    /// Codec for this adapter.
    fn messenger(&self) -> &Self::Messenger;
}

/// Receives connection lifecycle events.
pub trait Reporter: Send + Sync {
    /// `from` established a link to `to`.
    fn did_connect(&self, from: &NodeId, to: &NodeId);

    /// `from` dropped its link to `to`.
    fn did_disconnect(&self, from: &NodeId, to: &NodeId);
}

/// Directory of simulated nodes.
pub trait Network: Reporter {
    /// Look up the adapter of a simulated node.
    fn node_adapter(&self, id: &NodeId) -> Option<SimNode>;
}

/// Descriptor of the remote peer handed to a protocol handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Remote identity.
    pub id: NodeId,
    /// Human-readable name.
    pub name: String,
    /// Capabilities the peer advertised. Empty for simulated links.
    pub caps: Vec<Cap>,
}

impl PeerInfo {
    /// Descriptor with no capabilities.
    pub fn new(id: NodeId) -> Self {
        Self { id, name: id.name(), caps: Vec::new() }
    }
}

/// Future returned by a protocol handler.
pub type ProtocolFuture = Pin<Box<dyn Future<Output = Result<(), ProtocolError>> + Send>>;

/// Protocol handler launched once per established link.
///
/// Receives the remote peer's descriptor and the endpoint to talk to it
/// through. The handler owns the link until it returns; its result becomes
/// the link's termination signal.
pub type Protocol = Arc<dyn Fn(PeerInfo, Endpoint) -> ProtocolFuture + Send + Sync>;

/// Wrap an async function as a [`Protocol`].
pub fn protocol<F, Fut>(run: F) -> Protocol
where
    F: Fn(PeerInfo, Endpoint) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProtocolError>> + Send + 'static,
{
    Arc::new(move |peer, rw| Box::pin(run(peer, rw)))
}
