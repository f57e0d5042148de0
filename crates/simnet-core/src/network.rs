//! Simulated network directory.
//!
//! Owns every [`SimNode`], answers adapter lookups for them, and journals
//! connection events with environment timestamps.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Instant,
};

use simnet_proto::NodeId;

use crate::{AdapterError, Environment, Network, Protocol, Reporter, SimNode, random_node_id};

/// Kind of a journaled connection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkEventKind {
    /// A link was established.
    Connected,
    /// A link was dropped by one of its ends.
    Disconnected,
}

/// One entry of the connection journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    /// What happened.
    pub kind: NetworkEventKind,
    /// Node that reported the event.
    pub from: NodeId,
    /// Peer the event concerns.
    pub to: NodeId,
    /// Environment time of the report.
    pub at: Instant,
}

#[derive(Default)]
struct Directory {
    nodes: HashMap<NodeId, SimNode>,
    order: Vec<NodeId>,
    events: Vec<NetworkEvent>,
}

/// In-process network of simulated nodes.
pub struct SimNetwork<E: Environment> {
    env: E,
    directory: Mutex<Directory>,
}

impl<E: Environment> fmt::Debug for SimNetwork<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimNetwork").field("nodes", &self.lock().order.len()).finish()
    }
}

impl<E: Environment> SimNetwork<E> {
    /// Create an empty network.
    pub fn new(env: E) -> Arc<Self> {
        Arc::new(Self { env, directory: Mutex::new(Directory::default()) })
    }

    fn lock(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Environment driving this network.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Add a node running `protocol` on every link, or a passive node if
    /// `None`. Replaces any node with the same identity.
    pub fn add_node(self: &Arc<Self>, id: NodeId, protocol: Option<Protocol>) -> SimNode {
        let weak: Weak<Self> = Arc::downgrade(self);
        let network: Weak<dyn Network> = weak;
        let node = SimNode::new(id, network, protocol);

        let mut dir = self.lock();
        if dir.nodes.insert(id, node.clone()).is_none() {
            dir.order.push(id);
        }
        tracing::debug!("added node {}", id);
        node
    }

    /// Add a node with an identity drawn from the environment.
    pub fn add_random_node(self: &Arc<Self>, protocol: Option<Protocol>) -> SimNode {
        let id = random_node_id(&self.env);
        self.add_node(id, protocol)
    }

    /// Node with the given identity.
    pub fn node(&self, id: &NodeId) -> Option<SimNode> {
        self.lock().nodes.get(id).cloned()
    }

    /// Identities in the order nodes were added.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.lock().order.clone()
    }

    /// Link `from` to `to`.
    pub fn connect(&self, from: &NodeId, to: &NodeId) -> Result<(), AdapterError> {
        let node = self.node(from).ok_or(AdapterError::AdapterNotFound(*from))?;
        node.connect_peer(to)
    }

    /// Drop the link from `from` to `to`.
    pub fn disconnect(&self, from: &NodeId, to: &NodeId) -> Result<(), AdapterError> {
        let node = self.node(from).ok_or(AdapterError::AdapterNotFound(*from))?;
        node.disconnect_peer(to)
    }

    /// Connection journal in report order.
    pub fn events(&self) -> Vec<NetworkEvent> {
        self.lock().events.clone()
    }

    fn record(&self, kind: NetworkEventKind, from: &NodeId, to: &NodeId) {
        let at = self.env.now();
        self.lock().events.push(NetworkEvent { kind, from: *from, to: *to, at });
    }
}

impl<E: Environment> Reporter for SimNetwork<E> {
    fn did_connect(&self, from: &NodeId, to: &NodeId) {
        self.record(NetworkEventKind::Connected, from, to);
    }

    fn did_disconnect(&self, from: &NodeId, to: &NodeId) {
        self.record(NetworkEventKind::Disconnected, from, to);
    }
}

impl<E: Environment> Network for SimNetwork<E> {
    fn node_adapter(&self, id: &NodeId) -> Option<SimNode> {
        self.node(id)
    }
}
