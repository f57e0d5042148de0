//! Model network and its simulated counterpart.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use simnet_core::{AdapterError, NetworkEventKind, SimNetwork, random_node_ids};
use simnet_proto::NodeId;

use super::operation::{LifecycleError, NodeIndex, Operation, OperationResult};
use crate::SimEnv;

fn pair(a: NodeIndex, b: NodeIndex) -> (NodeIndex, NodeIndex) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Reference model: the set of linked pairs plus journal counters.
#[derive(Debug, Clone, Default)]
pub struct ModelNetwork {
    num_nodes: usize,
    links: BTreeSet<(NodeIndex, NodeIndex)>,
    connects: usize,
    disconnects: usize,
}

impl ModelNetwork {
    /// Model of `num_nodes` unlinked nodes.
    pub fn new(num_nodes: usize) -> Self {
        Self { num_nodes, ..Self::default() }
    }

    fn valid(&self, index: NodeIndex) -> bool {
        usize::from(index) < self.num_nodes
    }

    /// Apply an operation to the model.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match *op {
            Operation::Connect { from, to } => {
                if !self.valid(from) || !self.valid(to) {
                    return OperationResult::Error(LifecycleError::InvalidNode);
                }
                if from == to {
                    return OperationResult::Error(LifecycleError::SelfLink);
                }
                if !self.links.insert(pair(from, to)) {
                    return OperationResult::Error(LifecycleError::AlreadyConnected);
                }
                self.connects += 1;
                OperationResult::Ok
            },
            Operation::Disconnect { from, to } => {
                if !self.valid(from) || !self.valid(to) {
                    return OperationResult::Error(LifecycleError::InvalidNode);
                }
                if !self.links.remove(&pair(from, to)) {
                    return OperationResult::Error(LifecycleError::AlreadyDisconnected);
                }
                // Both ends report the drop once the link settles.
                self.disconnects += 2;
                OperationResult::Ok
            },
        }
    }

    /// Linked pairs, each as `(lower, higher)`.
    pub fn linked_pairs(&self) -> &BTreeSet<(NodeIndex, NodeIndex)> {
        &self.links
    }

    /// Journal entries the real network should hold: `(connected,
    /// disconnected)`.
    pub fn expected_events(&self) -> (usize, usize) {
        (self.connects, self.disconnects)
    }
}

/// Simulated network of passive nodes driven by model operations.
///
/// Run under a paused tokio clock: every operation waits for the network's
/// background tasks to go idle before returning.
pub struct SimWorld {
    network: Arc<SimNetwork<SimEnv>>,
    ids: Vec<NodeId>,
}

impl SimWorld {
    /// Network of `num_nodes` passive nodes with identities from `seed`.
    pub fn new(num_nodes: usize, seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let ids = random_node_ids(&env, num_nodes);
        let network = SimNetwork::new(env);
        for id in &ids {
            network.add_node(*id, None);
        }
        Self { network, ids }
    }

    /// Underlying network.
    pub fn network(&self) -> &Arc<SimNetwork<SimEnv>> {
        &self.network
    }

    /// Identity of the node at `index`.
    pub fn id(&self, index: NodeIndex) -> Option<NodeId> {
        self.ids.get(usize::from(index)).copied()
    }

    /// Apply an operation and let the network settle.
    pub async fn apply(&self, op: &Operation) -> OperationResult {
        let (from, to) = match *op {
            Operation::Connect { from, to } | Operation::Disconnect { from, to } => (from, to),
        };
        let (Some(from_id), Some(to_id)) = (self.id(from), self.id(to)) else {
            return OperationResult::Error(LifecycleError::InvalidNode);
        };

        let result = match op {
            Operation::Connect { .. } => self.network.connect(&from_id, &to_id),
            Operation::Disconnect { .. } => self.network.disconnect(&from_id, &to_id),
        };
        settle().await;

        match result {
            Ok(()) => OperationResult::Ok,
            Err(AdapterError::ProtocolLaunch { .. }) if from == to => {
                OperationResult::Error(LifecycleError::SelfLink)
            },
            Err(AdapterError::ProtocolLaunch { source, .. })
                if matches!(*source, AdapterError::AlreadyConnected { .. }) =>
            {
                OperationResult::Error(LifecycleError::AlreadyConnected)
            },
            Err(AdapterError::AlreadyDisconnected { .. }) => {
                OperationResult::Error(LifecycleError::AlreadyDisconnected)
            },
            Err(e) => {
                tracing::warn!("unexpected adapter error: {}", e);
                OperationResult::Error(LifecycleError::InvalidNode)
            },
        }
    }

    /// Linked pairs as seen by the node registries.
    pub fn linked_pairs(&self) -> BTreeSet<(NodeIndex, NodeIndex)> {
        let mut links = BTreeSet::new();
        for (i, id) in self.ids.iter().enumerate() {
            let Some(node) = self.network.node(id) else { continue };
            for peer in node.connected_peers() {
                let j = self.ids.iter().position(|candidate| *candidate == peer);
                if let (Ok(i), Some(Ok(j))) = (NodeIndex::try_from(i), j.map(NodeIndex::try_from))
                {
                    links.insert(pair(i, j));
                }
            }
        }
        links
    }

    /// Journal counts: `(connected, disconnected)`.
    pub fn events(&self) -> (usize, usize) {
        let events = self.network.events();
        let connected = events.iter().filter(|e| e.kind == NetworkEventKind::Connected).count();
        (connected, events.len() - connected)
    }
}

/// Wait until every background task is parked.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
