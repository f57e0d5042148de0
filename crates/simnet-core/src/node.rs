//! In-process node adapter.
//!
//! A [`SimNode`] links to other simulated nodes through in-memory pipes.
//! Each link is two registry entries, one per node, holding opposite halves
//! of the same pipe:
//!
//! ```text
//!   A.registry[B] = B_end ─┐          ┌─ A_end = B.registry[A]
//!                          └── pipe ──┘
//!   A's protocol (peer B) reads/writes A_end
//!   B's protocol (peer A) reads/writes B_end
//! ```
//!
//! The half stored under `A.registry[B]` is the one B's protocol drives, so
//! writing on it is "speaking as B" towards A's protocol. Test sessions rely
//! on this to impersonate peers.
//!
//! # Invariants
//!
//! - A node never holds two live endpoints for the same peer
//! - Protocol handlers start only after both sides registered the link
//! - Exactly one termination is delivered per handler run; explicit
//!   disconnects never deliver one
//! - A handler exiting late releases only its own link, never a newer one

use std::{
    fmt,
    sync::{Arc, Weak},
};

use async_trait::async_trait;
use simnet_proto::NodeId;
use tokio::sync::watch;

use crate::{
    AdapterError, CborMessenger, Endpoint, Network, NodeAdapter, PeerHandle, PeerInfo,
    PeerRegistry, Protocol, msg_pipe,
};

struct NodeInner {
    id: NodeId,
    network: Weak<dyn Network>,
    messenger: CborMessenger,
    registry: PeerRegistry,
    protocol: Option<Protocol>,
}

/// Simulated node. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SimNode {
    inner: Arc<NodeInner>,
}

impl fmt::Debug for SimNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimNode")
            .field("id", &self.inner.id)
            .field("peers", &self.inner.registry.len())
            .field("passive", &self.inner.protocol.is_none())
            .finish()
    }
}

impl SimNode {
    /// Create a node that resolves peers through `network`.
    ///
    /// A node without a protocol is passive: it accepts links but nothing
    /// reads or writes its side of them.
    pub fn new(id: NodeId, network: Weak<dyn Network>, protocol: Option<Protocol>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id,
                network,
                messenger: CborMessenger,
                registry: PeerRegistry::new(),
                protocol,
            }),
        }
    }

    /// This node's identity.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Whether no protocol runs on this node.
    pub fn is_passive(&self) -> bool {
        self.inner.protocol.is_none()
    }

    /// Snapshot of the registry entry for `id`.
    pub fn get_peer(&self, id: &NodeId) -> Option<PeerHandle> {
        self.inner.registry.get(id)
    }

    /// Install an endpoint for `id` directly, bypassing connect.
    ///
    /// # Panics
    ///
    /// If a live endpoint is already installed and `endpoint` is live too.
    pub fn set_peer(&self, id: NodeId, endpoint: Option<Endpoint>) -> PeerHandle {
        self.inner.registry.set(id, endpoint)
    }

    /// Every peer this node ever linked to, in first-seen order.
    pub fn peer_ids(&self) -> Vec<NodeId> {
        self.inner.registry.ids()
    }

    /// Peers with a live endpoint.
    pub fn connected_peers(&self) -> Vec<NodeId> {
        self.peer_ids()
            .into_iter()
            .filter(|id| self.get_peer(id).is_some_and(|p| p.is_connected()))
            .collect()
    }

    fn network(&self) -> Result<Arc<dyn Network>, AdapterError> {
        self.inner.network.upgrade().ok_or(AdapterError::NetworkGone)
    }

    /// Link this node to `remote` and start protocols on both sides.
    ///
    /// Both sides register before either handler runs. If the local side
    /// cannot register, the remote registration is rolled back so the
    /// network is left as it was.
    pub fn connect_peer(&self, remote: &NodeId) -> Result<(), AdapterError> {
        let network = self.network()?;
        let remote_node =
            network.node_adapter(remote).ok_or(AdapterError::AdapterNotFound(*remote))?;

        let (local_end, remote_end) = msg_pipe();
        let local_end: Endpoint = local_end;
        let remote_end: Endpoint = remote_end;
        let (gate, gate_rx) = watch::channel(false);

        remote_node
            .run_protocol(self.id(), Arc::clone(&remote_end), Arc::clone(&local_end), gate_rx.clone())
            .map_err(|e| AdapterError::ProtocolLaunch {
                from: self.id(),
                to: *remote,
                source: Box::new(e),
            })?;

        if let Err(e) =
            self.run_protocol(*remote, Arc::clone(&local_end), Arc::clone(&remote_end), gate_rx)
        {
            if let Some(endpoint) = remote_node.inner.registry.take_endpoint_if(&self.id(), &local_end)
            {
                endpoint.close();
            }
            // Dropping the gate releases the remote task without a termination.
            drop(gate);
            return Err(AdapterError::ProtocolLaunch {
                from: *remote,
                to: self.id(),
                source: Box::new(e),
            });
        }

        gate.send_replace(true);
        tracing::debug!("connected {} to {}", self.id(), remote);
        network.did_connect(&self.id(), remote);
        Ok(())
    }

    /// Drop the link to `remote`.
    ///
    /// Closes the pipe, which makes both protocol handlers see a closed
    /// endpoint. Termination is delivered by the handlers when they exit,
    /// never from here.
    pub fn disconnect_peer(&self, remote: &NodeId) -> Result<(), AdapterError> {
        let endpoint = self
            .inner
            .registry
            .take_endpoint(remote)
            .ok_or(AdapterError::AlreadyDisconnected { local: self.id(), remote: *remote })?;
        endpoint.close();
        tracing::debug!("dropped peer {} from {}", remote, self.id());

        let network = self.network()?;
        network.did_disconnect(&self.id(), remote);
        Ok(())
    }

    /// Drop the link to `remote` if the slot still holds `endpoint`.
    fn release_link(&self, remote: &NodeId, endpoint: &Endpoint) -> Result<(), AdapterError> {
        let Some(endpoint) = self.inner.registry.take_endpoint_if(remote, endpoint) else {
            return Ok(());
        };
        endpoint.close();
        tracing::debug!("released peer {} from {}", remote, self.id());

        let network = self.network()?;
        network.did_disconnect(&self.id(), remote);
        Ok(())
    }

    /// Register `peer_end` under `peer` and spawn the handler on
    /// `proto_end`. The handler waits for `gate` to open.
    fn run_protocol(
        &self,
        peer: NodeId,
        proto_end: Endpoint,
        peer_end: Endpoint,
        mut gate: watch::Receiver<bool>,
    ) -> Result<(), AdapterError> {
        let handle = self.inner.registry.register(self.id(), peer, Arc::clone(&peer_end))?;
        let node = self.clone();

        tokio::spawn(async move {
            if gate.wait_for(|open| *open).await.is_err() {
                tracing::debug!("link {} -> {} aborted before start", node.id(), peer);
                return;
            }
            handle.mark_ready();

            let result = match &node.inner.protocol {
                Some(protocol) => {
                    tracing::debug!("protocol starting on {} with peer {}", node.id(), peer);
                    protocol(PeerInfo::new(peer), proto_end).await
                },
                None => {
                    proto_end.closed().await;
                    Ok(())
                },
            };
            tracing::debug!("protocol quit on {} (link with {} broken)", node.id(), peer);

            // Only this period's link; the pair may have reconnected since.
            if let Err(e) = node.release_link(&peer, &peer_end) {
                tracing::warn!("cleanup after protocol exit failed: {}", e);
            }
            handle.deliver_termination(result.err()).await;
        });

        Ok(())
    }
}

#[async_trait]
impl NodeAdapter for SimNode {
    type Messenger = CborMessenger;

    fn local_addr(&self) -> Vec<u8> {
        self.id().as_bytes().to_vec()
    }

    fn parse_addr(&self, advertised: &[u8], _observed: &str) -> Result<Vec<u8>, AdapterError> {
        Ok(advertised.to_vec())
    }

    async fn connect(&self, remote: &[u8]) -> Result<(), AdapterError> {
        self.connect_peer(&NodeId::from_slice(remote)?)
    }

    async fn disconnect(&self, remote: &[u8]) -> Result<(), AdapterError> {
        self.disconnect_peer(&NodeId::from_slice(remote)?)
    }

    fn messenger(&self) -> &CborMessenger {
        &self.inner.messenger
    }
}
