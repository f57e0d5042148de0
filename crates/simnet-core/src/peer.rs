//! Per-node peer registry.
//!
//! ## Design
//!
//! - Entries are created lazily and never removed: a reconnect reuses the
//!   slot, so the termination queue survives across link periods
//! - Only the endpoint cycles `None → Some → None`
//! - One mutex per node, held for bookkeeping only

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use simnet_proto::NodeId;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};

use crate::{AdapterError, Endpoint, ProtocolError};

/// Outcome of a protocol handler: `None` for a clean exit.
pub type Termination = Option<ProtocolError>;

/// Connection state for one remote peer, owned by one local node.
///
/// Cloning is cheap; clones share the termination queue and readiness
/// signal but hold a snapshot of the endpoint.
///
/// The termination queue holds one delivery and outlives link periods. A
/// delivery nobody read is discarded when the next link registers, unless a
/// reader is waiting on the queue at that moment.
#[derive(Clone)]
pub struct PeerHandle {
    endpoint: Option<Endpoint>,
    termination_tx: mpsc::Sender<Termination>,
    termination_rx: Arc<AsyncMutex<mpsc::Receiver<Termination>>>,
    ready: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerHandle")
            .field("connected", &self.is_connected())
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl PeerHandle {
    fn new(endpoint: Option<Endpoint>) -> Self {
        let (termination_tx, termination_rx) = mpsc::channel(1);
        let (ready, _) = watch::channel(false);
        Self {
            endpoint,
            termination_tx,
            termination_rx: Arc::new(AsyncMutex::new(termination_rx)),
            ready: Arc::new(ready),
        }
    }

    /// Endpoint to the peer, if connected.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Whether this snapshot holds a live endpoint.
    pub fn is_connected(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Whether the local protocol handler has started for this peer.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolves once the local protocol handler has started.
    pub async fn wait_ready(&self) {
        let mut ready = self.ready.subscribe();
        let _ = ready.wait_for(|r| *r).await;
    }

    /// Wait for the next termination delivery.
    pub async fn recv_termination(&self) -> Termination {
        let mut rx = self.termination_rx.lock().await;
        // The sender lives in every clone of this handle, so the queue never
        // closes while we hold one.
        rx.recv().await.flatten()
    }

    /// Take a pending termination delivery without waiting.
    pub fn try_recv_termination(&self) -> Option<Termination> {
        let mut rx = self.termination_rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    fn discard_stale_termination(&self) {
        if let Some(stale) = self.try_recv_termination() {
            tracing::debug!("discarding unread termination {:?}", stale);
        }
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    pub(crate) async fn deliver_termination(&self, termination: Termination) {
        if self.termination_tx.send(termination).await.is_err() {
            tracing::warn!("termination queue closed, dropping delivery");
        }
    }
}

#[derive(Default)]
struct Slots {
    peers: Vec<PeerHandle>,
    index: HashMap<NodeId, usize>,
}

/// Insertion-ordered table of peer handles keyed by remote identity.
#[derive(Default)]
pub struct PeerRegistry {
    slots: Mutex<Slots>,
}

impl PeerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the handle for `id`.
    pub fn get(&self, id: &NodeId) -> Option<PeerHandle> {
        let slots = self.lock();
        slots.index.get(id).map(|&i| slots.peers[i].clone())
    }

    /// Identities in first-seen order.
    pub fn ids(&self) -> Vec<NodeId> {
        let slots = self.lock();
        let mut ids: Vec<_> = slots.index.iter().map(|(id, &i)| (i, *id)).collect();
        ids.sort_unstable_by_key(|(i, _)| *i);
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of known peers, connected or not.
    pub fn len(&self) -> usize {
        self.lock().peers.len()
    }

    /// Whether no peer was ever seen.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Install `endpoint` for `id`, creating the slot if needed.
    ///
    /// # Panics
    ///
    /// Setting a live endpoint over another live endpoint means the
    /// simulated network lost track of a link. That is a logic bug, not a
    /// transient condition.
    #[allow(clippy::panic)]
    pub fn set(&self, id: NodeId, endpoint: Option<Endpoint>) -> PeerHandle {
        let mut slots = self.lock();
        if let Some(&i) = slots.index.get(&id) {
            let slot = &mut slots.peers[i];
            if slot.endpoint.is_some() && endpoint.is_some() {
                drop(slots);
                panic!("pipe for {id} already set");
            }
            slot.endpoint = endpoint;
            return slot.clone();
        }
        let handle = PeerHandle::new(endpoint);
        let i = slots.peers.len();
        slots.index.insert(id, i);
        slots.peers.push(handle.clone());
        handle
    }

    /// Install `endpoint` unless the slot already holds a live one.
    pub(crate) fn register(
        &self,
        local: NodeId,
        id: NodeId,
        endpoint: Endpoint,
    ) -> Result<PeerHandle, AdapterError> {
        let mut slots = self.lock();
        if let Some(&i) = slots.index.get(&id) {
            let slot = &mut slots.peers[i];
            if slot.endpoint.is_some() {
                return Err(AdapterError::AlreadyConnected { local, remote: id });
            }
            slot.discard_stale_termination();
            slot.endpoint = Some(endpoint);
            return Ok(slot.clone());
        }
        let handle = PeerHandle::new(Some(endpoint));
        let i = slots.peers.len();
        slots.index.insert(id, i);
        slots.peers.push(handle.clone());
        Ok(handle)
    }

    /// Null the endpoint for `id` and return it. `None` if absent or
    /// already null.
    pub(crate) fn take_endpoint(&self, id: &NodeId) -> Option<Endpoint> {
        let mut slots = self.lock();
        let i = *slots.index.get(id)?;
        let slot = &mut slots.peers[i];
        let endpoint = slot.endpoint.take()?;
        slot.ready.send_replace(false);
        Some(endpoint)
    }

    /// Null the endpoint for `id` only if it is still `endpoint`.
    pub(crate) fn take_endpoint_if(&self, id: &NodeId, endpoint: &Endpoint) -> Option<Endpoint> {
        let mut slots = self.lock();
        let i = *slots.index.get(id)?;
        let slot = &mut slots.peers[i];
        if !slot.endpoint.as_ref().is_some_and(|current| Arc::ptr_eq(current, endpoint)) {
            return None;
        }
        slot.ready.send_replace(false);
        slot.endpoint.take()
    }
}
