//! Session controller: named simulated networks and the shutdown channel.
//!
//! Each session is a [`SimNetwork`] of ping nodes linked in a ring. The
//! controller owns the sending half of the shutdown channel; the run loop
//! that created it owns the receiving half and stops when
//! [`SessionController::destroy`] is called.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use simnet_core::{AdapterError, Environment, SimNetwork, random_node_ids};
use tokio::sync::mpsc;

use crate::{ControllerError, PingProtocol, SystemEnv};

/// Receiving half of the shutdown channel.
pub type ShutdownReceiver = mpsc::Receiver<()>;

/// Shape of a network to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Session id. A sequential `net-N` id is assigned when `None`.
    pub id: Option<String>,
    /// Number of nodes in the ring.
    pub nodes: usize,
    /// Pause between ping rounds on each link.
    pub ping_interval: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { id: None, nodes: 4, ping_interval: Duration::from_secs(1) }
    }
}

struct Session<E: Environment> {
    network: Arc<SimNetwork<E>>,
    rounds: Arc<AtomicU64>,
}

struct Sessions<E: Environment> {
    by_id: HashMap<String, Session<E>>,
    next_id: u64,
}

/// Creates, looks up and tears down simulated networks.
pub struct SessionController<E: Environment = SystemEnv> {
    env: E,
    sessions: Mutex<Sessions<E>>,
    shutdown: mpsc::Sender<()>,
}

impl<E: Environment> fmt::Debug for SessionController<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController").field("sessions", &self.ids()).finish()
    }
}

impl SessionController {
    /// Controller on the system environment.
    pub fn new() -> (Self, ShutdownReceiver) {
        Self::with_env(SystemEnv::new())
    }
}

impl<E: Environment> SessionController<E> {
    /// Controller drawing node identities and time from `env`.
    pub fn with_env(env: E) -> (Self, ShutdownReceiver) {
        let (shutdown, rx) = mpsc::channel(1);
        let sessions = Mutex::new(Sessions { by_id: HashMap::new(), next_id: 0 });
        (Self { env, sessions, shutdown }, rx)
    }

    fn lock(&self) -> MutexGuard<'_, Sessions<E>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a ring network and register it. Returns the session id.
    ///
    /// Must be called from within a tokio runtime: every link starts its
    /// protocol handlers immediately.
    pub fn create(&self, config: NetworkConfig) -> Result<String, ControllerError> {
        if config.nodes == 0 {
            return Err(ControllerError::InvalidConfig("network needs at least one node".into()));
        }
        if config.ping_interval.is_zero() {
            return Err(ControllerError::InvalidConfig("ping interval must be positive".into()));
        }

        let mut sessions = self.lock();
        let id = match config.id {
            Some(id) if sessions.by_id.contains_key(&id) => {
                return Err(ControllerError::AlreadyExists(id));
            },
            Some(id) => id,
            None => loop {
                sessions.next_id += 1;
                let id = format!("net-{}", sessions.next_id);
                if !sessions.by_id.contains_key(&id) {
                    break id;
                }
            },
        };

        let network = SimNetwork::new(self.env.clone());
        let rounds = Arc::new(AtomicU64::new(0));
        let ids = random_node_ids(&self.env, config.nodes);
        for node in &ids {
            let ping =
                PingProtocol::new(self.env.clone(), *node, config.ping_interval, Arc::clone(&rounds));
            network.add_node(*node, Some(ping.into_protocol()));
        }
        for (from, to) in ring_links(ids.len()) {
            if let Err(e) = network.connect(&ids[from], &ids[to]) {
                teardown(&network);
                return Err(e.into());
            }
        }

        tracing::info!("created network {} with {} nodes", id, ids.len());
        sessions.by_id.insert(id.clone(), Session { network, rounds });
        Ok(id)
    }

    /// Network registered under `id`.
    pub fn network(&self, id: &str) -> Result<Arc<SimNetwork<E>>, ControllerError> {
        self.lock()
            .by_id
            .get(id)
            .map(|s| Arc::clone(&s.network))
            .ok_or_else(|| ControllerError::NotFound(id.to_string()))
    }

    /// Ping rounds completed across all links of network `id`.
    pub fn ping_rounds(&self, id: &str) -> Result<u64, ControllerError> {
        self.lock()
            .by_id
            .get(id)
            .map(|s| s.rounds.load(Ordering::Relaxed))
            .ok_or_else(|| ControllerError::NotFound(id.to_string()))
    }

    /// Registered session ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().by_id.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop every link of network `id` and forget it.
    pub fn remove(&self, id: &str) -> Result<(), ControllerError> {
        let session =
            self.lock().by_id.remove(id).ok_or_else(|| ControllerError::NotFound(id.to_string()))?;
        teardown(&session.network);
        tracing::info!(
            "removed network {} after {} ping rounds",
            id,
            session.rounds.load(Ordering::Relaxed)
        );
        Ok(())
    }

    /// Remove every network.
    pub fn remove_all(&self) {
        let drained: Vec<(String, Session<E>)> = self.lock().by_id.drain().collect();
        for (id, session) in drained {
            teardown(&session.network);
            tracing::info!("removed network {}", id);
        }
    }

    /// Remove every network and ask the run loop to stop.
    pub fn destroy(&self) {
        self.remove_all();
        if self.shutdown.try_send(()).is_err() {
            tracing::debug!("shutdown already requested");
        }
    }
}

/// Links of a ring over `n` nodes as index pairs.
fn ring_links(n: usize) -> impl Iterator<Item = (usize, usize)> {
    let links = match n {
        0 | 1 => 0,
        2 => 1,
        n => n,
    };
    (0..links).map(move |i| (i, (i + 1) % n))
}

/// Disconnect both ends of every live link so handlers exit cleanly.
fn teardown<E: Environment>(network: &SimNetwork<E>) {
    for id in network.node_ids() {
        let Some(node) = network.node(&id) else {
            continue;
        };
        for peer in node.connected_peers() {
            match network.disconnect(&id, &peer) {
                Ok(()) | Err(AdapterError::AlreadyDisconnected { .. }) => {},
                Err(e) => tracing::warn!("teardown of {} -> {} failed: {}", id, peer, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_shapes() {
        assert_eq!(ring_links(1).count(), 0);
        assert_eq!(ring_links(2).collect::<Vec<_>>(), vec![(0, 1)]);
        assert_eq!(ring_links(3).collect::<Vec<_>>(), vec![(0, 1), (1, 2), (2, 0)]);
    }
}
