//! Exchange-driven protocol tests.
//!
//! A test scenario is a sequence of [`Exchange`]s. Each exchange launches its
//! triggers (messages written on behalf of a peer) and expects (messages
//! that must arrive at a peer) concurrently, then waits for all of them:
//!
//! ```text
//!   exchange i
//!   ├── trigger task ──┐
//!   ├── trigger task ──┤ errors
//!   ├── expect task ───┼────────▶ queue ──▶ driver (1000 ms budget)
//!   └── expect task ───┘
//! ```
//!
//! The first error fails the exchange. If the queue drains without errors
//! the exchange passes. Exchanges run strictly in order and a failure stops
//! the run. Tasks still in flight when an exchange resolves are cancelled.
//!
//! Peers are resolved through a [`PeerLookup`], usually the [`SimNode`]
//! whose registry holds the peer halves. Writing on a registry half speaks
//! as that peer, so a trigger towards `B` looked up through node `A` is a
//! message from `B` to `A`'s protocol.

use std::{sync::Arc, time::Duration};

use simnet_core::{Endpoint, PeerHandle, SimNode};
use simnet_proto::{MessageSet, NodeId};
use tokio::{
    sync::mpsc,
    task::{JoinError, JoinSet},
    time::Instant,
};

use crate::{ExpectError, HarnessError, OperationError, OperationKind, TestMessenger};

/// Timeout applied to a trigger or expect that does not set its own.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(1000);

/// Budget for a whole exchange to settle.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Budget for peers to come up in [`ExchangeTestSession::test_connected`].
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Budget per peer in [`ExchangeTestSession::test_disconnected`].
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Poll period while waiting for a peer entry to appear.
pub const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolves peer identities to registry entries.
pub trait PeerLookup: Send + Sync + 'static {
    /// Registry entry for `id`.
    fn get_peer(&self, id: &NodeId) -> Option<PeerHandle>;
}

impl PeerLookup for SimNode {
    fn get_peer(&self, id: &NodeId) -> Option<PeerHandle> {
        Self::get_peer(self, id)
    }
}

/// [`PeerLookup`] from a closure, for sessions that span several nodes.
pub struct PeerLookupFn<F>(pub F);

impl<F> PeerLookup for PeerLookupFn<F>
where
    F: Fn(&NodeId) -> Option<PeerHandle> + Send + Sync + 'static,
{
    fn get_peer(&self, id: &NodeId) -> Option<PeerHandle> {
        (self.0)(id)
    }
}

/// Outbound message written on behalf of a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger<M> {
    /// Message to send.
    pub msg: M,
    /// Code to send it under.
    pub code: u64,
    /// Peer whose registry half is written.
    pub peer: NodeId,
    /// Send timeout. Zero means [`DEFAULT_OPERATION_TIMEOUT`].
    pub timeout: Duration,
}

impl<M: MessageSet> Trigger<M> {
    /// Trigger sending `msg` under its own code.
    pub fn new(peer: NodeId, msg: M) -> Self {
        Self { code: msg.code(), msg, peer, timeout: Duration::ZERO }
    }
}

impl<M> Trigger<M> {
    /// Send under an explicit code.
    #[must_use]
    pub fn with_code(mut self, code: u64) -> Self {
        self.code = code;
        self
    }

    /// Override the send timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn effective_timeout(&self) -> Duration {
        effective(self.timeout)
    }
}

/// Inbound message that must arrive on a peer's registry half.
#[derive(Debug, Clone, PartialEq)]
pub struct Expect<M> {
    /// Message that must arrive.
    pub msg: M,
    /// Code it must arrive under.
    pub code: u64,
    /// Peer whose registry half is read.
    pub peer: NodeId,
    /// Receive timeout. Zero means [`DEFAULT_OPERATION_TIMEOUT`].
    pub timeout: Duration,
}

impl<M: MessageSet> Expect<M> {
    /// Expect `msg` under its own code.
    pub fn new(peer: NodeId, msg: M) -> Self {
        Self { code: msg.code(), msg, peer, timeout: Duration::ZERO }
    }
}

impl<M> Expect<M> {
    /// Expect an explicit code.
    #[must_use]
    pub fn with_code(mut self, code: u64) -> Self {
        self.code = code;
        self
    }

    /// Override the receive timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn effective_timeout(&self) -> Duration {
        effective(self.timeout)
    }
}

fn effective(timeout: Duration) -> Duration {
    if timeout.is_zero() { DEFAULT_OPERATION_TIMEOUT } else { timeout }
}

/// One test step: triggers and expects resolved together.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange<M> {
    /// Messages to send.
    pub triggers: Vec<Trigger<M>>,
    /// Messages that must arrive. Conjunctive and unordered.
    pub expects: Vec<Expect<M>>,
}

impl<M> Default for Exchange<M> {
    fn default() -> Self {
        Self { triggers: Vec::new(), expects: Vec::new() }
    }
}

impl<M: MessageSet> Exchange<M> {
    /// Exchange with the given operations.
    pub fn new(triggers: Vec<Trigger<M>>, expects: Vec<Expect<M>>) -> Self {
        Self { triggers, expects }
    }

    /// Exchange that only sends `msg` under `code` to each of `peers`.
    ///
    /// Useful to drain protocol start-up traffic before the real scenario.
    pub fn flush(code: u64, msg: &M, peers: &[NodeId]) -> Self {
        let triggers = peers
            .iter()
            .map(|&peer| Trigger::new(peer, msg.clone()).with_code(code))
            .collect();
        Self { triggers, expects: Vec::new() }
    }
}

/// Expected termination of a peer link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// Peer whose termination signal is awaited.
    pub peer: NodeId,
    /// Expected handler error, compared by display string. `None` for a
    /// clean exit.
    pub error: Option<String>,
}

impl Disconnect {
    /// Expect a clean exit.
    pub fn clean(peer: NodeId) -> Self {
        Self { peer, error: None }
    }

    /// Expect exit with an error displaying as `error`.
    pub fn with_error(peer: NodeId, error: impl ToString) -> Self {
        Self { peer, error: Some(error.to_string()) }
    }
}

/// Drives exchanges and connection assertions against a set of peers.
pub struct ExchangeTestSession<N, T> {
    ids: Vec<NodeId>,
    lookup: Arc<N>,
    messenger: Arc<T>,
}

impl<N: PeerLookup, T: TestMessenger> ExchangeTestSession<N, T> {
    /// Session resolving peers through `lookup`.
    pub fn new(lookup: N, messenger: T, ids: Vec<NodeId>) -> Self {
        Self { ids, lookup: Arc::new(lookup), messenger: Arc::new(messenger) }
    }

    /// Peers this session was created for.
    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    /// Peer lookup in use.
    pub fn lookup(&self) -> &N {
        &self.lookup
    }

    /// Run `exchanges` in order, stopping at the first failure.
    pub async fn test_exchanges<M: MessageSet>(
        &self,
        exchanges: &[Exchange<M>],
    ) -> Result<(), HarnessError> {
        for (index, exchange) in exchanges.iter().enumerate() {
            self.run_exchange(index, exchange).await?;
            tracing::debug!("exchange {} run successfully", index);
        }
        Ok(())
    }

    async fn run_exchange<M: MessageSet>(
        &self,
        index: usize,
        exchange: &Exchange<M>,
    ) -> Result<(), HarnessError> {
        let ops = exchange.triggers.len() + exchange.expects.len();
        let (errors, mut errors_rx) = mpsc::channel(ops.max(1));
        let mut tasks = JoinSet::new();

        for trigger in &exchange.triggers {
            let (lookup, messenger, errors) =
                (Arc::clone(&self.lookup), Arc::clone(&self.messenger), errors.clone());
            let trigger = trigger.clone();
            tasks.spawn(async move {
                if let Err(e) = run_trigger(&*lookup, &*messenger, &trigger).await {
                    let _ = errors.send(e).await;
                }
            });
        }

        for expect in &exchange.expects {
            let (lookup, messenger, errors) =
                (Arc::clone(&self.lookup), Arc::clone(&self.messenger), errors.clone());
            let expect = expect.clone();
            tasks.spawn(async move {
                if let Err(e) = run_expect(&*lookup, &*messenger, &expect).await {
                    tracing::debug!("expect failed: {}", e);
                    let _ = errors.send(e).await;
                }
            });
        }

        // The queue closes once every task has dropped its sender.
        drop(errors);

        match tokio::time::timeout(EXCHANGE_TIMEOUT, errors_rx.recv()).await {
            Ok(None) => Ok(()),
            Ok(Some(source)) => Err(HarnessError::ExchangeFailed { index, source }),
            Err(_) => Err(HarnessError::ExchangeTimedOut { index }),
        }
    }

    /// Wait until every peer in `peers` is up.
    ///
    /// Without `flush` a peer is up once its entry holds an endpoint. With
    /// `flush` the local protocol handler must also have started. All peers
    /// share one [`CONNECT_TIMEOUT`] deadline.
    pub async fn test_connected(&self, flush: bool, peers: &[NodeId]) -> Result<(), HarnessError> {
        let deadline = Instant::now() + CONNECT_TIMEOUT;
        let mut tasks = JoinSet::new();
        for &peer in peers {
            let lookup = Arc::clone(&self.lookup);
            tasks.spawn(async move { wait_connected(&*lookup, peer, flush, deadline).await });
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(task_failed)??;
        }
        tracing::debug!("checking complete");
        Ok(())
    }

    /// Check, in order, that each peer's link terminated as expected.
    pub async fn test_disconnected(&self, disconnects: &[Disconnect]) -> Result<(), HarnessError> {
        for Disconnect { peer, error: wanted } in disconnects {
            let handle = self.lookup.get_peer(peer).ok_or(HarnessError::UnknownPeer(*peer))?;
            let got = tokio::time::timeout(DISCONNECT_TIMEOUT, handle.recv_termination())
                .await
                .map_err(|_| HarnessError::DisconnectTimeout { peer: *peer })?
                .map(|e| e.to_string());

            if &got != wanted {
                return Err(HarnessError::DisconnectMismatch {
                    peer: *peer,
                    got,
                    wanted: wanted.clone(),
                });
            }
        }
        Ok(())
    }
}

fn task_failed(e: JoinError) -> HarnessError {
    HarnessError::TaskFailed(e.to_string())
}

fn resolve(lookup: &impl PeerLookup, peer: NodeId) -> Result<Endpoint, OperationError> {
    let handle = lookup.get_peer(&peer).ok_or(OperationError::UnknownPeer(peer))?;
    handle.endpoint().cloned().ok_or(OperationError::PeerUnreachable(peer))
}

async fn run_trigger<M: MessageSet>(
    lookup: &impl PeerLookup,
    messenger: &impl TestMessenger,
    trigger: &Trigger<M>,
) -> Result<(), OperationError> {
    let rw = resolve(lookup, trigger.peer)?;
    let after = trigger.effective_timeout();

    match tokio::time::timeout(after, messenger.trigger_msg(&*rw, trigger.code, &trigger.msg)).await
    {
        Ok(sent) => sent.map_err(|source| OperationError::Send { peer: trigger.peer, source }),
        Err(_) => Err(OperationError::Timeout {
            kind: OperationKind::Trigger,
            peer: trigger.peer,
            code: trigger.code,
            after,
        }),
    }
}

async fn run_expect<M: MessageSet>(
    lookup: &impl PeerLookup,
    messenger: &impl TestMessenger,
    expect: &Expect<M>,
) -> Result<(), OperationError> {
    let rw = resolve(lookup, expect.peer)?;
    let after = expect.effective_timeout();

    match tokio::time::timeout(after, messenger.expect_msg(&*rw, expect.code, &expect.msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(ExpectError::Messenger(source))) => {
            Err(OperationError::Receive { peer: expect.peer, source })
        },
        Ok(Err(ExpectError::Mismatch { expected_code, got_code, detail })) => {
            Err(OperationError::UnexpectedMessage {
                peer: expect.peer,
                expected_code,
                got_code,
                detail,
            })
        },
        Err(_) => Err(OperationError::Timeout {
            kind: OperationKind::Expect,
            peer: expect.peer,
            code: expect.code,
            after,
        }),
    }
}

async fn wait_connected(
    lookup: &impl PeerLookup,
    peer: NodeId,
    flush: bool,
    deadline: Instant,
) -> Result<(), HarnessError> {
    loop {
        if let Some(handle) = lookup.get_peer(&peer) {
            if !flush && handle.is_connected() {
                tracing::debug!("peer {} is connected", peer);
                return Ok(());
            }
            tokio::select! {
                biased;
                () = tokio::time::sleep_until(deadline) => {
                    return Err(HarnessError::ConnectTimeout { peer });
                },
                termination = handle.recv_termination() => {
                    return Err(HarnessError::PeerDisconnected {
                        peer,
                        error: termination.map(|e| e.to_string()),
                    });
                },
                () = handle.wait_ready(), if flush => {
                    tracing::debug!("peer {} is connected", peer);
                    return Ok(());
                },
                () = tokio::time::sleep(CONNECT_POLL_INTERVAL) => {},
            }
        } else {
            tokio::select! {
                biased;
                () = tokio::time::sleep_until(deadline) => {
                    return Err(HarnessError::ConnectTimeout { peer });
                },
                () = tokio::time::sleep(CONNECT_POLL_INTERVAL) => {
                    tracing::debug!("waiting for {} to connect", peer);
                },
            }
        }
    }
}
