//! Exchange harness tests.
//!
//! All tests run on a paused clock, so timeouts elapse instantly once every
//! task is parked.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use simnet_core::{
    Endpoint, PeerHandle, PeerInfo, Protocol, ProtocolError, SimNetwork, SimNode, msg_pipe,
    protocol,
};
use simnet_harness::{
    CodecMessenger, Disconnect, Exchange, ExchangeTestSession, Expect, HarnessError,
    OperationError, OperationKind, PeerLookupFn, SimEnv, Trigger,
};
use simnet_proto::{MessageSet, NodeId, ProtoError, decode_payload, encode_payload};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Status {
    height: u64,
}

#[derive(Debug, Clone, PartialEq)]
enum TestMsg {
    Text(String),
    Status(Status),
}

impl MessageSet for TestMsg {
    fn code(&self) -> u64 {
        match self {
            Self::Text(_) => 1,
            Self::Status(_) => 2,
        }
    }

    fn encode(&self) -> Result<Bytes, ProtoError> {
        match self {
            Self::Text(t) => encode_payload(t),
            Self::Status(s) => encode_payload(s),
        }
    }

    fn decode(code: u64, payload: &[u8]) -> Result<Self, ProtoError> {
        match code {
            1 => decode_payload(code, payload).map(Self::Text),
            2 => decode_payload(code, payload).map(Self::Status),
            _ => Err(ProtoError::UnknownCode { code }),
        }
    }
}

fn text(s: &str) -> TestMsg {
    TestMsg::Text(s.to_string())
}

async fn echo_loop(_peer: PeerInfo, rw: Endpoint) -> Result<(), ProtocolError> {
    loop {
        let msg = rw.read_msg().await?;
        rw.write_msg(msg).await?;
    }
}

async fn sink_loop(_peer: PeerInfo, rw: Endpoint) -> Result<(), ProtocolError> {
    loop {
        rw.read_msg().await?;
    }
}

async fn reject(_peer: PeerInfo, _rw: Endpoint) -> Result<(), ProtocolError> {
    Err(ProtocolError::other("bad handshake"))
}

/// Network with a hub running `hub_protocol` linked to `spokes` passive
/// nodes.
fn star(hub_protocol: Protocol, spokes: usize) -> (Arc<SimNetwork<SimEnv>>, SimNode, Vec<NodeId>) {
    let network = SimNetwork::new(SimEnv::with_seed(42));
    let hub = network.add_random_node(Some(hub_protocol));
    let ids: Vec<_> = (0..spokes).map(|_| network.add_random_node(None).id()).collect();
    for id in &ids {
        network.connect(id, &hub.id()).unwrap();
    }
    (network, hub, ids)
}

/// Lookup that resolves each peer through a chosen node's registry.
fn routes(
    entries: Vec<(NodeId, SimNode)>,
) -> PeerLookupFn<impl Fn(&NodeId) -> Option<PeerHandle> + Send + Sync + 'static> {
    let map: HashMap<NodeId, SimNode> = entries.into_iter().collect();
    PeerLookupFn(move |id: &NodeId| map.get(id).and_then(|node| node.get_peer(id)))
}

fn round_trip(peer: NodeId, msg: TestMsg) -> Exchange<TestMsg> {
    Exchange::new(vec![Trigger::new(peer, msg.clone())], vec![Expect::new(peer, msg)])
}

#[tokio::test(start_paused = true)]
async fn echo_round_trip_passes() {
    let (_network, hub, ids) = star(protocol(echo_loop), 2);
    let session = ExchangeTestSession::new(hub, CodecMessenger::cbor(), ids.clone());

    session.test_connected(true, &ids).await.unwrap();
    session
        .test_exchanges(&[
            round_trip(ids[0], text("ping")),
            round_trip(ids[1], TestMsg::Status(Status { height: 9 })),
        ])
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn wrong_code_is_unexpected() {
    let (_network, hub, ids) = star(protocol(echo_loop), 1);
    let session = ExchangeTestSession::new(hub, CodecMessenger::cbor(), ids.clone());

    let exchange = Exchange::new(
        vec![Trigger::new(ids[0], text("ping"))],
        vec![Expect::new(ids[0], text("ping")).with_code(2)],
    );
    let err = session.test_exchanges(&[exchange]).await.unwrap_err();

    let HarnessError::ExchangeFailed { index: 0, source } = err else {
        panic!("expected exchange failure");
    };
    assert!(matches!(
        source,
        OperationError::UnexpectedMessage { expected_code: 2, got_code: 1, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn wrong_value_is_unexpected() {
    let (_network, hub, ids) = star(protocol(echo_loop), 1);
    let session = ExchangeTestSession::new(hub, CodecMessenger::cbor(), ids.clone());

    let exchange = Exchange::new(
        vec![Trigger::new(ids[0], text("ping"))],
        vec![Expect::new(ids[0], text("pong"))],
    );
    let err = session.test_exchanges(&[exchange]).await.unwrap_err();

    assert!(matches!(
        err,
        HarnessError::ExchangeFailed {
            index: 0,
            source: OperationError::UnexpectedMessage { expected_code: 1, got_code: 1, .. }
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn trigger_timeout_does_not_block_later_exchanges() {
    let network = SimNetwork::new(SimEnv::with_seed(1));
    let hub = network.add_random_node(Some(protocol(echo_loop)));
    let spoke = network.add_random_node(None);
    let quiet_a = network.add_random_node(None);
    let quiet_b = network.add_random_node(None);
    network.connect(&spoke.id(), &hub.id()).unwrap();
    network.connect(&quiet_a.id(), &quiet_b.id()).unwrap();

    // Nothing ever reads what is written on quiet_a's half for quiet_b.
    let session = ExchangeTestSession::new(
        routes(vec![(spoke.id(), hub.clone()), (quiet_b.id(), quiet_a.clone())]),
        CodecMessenger::cbor(),
        vec![spoke.id(), quiet_b.id()],
    );

    let stuck = Exchange::new(
        vec![Trigger::new(quiet_b.id(), text("hello")).with_timeout(Duration::from_millis(10))],
        vec![],
    );
    let started = Instant::now();
    let err = session
        .test_exchanges(&[stuck, round_trip(spoke.id(), text("never run"))])
        .await
        .unwrap_err();

    let HarnessError::ExchangeFailed { index: 0, source } = err else {
        panic!("expected exchange failure");
    };
    assert_eq!(
        source,
        OperationError::Timeout {
            kind: OperationKind::Trigger,
            peer: quiet_b.id(),
            code: 1,
            after: Duration::from_millis(10),
        }
    );
    assert!(started.elapsed() < Duration::from_millis(100));

    session.test_exchanges(&[round_trip(spoke.id(), text("ping"))]).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn exchange_without_progress_times_out() {
    let (_network, hub, ids) = star(protocol(sink_loop), 1);
    let session = ExchangeTestSession::new(hub, CodecMessenger::cbor(), ids.clone());

    // The sink never answers and the expect outlives the exchange budget.
    let exchange = Exchange::new(
        vec![],
        vec![Expect::new(ids[0], text("reply")).with_timeout(Duration::from_secs(5))],
    );
    let err = session.test_exchanges(&[exchange]).await.unwrap_err();
    assert_eq!(err, HarnessError::ExchangeTimedOut { index: 0 });
}

#[tokio::test(start_paused = true)]
async fn unknown_and_unreachable_peers_fail() {
    let (network, hub, ids) = star(protocol(sink_loop), 1);
    let session = ExchangeTestSession::new(hub.clone(), CodecMessenger::cbor(), ids.clone());

    let stranger = NodeId::new([0xee; 64]);
    let err = session
        .test_exchanges(&[Exchange::new(vec![Trigger::new(stranger, text("x"))], vec![])])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::ExchangeFailed { source: OperationError::UnknownPeer(id), .. } if id == stranger
    ));

    network.disconnect(&hub.id(), &ids[0]).unwrap();
    let err = session
        .test_exchanges(&[Exchange::new(vec![Trigger::new(ids[0], text("x"))], vec![])])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::ExchangeFailed { source: OperationError::PeerUnreachable(_), .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn flush_exchange_drains_to_every_peer() {
    let (_network, hub, ids) = star(protocol(sink_loop), 3);
    let session = ExchangeTestSession::new(hub, CodecMessenger::cbor(), ids.clone());

    let flush = Exchange::flush(7, &text("flush"), &ids);
    assert_eq!(flush.triggers.len(), 3);
    assert!(flush.triggers.iter().all(|t| t.code == 7));

    session.test_exchanges(&[flush]).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn connected_peers_pass_and_unknown_peer_times_out() {
    let (_network, hub, ids) = star(protocol(sink_loop), 2);
    let session = ExchangeTestSession::new(hub, CodecMessenger::cbor(), ids.clone());

    session.test_connected(false, &ids).await.unwrap();
    session.test_connected(true, &ids).await.unwrap();

    let stranger = NodeId::new([0xee; 64]);
    let started = Instant::now();
    let err = session.test_connected(false, &[ids[0], stranger]).await.unwrap_err();
    assert_eq!(err, HarnessError::ConnectTimeout { peer: stranger });
    assert!(started.elapsed() >= Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn terminated_peer_is_reported_while_connecting() {
    let (_network, hub, ids) = star(protocol(reject), 1);
    let session = ExchangeTestSession::new(hub, CodecMessenger::cbor(), ids.clone());
    tokio::time::sleep(Duration::from_millis(1)).await;

    let err = session.test_connected(false, &ids).await.unwrap_err();
    assert_eq!(
        err,
        HarnessError::PeerDisconnected { peer: ids[0], error: Some("bad handshake".to_string()) }
    );
}

#[tokio::test(start_paused = true)]
async fn disconnect_outcomes_are_compared() {
    let (network, hub, ids) = star(protocol(reject), 1);
    let session = ExchangeTestSession::new(hub.clone(), CodecMessenger::cbor(), ids.clone());
    session.test_disconnected(&[Disconnect::with_error(ids[0], "bad handshake")]).await.unwrap();

    // Reconnect with a passive hub entry and drop it cleanly.
    let network2 = SimNetwork::new(SimEnv::with_seed(3));
    let a = network2.add_random_node(None);
    let b = network2.add_random_node(None);
    network2.connect(&a.id(), &b.id()).unwrap();
    network2.disconnect(&a.id(), &b.id()).unwrap();
    let session2 = ExchangeTestSession::new(a.clone(), CodecMessenger::cbor(), vec![b.id()]);

    let err = session2
        .test_disconnected(&[Disconnect::with_error(b.id(), "boom")])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        HarnessError::DisconnectMismatch {
            peer: b.id(),
            got: None,
            wanted: Some("boom".to_string()),
        }
    );

    // Nothing further will be delivered.
    let err = session2.test_disconnected(&[Disconnect::clean(b.id())]).await.unwrap_err();
    assert_eq!(err, HarnessError::DisconnectTimeout { peer: b.id() });

    let stranger = NodeId::new([0xee; 64]);
    let err = session2.test_disconnected(&[Disconnect::clean(stranger)]).await.unwrap_err();
    assert_eq!(err, HarnessError::UnknownPeer(stranger));

    drop(network);
}

/// Two passive nodes: a message triggered on A's half for B is read from
/// B's half for A.
fn two_passive_nodes() -> (Arc<SimNetwork<SimEnv>>, SimNode, SimNode) {
    let network = SimNetwork::new(SimEnv::with_seed(7));
    let a = network.add_random_node(None);
    let b = network.add_random_node(None);
    (network, a, b)
}

#[tokio::test(start_paused = true)]
async fn connect_exchange_disconnect_scenario() {
    let (network, a, b) = two_passive_nodes();
    network.connect(&a.id(), &b.id()).unwrap();

    let session = ExchangeTestSession::new(
        routes(vec![(b.id(), a.clone()), (a.id(), b.clone())]),
        CodecMessenger::cbor(),
        vec![a.id(), b.id()],
    );
    session.test_connected(true, &[a.id(), b.id()]).await.unwrap();

    session
        .test_exchanges(&[Exchange::new(
            vec![Trigger::new(b.id(), text("ping"))],
            vec![Expect::new(a.id(), text("ping"))],
        )])
        .await
        .unwrap();

    network.disconnect(&a.id(), &b.id()).unwrap();
    session.test_disconnected(&[Disconnect::clean(b.id()), Disconnect::clean(a.id())]).await.unwrap();

    // The slot survives with a null endpoint; one inbound registration is fine.
    let (fresh, _remote) = msg_pipe();
    let fresh: Endpoint = fresh;
    a.set_peer(b.id(), Some(fresh));
    assert!(a.get_peer(&b.id()).unwrap().is_connected());
}

#[tokio::test(start_paused = true)]
#[should_panic(expected = "already set")]
async fn duplicate_inbound_registration_panics() {
    let (network, a, b) = two_passive_nodes();
    network.connect(&a.id(), &b.id()).unwrap();

    let (fresh, _remote) = msg_pipe();
    let fresh: Endpoint = fresh;
    a.set_peer(b.id(), Some(fresh));
}
