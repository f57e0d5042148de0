//! Real-network adapter over turmoil's simulated TCP.
//!
//! Two nodes, each with a [`SimPeerServer`] behind an [`Rlpx`] adapter. The
//! dialer repairs the listener's self-advertised address, connects,
//! disconnects, and both sides must report the link coming up and going
//! down.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use simnet_core::{NodeAdapter, Reporter, Rlpx};
use simnet_harness::SimPeerServer;
use simnet_proto::{NodeAddr, NodeId};

const PORT: u16 = 30303;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Connected(NodeId, NodeId),
    Disconnected(NodeId, NodeId),
}

#[derive(Default)]
struct Journal {
    events: Mutex<Vec<Event>>,
}

impl Journal {
    fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    async fn wait_for_len(&self, len: usize) {
        while self.snapshot().len() < len {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Reporter for Journal {
    fn did_connect(&self, from: &NodeId, to: &NodeId) {
        self.events.lock().unwrap().push(Event::Connected(*from, *to));
    }

    fn did_disconnect(&self, from: &NodeId, to: &NodeId) {
        self.events.lock().unwrap().push(Event::Disconnected(*from, *to));
    }
}

#[test]
fn dial_and_drop_are_reported_on_both_sides() {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(30))
        .rng_seed(7)
        .build();

    let dialer_id = NodeId::new([0xaa; 64]);
    let listener_id = NodeId::new([0xbb; 64]);
    let dialer_journal = Arc::new(Journal::default());
    let listener_journal = Arc::new(Journal::default());

    let journal = Arc::clone(&listener_journal);
    sim.host("listener", move || {
        let journal = Arc::clone(&journal);
        async move {
            let server = SimPeerServer::new(listener_id, PORT);
            let advertised = server.advertised_addr().to_string().into_bytes();
            let _rlpx = Rlpx::new_reporting(listener_id, advertised, Arc::clone(&server), journal);
            server.listen().await?;
            Ok(())
        }
    });

    let journal = Arc::clone(&dialer_journal);
    let listener_journal_view = Arc::clone(&listener_journal);
    sim.client("dialer", async move {
        let server = SimPeerServer::new(dialer_id, PORT);
        let advertised = server.advertised_addr().to_string().into_bytes();
        let rlpx =
            Rlpx::new_reporting(dialer_id, advertised, Arc::clone(&server), journal.clone());

        // The listener advertises 0.0.0.0; repair it from the observed peer.
        let listener_ip = turmoil::lookup("listener");
        let advertised = NodeAddr::new(listener_id, "0.0.0.0".parse()?, PORT).to_string();
        let observed = format!("{listener_ip}:{PORT}");
        let dialable = rlpx.parse_addr(advertised.as_bytes(), &observed)?;
        assert_eq!(dialable, NodeAddr::new(listener_id, listener_ip, PORT).to_string().into_bytes());

        rlpx.connect(&dialable).await?;
        journal.wait_for_len(1).await;
        listener_journal_view.wait_for_len(1).await;
        assert_eq!(server.peers(), vec![listener_id]);

        rlpx.disconnect(listener_id.as_bytes()).await?;
        journal.wait_for_len(2).await;
        listener_journal_view.wait_for_len(2).await;
        assert!(server.peers().is_empty());

        Ok(())
    });

    sim.run().expect("simulation should complete");

    assert_eq!(
        dialer_journal.snapshot(),
        vec![Event::Connected(dialer_id, listener_id), Event::Disconnected(dialer_id, listener_id)]
    );
    assert_eq!(
        listener_journal.snapshot(),
        vec![Event::Connected(listener_id, dialer_id), Event::Disconnected(listener_id, dialer_id)]
    );
}

#[test]
fn dial_to_wrong_identity_never_links() {
    let mut sim = turmoil::Builder::new()
        .simulation_duration(Duration::from_secs(30))
        .rng_seed(9)
        .build();

    let dialer_id = NodeId::new([0x01; 64]);
    let listener_id = NodeId::new([0x02; 64]);
    let impostor_id = NodeId::new([0x03; 64]);

    sim.host("listener", move || async move {
        SimPeerServer::new(listener_id, PORT).listen().await?;
        Ok(())
    });

    sim.client("dialer", async move {
        let server = SimPeerServer::new(dialer_id, PORT);
        let rlpx = Rlpx::new(dialer_id, Vec::new(), Arc::clone(&server));

        let addr = NodeAddr::new(impostor_id, turmoil::lookup("listener"), PORT).to_string();
        rlpx.connect(addr.as_bytes()).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(server.peers().is_empty());
        Ok(())
    });

    sim.run().expect("simulation should complete");
}
