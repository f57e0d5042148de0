//! Real-network node adapter.
//!
//! [`Rlpx`] drives a transport server through the narrow [`PeerServer`]
//! interface. Addresses are canonical [`NodeAddr`] strings.

use std::{fmt, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use simnet_proto::{DisconnectReason, NodeAddr, NodeId};

use crate::{AdapterError, CborMessenger, Messenger, NodeAdapter, Reporter};

/// Callback invoked with the remote identity on a server lifecycle event.
pub type PeerHook = Arc<dyn Fn(NodeId) + Send + Sync>;

/// Transport server operations the real-network adapter needs.
pub trait PeerServer: Send + Sync + 'static {
    /// Start dialing `addr`. Returns before the link is up.
    fn add_peer(&self, addr: NodeAddr);

    /// Drop the link to `id` with `reason`.
    fn disconnect_peer(&self, id: &NodeId, reason: DisconnectReason);

    /// Install callbacks fired when a peer link comes up or goes down.
    fn set_hooks(&self, on_connect: PeerHook, on_disconnect: PeerHook);
}

/// Adapter for nodes on a real network.
pub struct Rlpx<S: PeerServer, M: Messenger = CborMessenger> {
    id: NodeId,
    addr: Vec<u8>,
    server: Arc<S>,
    messenger: M,
}

impl<S: PeerServer, M: Messenger> fmt::Debug for Rlpx<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rlpx")
            .field("id", &self.id)
            .field("addr", &String::from_utf8_lossy(&self.addr))
            .finish_non_exhaustive()
    }
}

impl<S: PeerServer> Rlpx<S> {
    /// Adapter advertising `addr`, using the default messenger.
    pub fn new(id: NodeId, addr: Vec<u8>, server: Arc<S>) -> Self {
        Self::with_messenger(id, addr, server, CborMessenger)
    }

    /// Adapter that reports every server link event to `reporter`.
    pub fn new_reporting(
        id: NodeId,
        addr: Vec<u8>,
        server: Arc<S>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let on_connect: PeerHook = {
            let reporter = Arc::clone(&reporter);
            Arc::new(move |remote| reporter.did_connect(&id, &remote))
        };
        let on_disconnect: PeerHook = Arc::new(move |remote| reporter.did_disconnect(&id, &remote));
        server.set_hooks(on_connect, on_disconnect);
        Self::new(id, addr, server)
    }
}

impl<S: PeerServer, M: Messenger> Rlpx<S, M> {
    /// Adapter with a custom messenger.
    pub fn with_messenger(id: NodeId, addr: Vec<u8>, server: Arc<S>, messenger: M) -> Self {
        Self { id, addr, server, messenger }
    }

    /// Local identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Underlying transport server.
    pub fn server(&self) -> &Arc<S> {
        &self.server
    }
}

#[async_trait]
impl<S: PeerServer, M: Messenger> NodeAdapter for Rlpx<S, M> {
    type Messenger = M;

    fn local_addr(&self) -> Vec<u8> {
        self.addr.clone()
    }

    fn parse_addr(&self, advertised: &[u8], observed: &str) -> Result<Vec<u8>, AdapterError> {
        let mut addr = NodeAddr::parse_bytes(advertised)?;
        if addr.has_unspecified_ip() {
            let remote: SocketAddr =
                observed.parse().map_err(|e: std::net::AddrParseError| {
                    AdapterError::InvalidRemoteAddress {
                        addr: observed.to_string(),
                        reason: e.to_string(),
                    }
                })?;
            addr = addr.with_ip(remote.ip());
        }
        Ok(addr.to_string().into_bytes())
    }

    async fn connect(&self, remote: &[u8]) -> Result<(), AdapterError> {
        let addr = NodeAddr::parse_bytes(remote)?;
        tracing::debug!("dialing {}", addr);
        self.server.add_peer(addr);
        Ok(())
    }

    async fn disconnect(&self, remote: &[u8]) -> Result<(), AdapterError> {
        let id = match NodeId::from_slice(remote) {
            Ok(id) => id,
            Err(_) => NodeAddr::parse_bytes(remote)?.id,
        };
        self.server.disconnect_peer(&id, DisconnectReason::SubprotocolError);
        Ok(())
    }

    fn messenger(&self) -> &M {
        &self.messenger
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingServer {
        dialed: Mutex<Vec<NodeAddr>>,
        dropped: Mutex<Vec<(NodeId, DisconnectReason)>>,
        hooks: Mutex<Option<(PeerHook, PeerHook)>>,
    }

    impl PeerServer for RecordingServer {
        fn add_peer(&self, addr: NodeAddr) {
            self.dialed.lock().unwrap().push(addr);
        }

        fn disconnect_peer(&self, id: &NodeId, reason: DisconnectReason) {
            self.dropped.lock().unwrap().push((*id, reason));
        }

        fn set_hooks(&self, on_connect: PeerHook, on_disconnect: PeerHook) {
            *self.hooks.lock().unwrap() = Some((on_connect, on_disconnect));
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<(&'static str, NodeId, NodeId)>>,
    }

    impl Reporter for RecordingReporter {
        fn did_connect(&self, from: &NodeId, to: &NodeId) {
            self.events.lock().unwrap().push(("connect", *from, *to));
        }

        fn did_disconnect(&self, from: &NodeId, to: &NodeId) {
            self.events.lock().unwrap().push(("disconnect", *from, *to));
        }
    }

    fn id(n: u8) -> NodeId {
        NodeId::new([n; 64])
    }

    fn adapter() -> Rlpx<RecordingServer> {
        let local = NodeAddr::new(id(1), "10.0.0.1".parse().unwrap(), 30303);
        Rlpx::new(id(1), local.to_string().into_bytes(), Arc::new(RecordingServer::default()))
    }

    #[test]
    fn parse_addr_repairs_unspecified_ip() {
        let rlpx = adapter();
        let advertised = NodeAddr::new(id(2), "0.0.0.0".parse().unwrap(), 30303).to_string();

        let repaired = rlpx.parse_addr(advertised.as_bytes(), "192.168.1.7:51234").unwrap();

        let expected = NodeAddr::new(id(2), "192.168.1.7".parse().unwrap(), 30303);
        assert_eq!(repaired, expected.to_string().into_bytes());
    }

    #[test]
    fn parse_addr_keeps_specified_ip() {
        let rlpx = adapter();
        let advertised = NodeAddr::new(id(2), "10.0.0.2".parse().unwrap(), 30303).to_string();

        let parsed = rlpx.parse_addr(advertised.as_bytes(), "not an address").unwrap();
        assert_eq!(parsed, advertised.into_bytes());
    }

    #[test]
    fn parse_addr_rejects_bad_observed_address() {
        let rlpx = adapter();
        let advertised = NodeAddr::new(id(2), "::".parse().unwrap(), 30303).to_string();

        let err = rlpx.parse_addr(advertised.as_bytes(), "nohost").unwrap_err();
        assert!(matches!(err, AdapterError::InvalidRemoteAddress { .. }));
    }

    #[test]
    fn parse_addr_rejects_bad_advertised_address() {
        let rlpx = adapter();
        let err = rlpx.parse_addr(b"garbage", "1.2.3.4:5").unwrap_err();
        assert!(matches!(err, AdapterError::Proto(_)));
    }

    #[tokio::test]
    async fn connect_dials_and_disconnect_drops() {
        let rlpx = adapter();
        let remote = NodeAddr::new(id(2), "10.0.0.2".parse().unwrap(), 30304);

        rlpx.connect(remote.to_string().as_bytes()).await.unwrap();
        rlpx.disconnect(remote.to_string().as_bytes()).await.unwrap();
        rlpx.disconnect(id(3).as_bytes()).await.unwrap();

        assert_eq!(*rlpx.server().dialed.lock().unwrap(), vec![remote]);
        assert_eq!(
            *rlpx.server().dropped.lock().unwrap(),
            vec![
                (id(2), DisconnectReason::SubprotocolError),
                (id(3), DisconnectReason::SubprotocolError),
            ]
        );
    }

    #[tokio::test]
    async fn connect_rejects_malformed_address() {
        let rlpx = adapter();
        assert!(rlpx.connect(b"abc@1.2.3.4:5").await.is_err());
        assert!(rlpx.server().dialed.lock().unwrap().is_empty());
    }

    #[test]
    fn reporting_adapter_forwards_hooks() {
        let server = Arc::new(RecordingServer::default());
        let reporter = Arc::new(RecordingReporter::default());
        let _rlpx = Rlpx::new_reporting(id(1), Vec::new(), Arc::clone(&server), reporter.clone());

        let (on_connect, on_disconnect) = server.hooks.lock().unwrap().clone().unwrap();
        on_connect(id(2));
        on_disconnect(id(2));

        assert_eq!(
            *reporter.events.lock().unwrap(),
            vec![("connect", id(1), id(2)), ("disconnect", id(1), id(2))]
        );
    }
}
