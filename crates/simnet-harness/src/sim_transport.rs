//! Turmoil-backed peer server.
//!
//! Stands in for a real transport server so the real-network adapter can be
//! exercised under simulated TCP. The wire protocol is minimal:
//!
//! ```text
//!   dialer                         listener
//!   ── 64-byte node id ─────────▶
//!   ◀──────────── 64-byte node id ──
//!   ... link up, hooks fire ...
//!   ── 1-byte disconnect reason ─▶   (either side, then close)
//! ```

use std::{
    collections::HashMap,
    fmt, io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use simnet_core::{PeerHook, PeerServer};
use simnet_proto::{DisconnectReason, NODE_ID_LEN, NodeAddr, NodeId};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
};
use turmoil::net::{TcpListener, TcpStream};

#[derive(Default)]
struct State {
    links: HashMap<NodeId, mpsc::Sender<DisconnectReason>>,
    hooks: Option<(PeerHook, PeerHook)>,
}

/// Peer server speaking over turmoil's simulated network.
pub struct SimPeerServer {
    me: Weak<SimPeerServer>,
    id: NodeId,
    port: u16,
    state: Mutex<State>,
}

impl fmt::Debug for SimPeerServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimPeerServer").field("id", &self.id).field("port", &self.port).finish()
    }
}

impl SimPeerServer {
    /// Server for node `id` listening on `port`.
    pub fn new(id: NodeId, port: u16) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            id,
            port,
            state: Mutex::new(State::default()),
        })
    }

    /// Address this node advertises before it knows its public IP.
    pub fn advertised_addr(&self) -> NodeAddr {
        NodeAddr::new(self.id, IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port)
    }

    /// Identities with a live link.
    pub fn peers(&self) -> Vec<NodeId> {
        self.lock().links.keys().copied().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept inbound links until the listener fails.
    pub async fn listen(self: Arc<Self>) -> io::Result<()> {
        let listener =
            TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port))
                .await?;
        loop {
            let (stream, from) = listener.accept().await?;
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.accept_link(stream).await {
                    tracing::debug!("inbound link from {} failed: {}", from, e);
                }
            });
        }
    }

    async fn accept_link(self: Arc<Self>, mut stream: TcpStream) -> io::Result<()> {
        let remote = read_id(&mut stream).await?;
        stream.write_all(self.id.as_bytes()).await?;
        self.run_link(remote, stream).await;
        Ok(())
    }

    async fn dial(self: Arc<Self>, addr: NodeAddr) -> io::Result<()> {
        let mut stream = TcpStream::connect(addr.tcp_addr()).await?;
        stream.write_all(self.id.as_bytes()).await?;
        let remote = read_id(&mut stream).await?;
        if remote != addr.id {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("dialed {} but reached {}", addr.id, remote),
            ));
        }
        self.run_link(remote, stream).await;
        Ok(())
    }

    async fn run_link(&self, remote: NodeId, stream: TcpStream) {
        let (control, mut control_rx) = mpsc::channel(1);
        let on_connect = {
            let mut state = self.lock();
            if state.links.contains_key(&remote) {
                tracing::debug!("duplicate link to {}, dropping", remote);
                return;
            }
            state.links.insert(remote, control);
            state.hooks.as_ref().map(|(on_connect, _)| Arc::clone(on_connect))
        };
        tracing::debug!("link {} <-> {} up", self.id, remote);
        if let Some(hook) = on_connect {
            hook(remote);
        }

        let (mut reader, mut writer) = stream.into_split();
        let mut frame = [0u8; 1];
        tokio::select! {
            Some(reason) = control_rx.recv() => {
                if let Err(e) = writer.write_all(&[reason.as_u8()]).await {
                    tracing::debug!("failed to send disconnect to {}: {}", remote, e);
                }
                tracing::debug!("dropped {} ({})", remote, reason);
            },
            read = reader.read(&mut frame) => match read {
                Ok(1) => match DisconnectReason::from_u8(frame[0]) {
                    Some(reason) => tracing::debug!("{} disconnected ({})", remote, reason),
                    None => tracing::debug!("{} disconnected (code {})", remote, frame[0]),
                },
                _ => tracing::debug!("link to {} closed", remote),
            },
        }

        let on_disconnect = {
            let mut state = self.lock();
            state.links.remove(&remote);
            state.hooks.as_ref().map(|(_, on_disconnect)| Arc::clone(on_disconnect))
        };
        if let Some(hook) = on_disconnect {
            hook(remote);
        }
    }
}

async fn read_id(stream: &mut TcpStream) -> io::Result<NodeId> {
    let mut raw = [0u8; NODE_ID_LEN];
    stream.read_exact(&mut raw).await?;
    Ok(NodeId::new(raw))
}

impl PeerServer for SimPeerServer {
    fn add_peer(&self, addr: NodeAddr) {
        let Some(server) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = server.dial(addr).await {
                tracing::warn!("dial {} failed: {}", addr, e);
            }
        });
    }

    fn disconnect_peer(&self, id: &NodeId, reason: DisconnectReason) {
        let control = self.lock().links.get(id).cloned();
        match control {
            Some(control) => {
                if control.try_send(reason).is_err() {
                    tracing::debug!("disconnect of {} already pending", id);
                }
            },
            None => tracing::debug!("no link to {}", id),
        }
    }

    fn set_hooks(&self, on_connect: PeerHook, on_disconnect: PeerHook) {
        self.lock().hooks = Some((on_connect, on_disconnect));
    }
}
