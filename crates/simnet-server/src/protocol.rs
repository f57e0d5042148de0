//! Demo ping/pong protocol run on every link of a served network.
//!
//! Of the two peers on a link, the one with the lower identity initiates:
//! it sleeps for the ping interval, sends `Ping(n)` and waits for `Pong(n)`.
//! The other side answers every ping. A closed link ends both handlers
//! cleanly; anything else on the wire is a protocol failure.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use simnet_core::{
    CborMessenger, Endpoint, EndpointError, Environment, Messenger, MessengerError, PeerInfo,
    Protocol, ProtocolError, protocol,
};
use simnet_proto::{MessageSet, NodeId, ProtoError, decode_payload, encode_payload};

/// Message code of [`PingMsg::Ping`].
pub const PING_CODE: u64 = 0x02;
/// Message code of [`PingMsg::Pong`].
pub const PONG_CODE: u64 = 0x03;

/// Messages of the ping protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingMsg {
    /// Liveness probe carrying a round number.
    Ping(u64),
    /// Answer echoing the probe's round number.
    Pong(u64),
}

impl MessageSet for PingMsg {
    fn code(&self) -> u64 {
        match self {
            Self::Ping(_) => PING_CODE,
            Self::Pong(_) => PONG_CODE,
        }
    }

    fn encode(&self) -> Result<Bytes, ProtoError> {
        match self {
            Self::Ping(round) | Self::Pong(round) => encode_payload(round),
        }
    }

    fn decode(code: u64, payload: &[u8]) -> Result<Self, ProtoError> {
        match code {
            PING_CODE => decode_payload(code, payload).map(Self::Ping),
            PONG_CODE => decode_payload(code, payload).map(Self::Pong),
            _ => Err(ProtoError::UnknownCode { code }),
        }
    }
}

/// Ping protocol bound to one node.
#[derive(Debug, Clone)]
pub struct PingProtocol<E: Environment> {
    env: E,
    local: NodeId,
    interval: Duration,
    rounds: Arc<AtomicU64>,
}

impl<E: Environment> PingProtocol<E> {
    /// Protocol for node `local`, counting completed rounds into `rounds`.
    pub fn new(env: E, local: NodeId, interval: Duration, rounds: Arc<AtomicU64>) -> Self {
        Self { env, local, interval, rounds }
    }

    /// Whether this node starts the exchange with `peer`.
    pub fn initiates(&self, peer: &NodeId) -> bool {
        self.local < *peer
    }

    /// Handler to install on the node.
    pub fn into_protocol(self) -> Protocol {
        protocol(move |peer: PeerInfo, rw: Endpoint| {
            let this = self.clone();
            async move {
                let result = if this.initiates(&peer.id) {
                    this.ping_loop(&peer, &rw).await
                } else {
                    this.pong_loop(&peer, &rw).await
                };
                match result {
                    Err(MessengerError::Endpoint(EndpointError::Closed)) => {
                        tracing::debug!("ping link {} -> {} closed", this.local, peer.name);
                        Ok(())
                    },
                    other => other.map_err(ProtocolError::from),
                }
            }
        })
    }

    async fn ping_loop(&self, peer: &PeerInfo, rw: &Endpoint) -> Result<(), MessengerError> {
        let messenger = CborMessenger;
        let mut round = 0u64;
        loop {
            self.env.sleep(self.interval).await;
            messenger.send_msg(rw.as_ref(), PING_CODE, &PingMsg::Ping(round)).await?;

            let reply = PingMsg::from_msg(&messenger.read_msg(rw.as_ref()).await?)?;
            if reply != PingMsg::Pong(round) {
                return Err(MessengerError::Codec(ProtoError::Decode {
                    code: reply.code(),
                    reason: format!("expected pong {round}, got {reply:?}"),
                }));
            }
            self.rounds.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("pong {} from {}", round, peer.name);
            round += 1;
        }
    }

    async fn pong_loop(&self, peer: &PeerInfo, rw: &Endpoint) -> Result<(), MessengerError> {
        let messenger = CborMessenger;
        loop {
            match PingMsg::from_msg(&messenger.read_msg(rw.as_ref()).await?)? {
                PingMsg::Ping(round) => {
                    messenger.send_msg(rw.as_ref(), PONG_CODE, &PingMsg::Pong(round)).await?;
                    tracing::trace!("ping {} from {}", round, peer.name);
                },
                unexpected @ PingMsg::Pong(_) => {
                    return Err(MessengerError::Codec(ProtoError::Decode {
                        code: unexpected.code(),
                        reason: "unsolicited pong".to_string(),
                    }));
                },
            }
        }
    }
}
