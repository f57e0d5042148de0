//! Canonical node address.
//!
//! Format: `<hex-identity>@<ip-address>:<tcp-port>[?udp=<udp-port>]`.
//! IPv6 hosts are bracketed (`[::1]:30303`). An `enode://` scheme prefix is
//! accepted on parse but never emitted.

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use crate::{NodeId, ProtoError};

const SCHEME: &str = "enode://";

/// Dialable address of a real-network node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeAddr {
    /// Node identity.
    pub id: NodeId,
    /// Host IP. May be unspecified when self-advertised by a node that does
    /// not know its public address.
    pub ip: IpAddr,
    /// TCP listening port.
    pub tcp_port: u16,
    /// UDP discovery port. Equal to `tcp_port` unless stated otherwise.
    pub udp_port: u16,
}

impl NodeAddr {
    /// Address with the same port for TCP and UDP.
    pub const fn new(id: NodeId, ip: IpAddr, tcp_port: u16) -> Self {
        Self { id, ip, tcp_port, udp_port: tcp_port }
    }

    /// Parse the canonical form from raw bytes.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, ProtoError> {
        let s = std::str::from_utf8(bytes).map_err(|e| ProtoError::invalid_addr(e.to_string()))?;
        s.parse()
    }

    /// TCP socket address.
    pub const fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.tcp_port)
    }

    /// Whether the host IP is the unspecified address (`0.0.0.0` or `::`).
    pub fn has_unspecified_ip(&self) -> bool {
        self.ip.is_unspecified()
    }

    /// Same address with a different host IP.
    #[must_use]
    pub const fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }
}

impl FromStr for NodeAddr {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix(SCHEME).unwrap_or(s);

        let (id_hex, rest) =
            s.split_once('@').ok_or_else(|| ProtoError::invalid_addr("missing '@' separator"))?;
        let id = NodeId::from_hex(id_hex)
            .map_err(|e| ProtoError::invalid_addr(format!("bad identity: {e}")))?;

        let (host_port, query) = match rest.split_once('?') {
            Some((hp, q)) => (hp, Some(q)),
            None => (rest, None),
        };

        let socket: SocketAddr = host_port
            .parse()
            .map_err(|e| ProtoError::invalid_addr(format!("bad host:port '{host_port}': {e}")))?;

        let udp_port = match query {
            None => socket.port(),
            Some(q) => {
                let value = q
                    .strip_prefix("udp=")
                    .or_else(|| q.strip_prefix("discport="))
                    .ok_or_else(|| ProtoError::invalid_addr(format!("unknown query '{q}'")))?;
                value
                    .parse::<u16>()
                    .map_err(|e| ProtoError::invalid_addr(format!("bad udp port '{value}': {e}")))?
            },
        };

        Ok(Self { id, ip: socket.ip(), tcp_port: socket.port(), udp_port })
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id.to_hex(), self.tcp_addr())?;
        if self.udp_port != self.tcp_port {
            write!(f, "?udp={}", self.udp_port)?;
        }
        Ok(())
    }
}
