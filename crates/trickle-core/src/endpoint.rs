//! Addressing types — socket handles, endpoints, and nodes.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Opaque handle for a transport endpoint (one datagram socket).
///
/// Handles are minted by the transport and are the only thing a receive
/// notification carries, which is why sessions are looked up by them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketHandle(u64);

impl SocketHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sock#{}", self.0)
    }
}

/// A transport address (IP + port) identifying a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub const fn new(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port))
    }

    pub const fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub const fn port(&self) -> u16 {
        self.0.port()
    }

    pub const fn as_socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A host that endpoints are created on.
///
/// In the simulator a node is one machine in the topology; the UDP runtime
/// uses a single node whose address is the local bind address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Node {
    id: u32,
    addr: IpAddr,
}

impl Node {
    pub const fn new(id: u32, addr: IpAddr) -> Self {
        Self { id, addr }
    }

    /// The node for a real host, listening on every local address.
    pub const fn local() -> Self {
        Self::new(0, IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    pub const fn id(&self) -> u32 {
        self.id
    }

    pub const fn addr(&self) -> IpAddr {
        self.addr
    }
}
