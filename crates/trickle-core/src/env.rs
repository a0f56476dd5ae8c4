//! Environment seams — the datagram transport and the scheduler.
//!
//! Sessions never own sockets or timers directly. They talk to whatever
//! environment they were started in: the discrete-event simulator in
//! `trickle-services`, or the tokio UDP runtime in `trickled`. Both run
//! every callback on a single event thread, one at a time.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::endpoint::{Endpoint, Node, SocketHandle};
use crate::error::SessionError;

/// Receive notification. Carries only the handle of the socket that has a
/// datagram pending; the session is recovered through a registry.
pub type ReceiveCallback = Arc<dyn Fn(SocketHandle) -> Result<(), SessionError> + Send + Sync>;

/// Deferred work submitted to a [`Scheduler`].
pub type Task = Box<dyn FnOnce() -> Result<(), SessionError> + Send>;

/// Largest UDP payload over IPv4 (65535 - 20 - 8).
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown socket {0}")]
    UnknownSocket(SocketHandle),
    #[error("socket {0} is not bound")]
    NotBound(SocketHandle),
    #[error("port {0} already in use")]
    PortInUse(u16),
    #[error("datagram of {0} bytes exceeds {max}", max = MAX_DATAGRAM_PAYLOAD)]
    Oversized(usize),
    #[error("no route to {0}")]
    NoRoute(Endpoint),
    #[error("socket i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Unreliable datagram transport.
pub trait Transport: Send + Sync {
    /// Create an unbound endpoint on `node`.
    fn create_endpoint(&self, node: &Node) -> Result<SocketHandle, TransportError>;

    /// Bind to `port` on the node's addresses. Port 0 picks an ephemeral
    /// port. Returns the bound local endpoint.
    fn bind(&self, handle: SocketHandle, port: u16) -> Result<Endpoint, TransportError>;

    /// Send one datagram. There is no acknowledgement: `Ok` only means the
    /// datagram left the socket.
    fn send_to(
        &self,
        handle: SocketHandle,
        payload: Bytes,
        dest: Endpoint,
    ) -> Result<usize, TransportError>;

    /// Take one pending datagram and its sender, if any.
    fn receive_from(&self, handle: SocketHandle)
        -> Result<Option<(Bytes, Endpoint)>, TransportError>;

    /// Install the receive notification for `handle`, replacing any previous one.
    fn set_receive_callback(
        &self,
        handle: SocketHandle,
        callback: ReceiveCallback,
    ) -> Result<(), TransportError>;

    /// Release the socket. Closing an unknown handle is a no-op.
    fn close(&self, handle: SocketHandle);
}

/// Delayed callback execution plus a clock.
pub trait Scheduler: Send + Sync {
    fn schedule_after(&self, delay: Duration, task: Task);

    /// Time elapsed since the environment started.
    fn now(&self) -> Duration;
}

/// The pair of collaborators a session runs against.
#[derive(Clone)]
pub struct Environment {
    pub transport: Arc<dyn Transport>,
    pub scheduler: Arc<dyn Scheduler>,
}

impl Environment {
    pub fn new(transport: Arc<dyn Transport>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            transport,
            scheduler,
        }
    }
}
