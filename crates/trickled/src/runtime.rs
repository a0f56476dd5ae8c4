//! Tokio UDP runtime — the real-network environment for sessions.
//!
//! Implements [`Transport`] and [`Scheduler`] on top of non-blocking UDP
//! sockets and tokio timers. Meant to be driven by a current-thread
//! runtime, so every receive callback and scheduled task runs on the one
//! event thread, one at a time, exactly as under the simulator.
//!
//! Callback and task failures cannot be returned to anyone, so they are
//! forwarded on the fatal channel handed out by [`UdpRuntime::new`].

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use trickle_core::{
    Endpoint, Environment, Node, ReceiveCallback, Scheduler, SessionError, SocketHandle, Task,
    Transport, TransportError, MAX_DATAGRAM_PAYLOAD,
};

struct RuntimeSocket {
    node: Node,
    socket: Option<Arc<UdpSocket>>,
    listener: Option<JoinHandle<()>>,
}

pub struct UdpRuntime {
    handle: Handle,
    started: Instant,
    next_handle: AtomicU64,
    sockets: DashMap<SocketHandle, RuntimeSocket>,
    /// Shared receive buffer; datagrams are copied out at their real size.
    recv_buf: Mutex<Vec<u8>>,
    fatal: mpsc::UnboundedSender<SessionError>,
}

impl UdpRuntime {
    /// A runtime spawning onto `handle`, plus the receiver for fatal
    /// callback errors.
    pub fn new(handle: Handle) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionError>) {
        let (fatal, fatal_rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(Self {
            handle,
            started: Instant::now(),
            next_handle: AtomicU64::new(1),
            sockets: DashMap::new(),
            recv_buf: Mutex::new(vec![0u8; MAX_DATAGRAM_PAYLOAD]),
            fatal,
        });
        (runtime, fatal_rx)
    }

    pub fn environment(self: &Arc<Self>) -> Environment {
        Environment::new(self.clone(), self.clone())
    }

    /// Open sockets right now.
    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    fn socket(&self, handle: SocketHandle) -> Result<Arc<UdpSocket>, TransportError> {
        let entry = self
            .sockets
            .get(&handle)
            .ok_or(TransportError::UnknownSocket(handle))?;
        entry.socket.clone().ok_or(TransportError::NotBound(handle))
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

impl Scheduler for UdpRuntime {
    fn schedule_after(&self, delay: Duration, task: Task) {
        let fatal = self.fatal.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = task() {
                tracing::error!(error = %e, "scheduled task failed");
                let _ = fatal.send(e);
            }
        });
    }

    fn now(&self) -> Duration {
        self.started.elapsed()
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

impl Transport for UdpRuntime {
    fn create_endpoint(&self, node: &Node) -> Result<SocketHandle, TransportError> {
        let handle = SocketHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.sockets.insert(
            handle,
            RuntimeSocket {
                node: *node,
                socket: None,
                listener: None,
            },
        );
        Ok(handle)
    }

    fn bind(&self, handle: SocketHandle, port: u16) -> Result<Endpoint, TransportError> {
        let mut entry = self
            .sockets
            .get_mut(&handle)
            .ok_or(TransportError::UnknownSocket(handle))?;

        let addr = SocketAddr::new(entry.node.addr(), port);
        let std_socket = std::net::UdpSocket::bind(addr).map_err(|e| match e.kind() {
            ErrorKind::AddrInUse => TransportError::PortInUse(port),
            _ => TransportError::Io(e),
        })?;
        std_socket.set_nonblocking(true)?;
        let socket = {
            let _guard = self.handle.enter();
            UdpSocket::from_std(std_socket)?
        };
        let local = Endpoint::from(socket.local_addr()?);

        if let Some(listener) = entry.listener.take() {
            listener.abort();
        }
        entry.socket = Some(Arc::new(socket));
        tracing::debug!(%handle, %local, "udp socket bound");
        Ok(local)
    }

    fn send_to(
        &self,
        handle: SocketHandle,
        payload: Bytes,
        dest: Endpoint,
    ) -> Result<usize, TransportError> {
        let socket = self.socket(handle)?;
        if payload.len() > MAX_DATAGRAM_PAYLOAD {
            return Err(TransportError::Oversized(payload.len()));
        }
        Ok(socket.try_send_to(&payload, dest.as_socket_addr())?)
    }

    fn receive_from(
        &self,
        handle: SocketHandle,
    ) -> Result<Option<(Bytes, Endpoint)>, TransportError> {
        let socket = self.socket(handle)?;
        let mut buf = self.recv_buf.lock().unwrap_or_else(PoisonError::into_inner);
        match socket.try_recv_from(&mut buf[..]) {
            Ok((len, from)) => Ok(Some((
                Bytes::copy_from_slice(&buf[..len]),
                Endpoint::from(from),
            ))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_receive_callback(
        &self,
        handle: SocketHandle,
        callback: ReceiveCallback,
    ) -> Result<(), TransportError> {
        let mut entry = self
            .sockets
            .get_mut(&handle)
            .ok_or(TransportError::UnknownSocket(handle))?;
        let socket = entry.socket.clone().ok_or(TransportError::NotBound(handle))?;

        let fatal = self.fatal.clone();
        let listener = self.handle.spawn(async move {
            loop {
                if let Err(e) = socket.readable().await {
                    tracing::warn!(%handle, error = %e, "socket readiness failed");
                    break;
                }
                if let Err(e) = callback(handle) {
                    tracing::error!(%handle, error = %e, "receive callback failed");
                    let _ = fatal.send(e);
                    break;
                }
            }
        });

        if let Some(previous) = entry.listener.replace(listener) {
            previous.abort();
        }
        Ok(())
    }

    fn close(&self, handle: SocketHandle) {
        if let Some((_, entry)) = self.sockets.remove(&handle) {
            if let Some(listener) = entry.listener {
                listener.abort();
            }
            tracing::debug!(%handle, "udp socket closed");
        }
    }
}
