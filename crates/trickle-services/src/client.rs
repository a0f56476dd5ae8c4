//! Streaming client — asks once, then appends whatever arrives.
//!
//! The request is a single empty datagram sent after a fixed delay. Every
//! datagram received afterwards is appended to the output file in arrival
//! order. Datagrams carry no sequence numbers, so loss or reordering on
//! the path shows up as a shorter or scrambled output and nothing else.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;

use trickle_core::config::{ClientSettings, STREAMING_PORT};
use trickle_core::{chunk_digest, Endpoint, Environment, LogGate, Node, SessionError, SocketHandle};

use crate::registry::{Receivable, SessionRegistry};

/// Registry type for client sessions.
pub type ClientRegistry = SessionRegistry<StreamingClient>;

/// Delay between client start and the request datagram.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub server: IpAddr,
    pub port: u16,
    pub output: Option<PathBuf>,
    pub local_port: u16,
    pub request_delay: Duration,
}

impl ClientOptions {
    pub fn new(server: IpAddr, output: impl Into<PathBuf>) -> Self {
        Self {
            server,
            port: STREAMING_PORT,
            output: Some(output.into()),
            local_port: 0,
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }

    /// Options from config, streaming from `server` on `port`.
    pub fn from_settings(server: IpAddr, port: u16, s: &ClientSettings) -> Self {
        Self {
            server,
            port,
            output: Some(s.output.clone()),
            local_port: s.local_port,
            request_delay: s.request_delay(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Started; request not yet sent.
    Init,
    /// Request sent, nothing received.
    Waiting,
    /// At least one chunk received.
    Receiving,
    Closed,
}

pub struct StreamingClient {
    handle: SocketHandle,
    local: Endpoint,
    server: Endpoint,
    env: Environment,
    registry: ClientRegistry,
    log: LogGate,
    path: PathBuf,
    inner: Mutex<ClientInner>,
}

struct ClientInner {
    output: Option<BufWriter<File>>,
    state: ClientState,
    bytes_received: u64,
    chunks_received: usize,
}

impl StreamingClient {
    /// Open the output, create and register the socket, and schedule the
    /// request datagram.
    ///
    /// The output is opened up front but only truncated once the socket is
    /// bound and registered, so a failed start leaves an existing file intact.
    pub fn start(
        node: &Node,
        options: ClientOptions,
        env: Environment,
        registry: ClientRegistry,
        log: LogGate,
    ) -> Result<Arc<Self>, SessionError> {
        let path = options.output.ok_or(SessionError::MissingOutput)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| SessionError::OutputUnavailable(path.clone(), e))?;

        let handle = env.transport.create_endpoint(node)?;
        let local = match env.transport.bind(handle, options.local_port) {
            Ok(local) => local,
            Err(e) => {
                env.transport.close(handle);
                return Err(e.into());
            }
        };
        let server = Endpoint::new(options.server, options.port);

        let client = Arc::new(Self {
            handle,
            local,
            server,
            env: env.clone(),
            registry: registry.clone(),
            log,
            path,
            inner: Mutex::new(ClientInner {
                output: Some(BufWriter::new(file)),
                state: ClientState::Init,
                bytes_received: 0,
                chunks_received: 0,
            }),
        });

        if let Err(e) = registry.register(handle, client.clone()) {
            env.transport.close(handle);
            return Err(e);
        }
        if let Err(e) = env
            .transport
            .set_receive_callback(handle, registry.receive_callback())
        {
            registry.unregister(handle);
            env.transport.close(handle);
            return Err(e.into());
        }
        if let Err(e) = client.truncate_output() {
            registry.unregister(handle);
            env.transport.close(handle);
            return Err(e);
        }

        tracing::info!(
            %local,
            %server,
            output = %client.path.display(),
            delay_ms = options.request_delay.as_millis() as u64,
            "streaming client started"
        );

        let registry = registry.clone();
        env.scheduler.schedule_after(
            options.request_delay,
            Box::new(move || registry.lookup(handle)?.send_request()),
        );

        Ok(client)
    }

    /// Send the empty request datagram that starts the server's stream.
    pub fn send_request(&self) -> Result<(), SessionError> {
        if let Err(e) = self.env.transport.send_to(self.handle, Bytes::new(), self.server) {
            tracing::debug!(server = %self.server, error = %e, "request send failed");
        }

        let now = self.env.scheduler.now();
        if self.log.observe(now) {
            tracing::info!(
                elapsed = now.as_secs_f64(),
                ip = %self.server.ip(),
                port = self.server.port(),
                bytes = 0,
                "client sent request"
            );
        }

        let mut inner = self.lock();
        if inner.state == ClientState::Init {
            inner.state = ClientState::Waiting;
        }
        Ok(())
    }

    /// Deregister, release the socket, and flush the output.
    pub fn close(&self) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if inner.state == ClientState::Closed {
            return Ok(());
        }
        inner.state = ClientState::Closed;
        self.registry.unregister(self.handle);
        self.env.transport.close(self.handle);

        tracing::info!(
            output = %self.path.display(),
            bytes = inner.bytes_received,
            chunks = inner.chunks_received,
            "streaming client closed"
        );

        if let Some(mut output) = inner.output.take() {
            output
                .flush()
                .map_err(|e| SessionError::OutputWrite(self.path.clone(), e))?;
        }
        Ok(())
    }

    pub fn state(&self) -> ClientState {
        self.lock().state
    }

    pub fn bytes_received(&self) -> u64 {
        self.lock().bytes_received
    }

    pub fn chunks_received(&self) -> usize {
        self.lock().chunks_received
    }

    pub fn output_path(&self) -> &Path {
        &self.path
    }

    pub fn handle(&self) -> SocketHandle {
        self.handle
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    pub fn server_endpoint(&self) -> Endpoint {
        self.server
    }

    fn truncate_output(&self) -> Result<(), SessionError> {
        let inner = self.lock();
        if let Some(output) = inner.output.as_ref() {
            output
                .get_ref()
                .set_len(0)
                .map_err(|e| SessionError::OutputUnavailable(self.path.clone(), e))?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ClientInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Receivable for StreamingClient {
    fn on_receive(&self, handle: SocketHandle) -> Result<(), SessionError> {
        let (payload, peer) = match self.env.transport.receive_from(handle) {
            Ok(Some(datagram)) => datagram,
            Ok(None) => {
                tracing::trace!(%handle, "receive notification with nothing pending");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(%handle, error = %e, "receive failed");
                return Ok(());
            }
        };

        let now = self.env.scheduler.now();
        if self.log.observe(now) {
            tracing::info!(
                elapsed = now.as_secs_f64(),
                ip = %peer.ip(),
                port = peer.port(),
                bytes = payload.len(),
                "client received block"
            );
        }
        tracing::trace!(peer = %peer, digest = %chunk_digest(&payload), "block digest");

        let mut inner = self.lock();
        let Some(output) = inner.output.as_mut() else {
            return Ok(());
        };
        if let Err(e) = output.write_all(&payload) {
            tracing::warn!(output = %self.path.display(), error = %e, "failed to append block");
            return Ok(());
        }
        inner.bytes_received += payload.len() as u64;
        inner.chunks_received += 1;
        inner.state = ClientState::Receiving;
        Ok(())
    }
}
