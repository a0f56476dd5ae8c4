//! Streaming server — answers any datagram by streaming its payload back.
//!
//! There is no request format. Whatever arrives on the listening socket is
//! taken as "stream to me": after one cadence tick the first chunk goes out
//! to the sender, and each send schedules the next until the chunk source
//! runs dry. The source is shared by every stream on this server.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use trickle_core::chunk::TEXT_CHUNK_SIZE;
use trickle_core::config::{ServerSettings, STREAMING_PORT};
use trickle_core::{
    chunk_digest, ChunkSource, Endpoint, Environment, LogGate, Node, SessionError, SocketHandle,
};

use crate::registry::{Receivable, SessionRegistry};

/// Registry type for server sessions.
pub type ServerRegistry = SessionRegistry<StreamingServer>;

/// Inter-chunk delay of the reference cadence.
pub const DEFAULT_CADENCE: Duration = Duration::from_millis(60);

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub port: u16,
    pub payload: Option<PathBuf>,
    pub chunk_size: usize,
    pub cadence: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: STREAMING_PORT,
            payload: None,
            chunk_size: TEXT_CHUNK_SIZE,
            cadence: DEFAULT_CADENCE,
        }
    }
}

impl From<&ServerSettings> for ServerOptions {
    fn from(s: &ServerSettings) -> Self {
        Self {
            port: s.port,
            payload: s.payload.clone(),
            chunk_size: s.chunk_size,
            cadence: s.cadence(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No request received yet.
    Idle,
    /// At least one stream has chunks left to send.
    Streaming,
    /// Requests were served and the chunk source is empty.
    Exhausted,
}

/// Per-peer stream bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub requests: usize,
    pub chunks_sent: usize,
    pub bytes_sent: usize,
    pub exhausted: bool,
}

pub struct StreamingServer {
    handle: SocketHandle,
    local: Endpoint,
    cadence: Duration,
    env: Environment,
    registry: ServerRegistry,
    log: LogGate,
    inner: Mutex<ServerInner>,
}

struct ServerInner {
    source: ChunkSource,
    streams: HashMap<Endpoint, StreamStats>,
    closed: bool,
}

impl StreamingServer {
    /// Load the payload, bind the listening socket, and register.
    ///
    /// The payload is validated and chunked before the transport is
    /// touched, so a bad path fails without side effects.
    pub fn start(
        node: &Node,
        options: ServerOptions,
        env: Environment,
        registry: ServerRegistry,
        log: LogGate,
    ) -> Result<Arc<Self>, SessionError> {
        let payload = options.payload.ok_or(SessionError::MissingPayload)?;
        let source = ChunkSource::load(&payload, options.chunk_size)?;

        let handle = env.transport.create_endpoint(node)?;
        let local = match env.transport.bind(handle, options.port) {
            Ok(local) => local,
            Err(e) => {
                env.transport.close(handle);
                return Err(e.into());
            }
        };

        tracing::info!(
            %local,
            payload = %payload.display(),
            bytes = source.total_bytes(),
            chunks = source.remaining(),
            chunk_size = source.chunk_size(),
            "streaming server listening"
        );

        let server = Arc::new(Self {
            handle,
            local,
            cadence: options.cadence,
            env: env.clone(),
            registry: registry.clone(),
            log,
            inner: Mutex::new(ServerInner {
                source,
                streams: HashMap::new(),
                closed: false,
            }),
        });

        if let Err(e) = registry.register(handle, server.clone()) {
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

        Ok(server)
    }

    /// Send the next chunk to `dest` and schedule the one after it.
    /// Returns without rescheduling once the source is exhausted.
    pub fn send_block(&self, dest: Endpoint) -> Result<(), SessionError> {
        let chunk = {
            let mut inner = self.lock();
            if inner.source.is_exhausted() {
                let stream = inner.streams.entry(dest).or_default();
                if !stream.exhausted {
                    stream.exhausted = true;
                    tracing::debug!(
                        peer = %dest,
                        chunks_sent = stream.chunks_sent,
                        bytes_sent = stream.bytes_sent,
                        "stream exhausted"
                    );
                }
                return Ok(());
            }
            let Some(chunk) = inner.source.pop_next() else {
                return Ok(());
            };
            let stream = inner.streams.entry(dest).or_default();
            stream.chunks_sent += 1;
            stream.bytes_sent += chunk.len();
            chunk
        };

        let len = chunk.len();
        let digest = chunk_digest(&chunk);
        if let Err(e) = self.env.transport.send_to(self.handle, chunk, dest) {
            // No acknowledgement and no retry: a failed send is a lost chunk.
            tracing::debug!(peer = %dest, error = %e, "block send failed");
        }

        let now = self.env.scheduler.now();
        if self.log.observe(now) {
            tracing::info!(
                elapsed = now.as_secs_f64(),
                ip = %dest.ip(),
                port = dest.port(),
                bytes = len,
                "server sent block"
            );
        }
        tracing::trace!(peer = %dest, digest = %digest, "block digest");

        self.schedule_send_block(dest);
        Ok(())
    }

    /// Queue `send_block(dest)` one cadence tick from now. The task finds
    /// this server again through the registry.
    fn schedule_send_block(&self, dest: Endpoint) {
        let registry = self.registry.clone();
        let handle = self.handle;
        self.env.scheduler.schedule_after(
            self.cadence,
            Box::new(move || registry.lookup(handle)?.send_block(dest)),
        );
    }

    /// Deregister and release the socket. Any send task still queued for
    /// this server will fail its registry lookup.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        self.registry.unregister(self.handle);
        self.env.transport.close(self.handle);
        tracing::info!(local = %self.local, streams = inner.streams.len(), "streaming server closed");
    }

    pub fn state(&self) -> ServerState {
        let inner = self.lock();
        if inner.streams.is_empty() {
            ServerState::Idle
        } else if inner.source.is_exhausted() {
            ServerState::Exhausted
        } else {
            ServerState::Streaming
        }
    }

    pub fn chunks_remaining(&self) -> usize {
        self.lock().source.remaining()
    }

    pub fn stream_stats(&self, peer: Endpoint) -> Option<StreamStats> {
        self.lock().streams.get(&peer).cloned()
    }

    pub fn handle(&self) -> SocketHandle {
        self.handle
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    fn lock(&self) -> MutexGuard<'_, ServerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Receivable for StreamingServer {
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
                "server received request"
            );
        }

        self.lock().streams.entry(peer).or_default().requests += 1;
        self.schedule_send_block(peer);
        Ok(())
    }
}
