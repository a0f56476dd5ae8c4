//! trickle-core — shared types for the trickle streaming protocol.
//! Chunking, endpoint addressing, errors, configuration, and the
//! transport/scheduler seams every environment implements.

pub mod chunk;
pub mod config;
pub mod endpoint;
pub mod env;
pub mod error;
pub mod log_gate;

pub use chunk::{chunk_digest, ChunkSource, ChunkSourceError, MAX_CHUNK_SIZE};
pub use endpoint::{Endpoint, Node, SocketHandle};
pub use env::{
    Environment, ReceiveCallback, Scheduler, Task, Transport, TransportError, MAX_DATAGRAM_PAYLOAD,
};
pub use error::SessionError;
pub use log_gate::LogGate;
