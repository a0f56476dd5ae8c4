//! Session errors.
//!
//! Construction-time failures (missing payload, unusable output target)
//! are the only errors a user should ever see. `UnknownHandle` means a
//! callback fired for a session that was never registered or has already
//! been closed; it is a lifecycle bug and environments treat it as fatal.

use std::path::PathBuf;

use crate::chunk::ChunkSourceError;
use crate::endpoint::SocketHandle;
use crate::env::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no payload file specified")]
    MissingPayload,
    #[error("payload file not found: {0}")]
    PayloadNotFound(PathBuf),
    #[error("failed to read payload {0}: {1}")]
    PayloadRead(PathBuf, std::io::Error),
    #[error("chunk size {0} outside 1..={max}", max = crate::chunk::MAX_CHUNK_SIZE)]
    InvalidChunkSize(usize),
    #[error("no output file specified")]
    MissingOutput,
    #[error("cannot open output {0}: {1}")]
    OutputUnavailable(PathBuf, std::io::Error),
    #[error("failed to flush output {0}: {1}")]
    OutputWrite(PathBuf, std::io::Error),
    #[error("no session registered for {0}")]
    UnknownHandle(SocketHandle),
    #[error("{0} already has a registered session")]
    HandleInUse(SocketHandle),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// True for the configuration family: errors raised while validating
    /// a session's payload or output before any socket exists.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            SessionError::MissingPayload
                | SessionError::PayloadNotFound(_)
                | SessionError::PayloadRead(..)
                | SessionError::InvalidChunkSize(_)
                | SessionError::MissingOutput
                | SessionError::OutputUnavailable(..)
        )
    }
}

impl From<ChunkSourceError> for SessionError {
    fn from(e: ChunkSourceError) -> Self {
        match e {
            ChunkSourceError::NotFound(path) => SessionError::PayloadNotFound(path),
            ChunkSourceError::Read(path, io) => SessionError::PayloadRead(path, io),
            ChunkSourceError::InvalidChunkSize(n) => SessionError::InvalidChunkSize(n),
        }
    }
}
