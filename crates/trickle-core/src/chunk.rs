//! Chunk source — a payload split into fixed-size datagram bodies.
//!
//! The whole payload is read once, up front, and sliced into windows of
//! `chunk_size` bytes (the last one may be shorter). Chunks are handed out
//! front to back and never come back: a source is consumed exactly once.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use bytes::Bytes;

/// Chunk size for text payloads.
pub const TEXT_CHUNK_SIZE: usize = 1000;

/// Chunk size for binary media payloads. Fits a 1500-byte MTU with
/// IP/UDP headers to spare.
pub const MEDIA_CHUNK_SIZE: usize = 1400;

/// Largest chunk that still fits in one datagram.
pub const MAX_CHUNK_SIZE: usize = crate::env::MAX_DATAGRAM_PAYLOAD;

#[derive(Debug, thiserror::Error)]
pub enum ChunkSourceError {
    #[error("payload not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("chunk size {0} outside 1..={max}", max = MAX_CHUNK_SIZE)]
    InvalidChunkSize(usize),
}

#[derive(Debug)]
pub struct ChunkSource {
    chunks: VecDeque<Bytes>,
    chunk_size: usize,
    total_bytes: usize,
}

impl ChunkSource {
    /// Read `path` fully and split it into chunks.
    pub fn load(path: &Path, chunk_size: usize) -> Result<Self, ChunkSourceError> {
        check_chunk_size(chunk_size)?;
        if !path.exists() {
            return Err(ChunkSourceError::NotFound(path.to_path_buf()));
        }
        let data = std::fs::read(path).map_err(|e| ChunkSourceError::Read(path.to_path_buf(), e))?;
        Self::from_bytes(Bytes::from(data), chunk_size)
    }

    /// Split an in-memory payload. Chunks share the payload's buffer.
    pub fn from_bytes(data: Bytes, chunk_size: usize) -> Result<Self, ChunkSourceError> {
        check_chunk_size(chunk_size)?;
        let total_bytes = data.len();
        let chunks = (0..total_bytes)
            .step_by(chunk_size)
            .map(|start| data.slice(start..(start + chunk_size).min(total_bytes)))
            .collect();
        Ok(Self {
            chunks,
            chunk_size,
            total_bytes,
        })
    }

    /// Remove and return the oldest unsent chunk. `None` once exhausted.
    pub fn pop_next(&mut self) -> Option<Bytes> {
        self.chunks.pop_front()
    }

    pub fn is_exhausted(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks not yet handed out.
    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Size of the payload the source was built from.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

fn check_chunk_size(chunk_size: usize) -> Result<(), ChunkSourceError> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(ChunkSourceError::InvalidChunkSize(chunk_size));
    }
    Ok(())
}

/// Short BLAKE3 fingerprint of a chunk, for trace logs.
pub fn chunk_digest(data: &[u8]) -> String {
    hex::encode(&blake3::hash(data).as_bytes()[..8])
}
