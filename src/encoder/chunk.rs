// SPDX-License-Identifier: GPL-3.0-only

//! Append-only storage for encoded chunks
//!
//! Chunks are opaque; the only thing this layer guarantees is that they are
//! kept in arrival order. The final artifact is the in-order concatenation.

/// One unit of encoded data, numbered by arrival
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Arrival sequence number, starting at 0
    pub seq: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkArena {
    chunks: Vec<EncodedChunk>,
    total_bytes: usize,
}

impl ChunkArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return it
    ///
    /// Empty buffers carry no data and are not recorded.
    pub fn push(&mut self, data: Vec<u8>) -> Option<&EncodedChunk> {
        if data.is_empty() {
            return None;
        }
        let seq = self.chunks.len() as u64;
        self.total_bytes += data.len();
        self.chunks.push(EncodedChunk { seq, data });
        self.chunks.last()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncodedChunk> {
        self.chunks.iter()
    }

    /// Concatenate all chunks in arrival order
    pub fn concat(&self) -> Vec<u8> {
        self.chunks
            .iter()
            .fold(Vec::with_capacity(self.total_bytes), |mut out, chunk| {
                out.extend_from_slice(&chunk.data);
                out
            })
    }
}
