//! Chunked history index encoding.
//!
//! For every mutated key the history index keeps the ordered list of block
//! numbers at which the key changed, partitioned into bounded chunks. A
//! sealed chunk is addressed by its last block number; the open chunk is
//! addressed by [`ACTIVE_CHUNK_BOUNDARY`]. Encoding details stay inside
//! this module: a chunk is a flat sequence of 8-byte big-endian block
//! numbers, strictly increasing.

use crate::error::CodecError;
use crate::types::BlockNumber;

/// Entries a chunk holds before it is sealed.
pub const CHUNK_CAPACITY: usize = 256;

/// Boundary marker of the open (unsealed) chunk of a key.
pub const ACTIVE_CHUNK_BOUNDARY: u64 = u64::MAX;

/// A decoded history chunk: strictly increasing block numbers for one key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryChunk {
    blocks: Vec<BlockNumber>,
}

impl HistoryChunk {
    /// Create an empty chunk.
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Decode a chunk from its stored byte form.
    ///
    /// # Errors
    ///
    /// [`CodecError`] if the length is not a multiple of 8 or the block
    /// numbers are not strictly increasing.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() % 8 != 0 {
            return Err(CodecError(format!(
                "chunk length {} not a multiple of 8",
                bytes.len()
            )));
        }
        let mut blocks = Vec::with_capacity(bytes.len() / 8);
        for entry in bytes.chunks_exact(8) {
            let block = u64::from_be_bytes(entry.try_into().unwrap());
            if let Some(&last) = blocks.last() {
                if block <= last {
                    return Err(CodecError(format!(
                        "chunk not strictly increasing: {block} after {last}"
                    )));
                }
            }
            blocks.push(block);
        }
        Ok(Self { blocks })
    }

    /// Encode to the stored byte form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.blocks.len() * 8);
        for block in &self.blocks {
            out.extend_from_slice(&block.to_be_bytes());
        }
        out
    }

    /// Append a block number.
    ///
    /// Returns `false` without modifying the chunk when the block is not
    /// greater than the last entry — a repeat of the current block is the
    /// expected no-op; anything older is a caller-discipline violation the
    /// store reports separately.
    pub fn push(&mut self, block: BlockNumber) -> bool {
        match self.blocks.last() {
            Some(&last) if block <= last => false,
            _ => {
                self.blocks.push(block);
                true
            }
        }
    }

    /// Exact-match search for a block number.
    pub fn contains(&self, block: BlockNumber) -> bool {
        self.blocks.binary_search(&block).is_ok()
    }

    /// First recorded block number at or after `block`, if any.
    pub fn first_at_or_after(&self, block: BlockNumber) -> Option<BlockNumber> {
        let idx = self.blocks.partition_point(|&b| b < block);
        self.blocks.get(idx).copied()
    }

    /// Drop every entry at or above `block`.
    pub fn truncate_from(&mut self, block: BlockNumber) {
        let idx = self.blocks.partition_point(|&b| b < block);
        self.blocks.truncate(idx);
    }

    /// Whether the chunk reached capacity and must be sealed.
    pub fn is_full(&self) -> bool {
        self.blocks.len() >= CHUNK_CAPACITY
    }

    /// Whether the chunk holds no entries.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Highest recorded block number.
    pub fn last(&self) -> Option<BlockNumber> {
        self.blocks.last().copied()
    }
}
