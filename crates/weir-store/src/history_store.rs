//! Persistent chunked history index.
//!
//! For each (category, key) the index records every block number at
//! which the key was mutated, chunked per [`weir_core::history`]. Sealed
//! chunks are keyed by `key || last_block`; the open chunk lives at
//! `key || u64::MAX` so a seek for any block lands on the chunk covering
//! it. The index answers the engine's central audit question: was this
//! key's mutation at block B actually recorded?

use std::cmp::Ordering;

use weir_core::changeset::Category;
use weir_core::error::{StoreError, WeirError};
use weir_core::history::{HistoryChunk, ACTIVE_CHUNK_BOUNDARY};
use weir_core::kv::{KvRead, WriteTx};
use weir_core::types::BlockNumber;

use crate::tables;

/// Result of an exact-match history search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryHit {
    /// Whether the exact block number is recorded for the key.
    pub found: bool,
    /// The matched block number, when found.
    pub matched_block: Option<BlockNumber>,
    /// Boundary of the chunk that was inspected, if one covered the key.
    pub chunk_boundary: Option<u64>,
}

impl HistoryHit {
    fn miss() -> Self {
        Self { found: false, matched_block: None, chunk_boundary: None }
    }
}

fn decode_chunk(key: &[u8], boundary: u64, bytes: &[u8]) -> Result<HistoryChunk, StoreError> {
    HistoryChunk::decode(bytes).map_err(|e| StoreError::ChunkDecode {
        key: hex::encode(key),
        boundary,
        reason: e.0,
    })
}

/// Record that `key` was mutated at `block`.
///
/// Appends to the key's open chunk, sealing it under its last block once
/// full. A repeat of the current block is a no-op; older blocks are
/// caller-discipline violations and are ignored the same way.
pub fn record_mutation(
    tx: &mut WriteTx,
    category: Category,
    key: &[u8],
    block: BlockNumber,
) -> Result<(), WeirError> {
    let table = tables::history_table(category);
    let active_key = tables::history_key(key, ACTIVE_CHUNK_BOUNDARY);

    let mut chunk = match tx.get(table, &active_key)? {
        Some(bytes) => decode_chunk(key, ACTIVE_CHUNK_BOUNDARY, &bytes)?,
        None => HistoryChunk::new(),
    };
    if !chunk.push(block) {
        return Ok(());
    }
    if chunk.is_full() {
        let boundary = chunk.last().unwrap();
        tx.put(table, tables::history_key(key, boundary), chunk.encode());
        tx.delete(table, active_key);
    } else {
        tx.put(table, active_key, chunk.encode());
    }
    Ok(())
}

/// Locate the chunk of `key` whose boundary is at or above `block`.
///
/// Keys of other lengths can interleave in byte order; the scan skips
/// them and stops once it has walked past `key`'s range. Returns the
/// chunk and its boundary, or `None` when the key has no covering chunk.
fn covering_chunk(
    view: &dyn KvRead,
    category: Category,
    key: &[u8],
    block: BlockNumber,
) -> Result<Option<(u64, HistoryChunk)>, WeirError> {
    let table = tables::history_table(category);
    let mut hit: Option<(u64, HistoryChunk)> = None;
    let mut decode_fault: Option<StoreError> = None;

    view.scan_from(table, &tables::history_key(key, block), &mut |raw, bytes| {
        let shared = raw.len().min(key.len());
        match raw[..shared].cmp(&key[..shared]) {
            Ordering::Greater => return Ok(false),
            Ordering::Less | Ordering::Equal => {}
        }
        if let Some((chunk_key, boundary)) = tables::split_history_key(raw, key.len()) {
            if chunk_key == key {
                match decode_chunk(key, boundary, bytes) {
                    Ok(chunk) => hit = Some((boundary, chunk)),
                    Err(e) => decode_fault = Some(e),
                }
                return Ok(false);
            }
        }
        Ok(true)
    })?;

    if let Some(fault) = decode_fault {
        return Err(fault.into());
    }
    Ok(hit)
}

/// Exact-match search: is a mutation of `key` recorded at `block`?
///
/// This is the primary integrity primitive: every key appearing in a
/// persisted change set for block N must satisfy
/// `search(key, N).found == true`.
pub fn search(
    view: &dyn KvRead,
    category: Category,
    key: &[u8],
    block: BlockNumber,
) -> Result<HistoryHit, WeirError> {
    match covering_chunk(view, category, key, block)? {
        Some((boundary, chunk)) => Ok(HistoryHit {
            found: chunk.contains(block),
            matched_block: chunk.first_at_or_after(block),
            chunk_boundary: Some(boundary),
        }),
        None => Ok(HistoryHit::miss()),
    }
}

/// First recorded mutation of `key` at or after `block`, if any.
///
/// Backs the historical state view: the change set at the returned block
/// holds the key's value as of any point before it.
pub fn first_at_or_after(
    view: &dyn KvRead,
    category: Category,
    key: &[u8],
    block: BlockNumber,
) -> Result<Option<BlockNumber>, WeirError> {
    match covering_chunk(view, category, key, block)? {
        Some((_, chunk)) => Ok(chunk.first_at_or_after(block)),
        None => Ok(None),
    }
}

/// Remove recorded mutations of `key` at or above `from_block`.
///
/// Entries below `from_block` in the first affected chunk survive as the
/// key's new open chunk; chunks that end up empty are deleted.
pub fn truncate(
    tx: &mut WriteTx,
    category: Category,
    key: &[u8],
    from_block: BlockNumber,
) -> Result<(), WeirError> {
    let table = tables::history_table(category);

    // Collect every chunk of this key with a boundary at or above
    // from_block; the first one may straddle the cut, later ones are
    // entirely above it.
    let mut affected: Vec<(u64, Vec<u8>)> = Vec::new();
    tx.scan_from(table, &tables::history_key(key, from_block), &mut |raw, bytes| {
        let shared = raw.len().min(key.len());
        if raw[..shared].cmp(&key[..shared]) == Ordering::Greater {
            return Ok(false);
        }
        if let Some((chunk_key, boundary)) = tables::split_history_key(raw, key.len()) {
            if chunk_key == key {
                affected.push((boundary, bytes.to_vec()));
            }
        }
        Ok(true)
    })?;

    let Some((first_boundary, first_bytes)) = affected.first().cloned() else {
        return Ok(());
    };

    let mut retained = decode_chunk(key, first_boundary, &first_bytes)?;
    retained.truncate_from(from_block);

    for (boundary, _) in &affected {
        tx.delete(table, tables::history_key(key, *boundary));
    }
    if !retained.is_empty() {
        tx.put(table, tables::history_key(key, ACTIVE_CHUNK_BOUNDARY), retained.encode());
    }
    Ok(())
}
