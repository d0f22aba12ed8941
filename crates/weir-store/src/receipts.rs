//! Persisted receipts.
//!
//! Written by the execution stage when receipts are enabled, and by the
//! replay verifier through its byte-bounded batch writer.

use weir_core::error::{CodecError, WeirError};
use weir_core::kv::{BatchWriter, KvRead, WriteTx};
use weir_core::types::{BlockNumber, Receipt};

use crate::tables;

fn encode(receipts: &[Receipt]) -> Result<Vec<u8>, CodecError> {
    bincode::encode_to_vec(receipts, bincode::config::standard())
        .map_err(|e| CodecError(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Vec<Receipt>, CodecError> {
    let (receipts, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| CodecError(e.to_string()))?;
    Ok(receipts)
}

/// Persist a block's receipts through a transaction.
pub fn put(tx: &mut WriteTx, block: BlockNumber, receipts: &[Receipt]) -> Result<(), WeirError> {
    tx.put(tables::RECEIPTS, tables::block_key(block).to_vec(), encode(receipts)?);
    Ok(())
}

/// Buffer a block's receipts into a batch writer.
pub fn put_batched(
    batch: &mut BatchWriter,
    block: BlockNumber,
    receipts: &[Receipt],
) -> Result<(), WeirError> {
    batch.put(tables::RECEIPTS, tables::block_key(block).to_vec(), encode(receipts)?);
    Ok(())
}

/// Load a block's receipts, if persisted.
pub fn fetch(view: &dyn KvRead, block: BlockNumber) -> Result<Option<Vec<Receipt>>, WeirError> {
    match view.get(tables::RECEIPTS, &tables::block_key(block))? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Remove all receipts at or above `from_block`.
pub fn truncate(tx: &mut WriteTx, from_block: BlockNumber) -> Result<(), WeirError> {
    let mut doomed = Vec::new();
    tx.scan_from(tables::RECEIPTS, &tables::block_key(from_block), &mut |key, _| {
        doomed.push(key.to_vec());
        Ok(true)
    })?;
    for key in doomed {
        tx.delete(tables::RECEIPTS, key);
    }
    Ok(())
}
