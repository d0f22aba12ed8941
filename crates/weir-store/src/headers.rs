//! Persisted header records.
//!
//! The header stage copies `(number, receipt digest)` records from the
//! block source; the replay verifier audits recomputed digests against
//! them.

use weir_core::error::WeirError;
use weir_core::kv::{KvRead, WriteTx};
use weir_core::types::{BlockNumber, HeaderRecord};

use crate::tables;

/// Persist a header record under its block number.
pub fn put(tx: &mut WriteTx, record: &HeaderRecord) -> Result<(), WeirError> {
    tx.put(tables::HEADERS, tables::block_key(record.number).to_vec(), record.encode()?);
    Ok(())
}

/// Load the header record for a block, if persisted.
pub fn fetch(view: &dyn KvRead, number: BlockNumber) -> Result<Option<HeaderRecord>, WeirError> {
    match view.get(tables::HEADERS, &tables::block_key(number))? {
        Some(bytes) => Ok(Some(HeaderRecord::decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Remove all header records at or above `from_block`.
pub fn truncate(tx: &mut WriteTx, from_block: BlockNumber) -> Result<(), WeirError> {
    let mut doomed = Vec::new();
    tx.scan_from(tables::HEADERS, &tables::block_key(from_block), &mut |key, _| {
        doomed.push(key.to_vec());
        Ok(true)
    })?;
    for key in doomed {
        tx.delete(tables::HEADERS, key);
    }
    Ok(())
}
