//! Stage progress cursors.
//!
//! One big-endian u64 per stage name, the sole durable record of how far
//! each pipeline stage has advanced. 0 means the stage never ran.

use weir_core::error::{StoreError, WeirError};
use weir_core::kv::{KvRead, WriteTx};
use weir_core::types::BlockNumber;

use crate::tables::STAGE_PROGRESS;

/// Last block the named stage fully processed, 0 if it never ran.
pub fn load(view: &dyn KvRead, stage: &str) -> Result<BlockNumber, WeirError> {
    match view.get(STAGE_PROGRESS, stage.as_bytes())? {
        Some(bytes) => {
            let array: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                StoreError::Backend(format!("invalid progress value for stage {stage}"))
            })?;
            Ok(u64::from_be_bytes(array))
        }
        None => Ok(0),
    }
}

/// Record the stage's new progress.
pub fn save(tx: &mut WriteTx, stage: &str, block: BlockNumber) {
    tx.put(STAGE_PROGRESS, stage.as_bytes().to_vec(), block.to_be_bytes().to_vec());
}
