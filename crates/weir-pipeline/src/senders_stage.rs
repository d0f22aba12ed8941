//! Sender stage: the recovery cursor.
//!
//! Sender recovery itself belongs to the execution collaborator; the
//! pipeline only tracks how far it may be assumed complete, gated on
//! header progress. The synchronizer reads this stage's progress as its
//! stop bound.

use weir_core::error::WeirError;
use weir_core::kv::WriteTx;
use weir_core::types::BlockNumber;
use weir_store::progress;

use crate::stage::{StageId, StageRun, SyncStage};

pub struct SenderStage;

impl SyncStage for SenderStage {
    fn id(&self) -> StageId {
        StageId::Senders
    }

    fn forward(&mut self, tx: &mut WriteTx, run: StageRun) -> Result<BlockNumber, WeirError> {
        let headers_done = progress::load(tx, StageId::Headers.as_str())?;
        Ok(run.target.min(headers_done).max(run.from))
    }

    fn unwind(&mut self, _tx: &mut WriteTx, _to: BlockNumber) -> Result<(), WeirError> {
        // Cursor only; the pipeline rewrites the progress value.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weir_core::kv::MemoryKv;

    #[test]
    fn gated_on_header_progress() {
        let mut tx = WriteTx::begin(Arc::new(MemoryKv::new()));
        let mut stage = SenderStage;

        // No headers yet: stays put.
        assert_eq!(stage.forward(&mut tx, StageRun { from: 0, target: 9 }).unwrap(), 0);

        progress::save(&mut tx, StageId::Headers.as_str(), 5);
        assert_eq!(stage.forward(&mut tx, StageRun { from: 0, target: 9 }).unwrap(), 5);
        assert_eq!(stage.forward(&mut tx, StageRun { from: 0, target: 3 }).unwrap(), 3);
    }
}
