//! Header stage: copies header records from the block source.

use std::sync::Arc;

use weir_core::error::{StoreError, WeirError};
use weir_core::kv::WriteTx;
use weir_core::traits::BlockExecutor;
use weir_core::types::BlockNumber;
use weir_store::headers;

use crate::stage::{StageId, StageRun, SyncStage};

/// Persists `(number, receipt digest)` records so downstream audit
/// passes can run without the block source.
pub struct HeaderStage {
    source: Arc<dyn BlockExecutor>,
}

impl HeaderStage {
    pub fn new(source: Arc<dyn BlockExecutor>) -> Self {
        Self { source }
    }
}

impl SyncStage for HeaderStage {
    fn id(&self) -> StageId {
        StageId::Headers
    }

    fn forward(&mut self, tx: &mut WriteTx, run: StageRun) -> Result<BlockNumber, WeirError> {
        let to = run.target.min(self.source.last_block()).max(run.from);
        for number in run.from + 1..=to {
            let record = self
                .source
                .header(number)?
                .ok_or(StoreError::MissingHeader(number))?;
            headers::put(tx, &record)?;
        }
        Ok(to)
    }

    fn unwind(&mut self, tx: &mut WriteTx, to: BlockNumber) -> Result<(), WeirError> {
        headers::truncate(tx, to + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weir_core::kv::MemoryKv;
    use weir_core::synthetic::SyntheticChain;

    #[test]
    fn forward_persists_headers_up_to_source_head() {
        let chain = Arc::new(SyntheticChain::generate(1, 4).unwrap());
        let mut stage = HeaderStage::new(chain.clone());
        let mut tx = WriteTx::begin(Arc::new(MemoryKv::new()));

        let reached = stage.forward(&mut tx, StageRun { from: 0, target: 10 }).unwrap();
        assert_eq!(reached, 4);
        for number in 1..=4 {
            let record = headers::fetch(&tx, number).unwrap().unwrap();
            assert_eq!(record, chain.header(number).unwrap().unwrap());
        }
        assert!(headers::fetch(&tx, 5).unwrap().is_none());
    }

    #[test]
    fn forward_resumes_from_progress() {
        let chain = Arc::new(SyntheticChain::generate(1, 6).unwrap());
        let mut stage = HeaderStage::new(chain);
        let mut tx = WriteTx::begin(Arc::new(MemoryKv::new()));

        stage.forward(&mut tx, StageRun { from: 0, target: 3 }).unwrap();
        stage.forward(&mut tx, StageRun { from: 3, target: 6 }).unwrap();
        assert!(headers::fetch(&tx, 6).unwrap().is_some());
    }

    #[test]
    fn unwind_truncates_headers() {
        let chain = Arc::new(SyntheticChain::generate(1, 5).unwrap());
        let mut stage = HeaderStage::new(chain);
        let mut tx = WriteTx::begin(Arc::new(MemoryKv::new()));

        stage.forward(&mut tx, StageRun { from: 0, target: 5 }).unwrap();
        stage.unwind(&mut tx, 2).unwrap();

        assert!(headers::fetch(&tx, 2).unwrap().is_some());
        assert!(headers::fetch(&tx, 3).unwrap().is_none());
    }
}
