//! Historical replay verifier.
//!
//! Re-executes already-finalized blocks in read-only mode against as-of
//! views pinned to the preceding block, recomputes receipts and change
//! sets, and audits both against the persisted trail. State writes are
//! captured, never applied. An external interrupt finishes the current
//! block, flushes pending receipts, and reports the resumable position
//! as a success.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use weir_core::error::{IntegrityError, WeirError};
use weir_core::kv::{BatchWriter, KvBackend, KvRead};
use weir_core::traits::{BlockExecutor, ChangeSetWriter, NoopWriter};
use weir_core::types::{receipt_digest, BlockNumber};
use weir_store::headers;
use weir_store::historical::HistoricalStateView;
use weir_store::receipts;

use crate::check;
use crate::config::ReplayConfig;

/// What a replay pass covered and where it can resume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// First block not yet verified; pass as the next start block.
    pub next_block: BlockNumber,
    /// Blocks verified by this pass.
    pub blocks_checked: u64,
    /// Whether the pass stopped on the interrupt flag.
    pub interrupted: bool,
}

/// Independent re-execution oracle over finalized blocks.
pub struct ReplayVerifier {
    executor: Arc<dyn BlockExecutor>,
    config: ReplayConfig,
    interrupt: Arc<AtomicBool>,
}

impl ReplayVerifier {
    pub fn new(
        executor: Arc<dyn BlockExecutor>,
        config: ReplayConfig,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        Self { executor, config, interrupt }
    }

    /// Replay from the configured start block while header records
    /// exist.
    pub fn run(&self, backend: Arc<dyn KvBackend>) -> Result<ReplayOutcome, WeirError> {
        let started = Instant::now();
        let view: &dyn KvRead = &*backend;
        let mut batch = BatchWriter::new(backend.clone());
        let mut block = self.config.start_block.max(1);
        let mut blocks_checked = 0u64;
        let mut interrupted = false;

        loop {
            let Some(header) = headers::fetch(view, block)? else {
                break;
            };

            // Frozen prior state: pinned to the previous block, resolved
            // through the audit trail itself.
            let state = HistoricalStateView::new(view, block - 1);

            let (block_receipts, captured) = if self.config.check_changes {
                let mut writer = ChangeSetWriter::new(block);
                let block_receipts = self.executor.execute(block, &state, &mut writer)?;
                (block_receipts, Some(writer.into_captured()?))
            } else {
                let mut writer = NoopWriter;
                (self.executor.execute(block, &state, &mut writer)?, None)
            };

            let digest = receipt_digest(&block_receipts)?;
            if digest != header.receipt_digest {
                let expected = header.receipt_digest.to_string();
                let actual = digest.to_string();
                error!(block, expected = %expected, actual = %actual, "receipt digest mismatch");
                return Err(
                    IntegrityError::ReceiptDigestMismatch { block, expected, actual }.into()
                );
            }

            if let Some(captured) = &captured {
                check::check_change_sets(
                    view,
                    block,
                    Some(&captured.accounts),
                    Some(&captured.storages),
                )?;
            }

            if self.config.write_receipts {
                receipts::put_batched(&mut batch, block, &block_receipts)?;
                if batch.pending_bytes() as u64 >= self.config.batch_size {
                    info!(up_to_block = block, bytes = batch.pending_bytes(), "committing receipts");
                    batch.flush()?;
                }
            }

            blocks_checked += 1;
            block += 1;
            if blocks_checked % 1000 == 0 {
                info!(blocks = blocks_checked, "replay progress");
            }

            if self.interrupt.load(Ordering::Relaxed) {
                info!("interrupted, finishing up");
                interrupted = true;
                break;
            }
        }

        batch.flush()?;
        info!(
            blocks = blocks_checked,
            next_block = block,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "replay finished"
        );
        Ok(ReplayOutcome { next_block: block, blocks_checked, interrupted })
    }
}
