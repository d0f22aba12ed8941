//! Execution stage: drives blocks through the execution collaborator and
//! keeps the audit trail consistent in both directions.
//!
//! Forward: per block, execute against the transaction's plain state
//! with a recording writer, hand the captured change sets to the hook
//! (before anything is persisted), apply the new values, persist change
//! sets, history-index mutations, and optionally receipts, and advance
//! the progress cursor. Unwind: restore prior values from the change
//! sets in reverse block order, then truncate change sets, history, and
//! receipts above the target.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use weir_core::changeset::Category;
use weir_core::error::{ExecError, WeirError};
use weir_core::kv::{KvRead, WriteTx};
use weir_core::traits::{BlockExecutor, ChangeSetHook, ChangeSetWriter, StateView};
use weir_core::types::BlockNumber;
use weir_store::{changeset_store, history_store, progress, receipts, tables};

use crate::stage::{StageId, StageRun, SyncStage};

/// Live state view over a transaction's plain-state tables.
pub struct TxStateView<'a> {
    tx: &'a WriteTx,
}

impl<'a> TxStateView<'a> {
    pub fn new(tx: &'a WriteTx) -> Self {
        Self { tx }
    }

    fn read(&self, category: Category, key: &[u8]) -> Result<Option<Vec<u8>>, ExecError> {
        self.tx
            .get(tables::state_table(category), key)
            .map_err(|e| ExecError::View(e.to_string()))
    }
}

impl StateView for TxStateView<'_> {
    fn read_account(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ExecError> {
        self.read(Category::Account, key)
    }

    fn read_storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ExecError> {
        self.read(Category::Storage, key)
    }
}

/// Execution-stage knobs.
#[derive(Clone, Debug)]
pub struct ExecConfig {
    /// Persist receipts alongside the audit trail.
    pub write_receipts: bool,
    /// Commit the transaction mid-window once this many bytes are
    /// pending. 0 disables mid-window commits.
    pub commit_threshold: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self { write_receipts: true, commit_threshold: 0 }
    }
}

/// Execute blocks `from+1 ..= to`, returning the new progress.
///
/// The cancellation flag is polled between blocks; a cancelled window
/// returns the progress it reached, which is not an error.
pub fn execute_window(
    tx: &mut WriteTx,
    executor: &dyn BlockExecutor,
    from: BlockNumber,
    to: BlockNumber,
    config: &ExecConfig,
    mut hook: Option<&mut ChangeSetHook<'_>>,
    cancel: &AtomicBool,
) -> Result<BlockNumber, WeirError> {
    let mut progress_now = from;
    for number in from + 1..=to {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        let (receipts_out, captured) = {
            let view = TxStateView::new(&*tx);
            let mut writer = ChangeSetWriter::new(number);
            let receipts_out = executor.execute(number, &view, &mut writer)?;
            (receipts_out, writer.into_captured()?)
        };

        // Ground truth goes to the hook before anything is persisted.
        if let Some(hook) = hook.as_deref_mut() {
            hook(number, &captured.accounts, &captured.storages);
        }

        for update in &captured.updates {
            let table = tables::state_table(update.category);
            match &update.value {
                Some(value) => tx.put(table, update.key.clone(), value.clone()),
                None => tx.delete(table, update.key.clone()),
            }
        }

        changeset_store::append(tx, &captured.accounts)?;
        changeset_store::append(tx, &captured.storages)?;
        for change in captured.accounts.iter() {
            history_store::record_mutation(tx, Category::Account, &change.key, number)?;
        }
        for change in captured.storages.iter() {
            history_store::record_mutation(tx, Category::Storage, &change.key, number)?;
        }
        if config.write_receipts {
            receipts::put(tx, number, &receipts_out)?;
        }

        progress::save(tx, StageId::Execution.as_str(), number);
        progress_now = number;

        if config.commit_threshold > 0 && tx.pending_bytes() >= config.commit_threshold {
            debug!(block = number, bytes = tx.pending_bytes(), "mid-window commit");
            tx.commit_and_begin()?;
        }
    }
    Ok(progress_now)
}

/// Roll execution back so only blocks `<= to` remain.
///
/// Prior values are restored from the change sets walking downward, so
/// the plain state ends at exactly the state after block `to`; then the
/// audit trail above `to` is truncated.
pub fn unwind_execution(tx: &mut WriteTx, to: BlockNumber) -> Result<(), WeirError> {
    let progress_now = progress::load(tx, StageId::Execution.as_str())?;
    if progress_now <= to {
        return Ok(());
    }

    let mut touched: Vec<(Category, Vec<u8>)> = Vec::new();
    for number in (to + 1..=progress_now).rev() {
        for category in Category::ALL {
            let Some(set) = changeset_store::fetch(tx, number, category)? else {
                continue;
            };
            for change in set.iter() {
                let table = tables::state_table(category);
                if change.value.is_empty() {
                    tx.delete(table, change.key.clone());
                } else {
                    tx.put(table, change.key.clone(), change.value.clone());
                }
                let entry = (category, change.key.clone());
                if !touched.contains(&entry) {
                    touched.push(entry);
                }
            }
        }
    }

    for (category, key) in &touched {
        history_store::truncate(tx, *category, key, to + 1)?;
    }
    changeset_store::truncate(tx, to + 1)?;
    receipts::truncate(tx, to + 1)?;
    Ok(())
}

/// The pipeline's execution stage.
pub struct ExecutionStage {
    executor: Arc<dyn BlockExecutor>,
    config: ExecConfig,
    cancel: Arc<AtomicBool>,
}

impl ExecutionStage {
    pub fn new(executor: Arc<dyn BlockExecutor>, config: ExecConfig, cancel: Arc<AtomicBool>) -> Self {
        Self { executor, config, cancel }
    }
}

impl SyncStage for ExecutionStage {
    fn id(&self) -> StageId {
        StageId::Execution
    }

    fn forward(&mut self, tx: &mut WriteTx, run: StageRun) -> Result<BlockNumber, WeirError> {
        let to = run.target.min(self.executor.last_block()).max(run.from);
        execute_window(tx, &*self.executor, run.from, to, &self.config, None, &self.cancel)
    }

    fn unwind(&mut self, tx: &mut WriteTx, to: BlockNumber) -> Result<(), WeirError> {
        unwind_execution(tx, to)
    }
}
