//! The small-step synchronizer: bounded forward/unwind churn with
//! capture-vs-persisted verification on every window.
//!
//! Each iteration commits the transaction, plans a window, installs a
//! one-shot bounded override on the execution stage with the capture
//! hook wired in, runs the pipeline, compares every captured block
//! against the persisted change sets, verifies the history index, and
//! unwinds the tail once the stop block is reached. Any divergence is
//! fatal; cancellation is polled at the top of each iteration and is
//! not an error.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use weir_core::changeset::{Category, ChangeSet};
use weir_core::error::WeirError;
use weir_core::kv::{KvBackend, WriteTx};
use weir_core::traits::{BlockExecutor, ChangeSetHook};
use weir_core::types::BlockNumber;
use weir_pipeline::exec::{execute_window, ExecConfig, ExecutionStage};
use weir_pipeline::headers_stage::HeaderStage;
use weir_pipeline::senders_stage::SenderStage;
use weir_pipeline::{Pipeline, StageId};

use crate::check;
use crate::config::SmallStepConfig;
use crate::plan::plan_iteration;

/// Expected change sets captured per block, account and storage maps.
type ExpectedMaps =
    Arc<Mutex<(BTreeMap<BlockNumber, ChangeSet>, BTreeMap<BlockNumber, ChangeSet>)>>;

/// Where a finished (or interrupted) run left the execution cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmallStepOutcome {
    /// Final execution progress; the resumable position when
    /// interrupted.
    pub progress: BlockNumber,
    /// Whether the run stopped on the cancellation flag.
    pub interrupted: bool,
}

/// Orchestrates repeated bounded forward-then-unwind cycles over the
/// stage pipeline.
pub struct SmallStepSync {
    pipeline: Pipeline,
    executor: Arc<dyn BlockExecutor>,
    config: SmallStepConfig,
    cancel: Arc<AtomicBool>,
}

impl SmallStepSync {
    /// Build the synchronizer and its pipeline.
    ///
    /// # Errors
    ///
    /// Configuration faults surface here, before any work happens.
    pub fn new(
        executor: Arc<dyn BlockExecutor>,
        config: SmallStepConfig,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self, WeirError> {
        config.validate()?;
        let pipeline = Pipeline::new(vec![
            Box::new(HeaderStage::new(executor.clone())),
            Box::new(SenderStage),
            Box::new(ExecutionStage::new(
                executor.clone(),
                exec_config(&config),
                cancel.clone(),
            )),
        ]);
        Ok(Self { pipeline, executor, config, cancel })
    }

    /// Drive the loop to the stop block, verifying every window.
    pub fn run(&mut self, backend: Arc<dyn KvBackend>) -> Result<SmallStepOutcome, WeirError> {
        let mut tx = WriteTx::begin(backend);

        // Bring the upstream stages to the stop bound once, then freeze
        // them; the loop drives only the execution stage.
        let head = self.executor.last_block();
        let bound = if self.config.stop_block > 0 {
            self.config.stop_block.min(head)
        } else {
            head
        };
        self.pipeline.disable_stages(&[StageId::Execution]);
        self.pipeline.run(&mut tx, bound)?;
        self.pipeline.enable_stage(StageId::Execution);
        self.pipeline.disable_stages(&[StageId::Headers, StageId::Senders]);

        // Stop at the sender-stage progress, tightened by the operator's
        // stop block when one is set.
        let senders_done = self.pipeline.progress(&tx, StageId::Senders)?;
        let stop_at = if self.config.stop_block > 0 {
            senders_done.min(self.config.stop_block)
        } else {
            senders_done
        };
        let mut depth = self.config.unwind_depth;
        info!(stop_at, depth, step = self.config.unwind_every, "small-step sync starting");

        let expected: ExpectedMaps = Arc::new(Mutex::new((BTreeMap::new(), BTreeMap::new())));

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                tx.commit_and_begin()?;
                let progress = self.pipeline.progress(&tx, StageId::Execution)?;
                info!(progress, "small-step sync interrupted");
                return Ok(SmallStepOutcome { progress, interrupted: true });
            }
            tx.commit_and_begin()?;

            let exec_at = self.pipeline.progress(&tx, StageId::Execution)?;
            if exec_at >= stop_at && depth == 0 {
                break;
            }

            let plan = plan_iteration(exec_at, stop_at, depth, self.config.unwind_every);
            if plan.clipped && depth > 0 {
                debug!("window clipped to stop block, no further unwinding");
                depth = 0;
            }

            self.install_execution_override(plan.target, &expected);
            self.pipeline.run(&mut tx, plan.target)?;

            // Consume the captured blocks and hold them against what the
            // stores actually persisted.
            let (account_maps, storage_maps) = {
                let mut maps = expected.lock();
                (std::mem::take(&mut maps.0), std::mem::take(&mut maps.1))
            };
            for (&block, expected_accounts) in &account_maps {
                check::check_change_sets(
                    &tx,
                    block,
                    Some(expected_accounts),
                    storage_maps.get(&block),
                )?;
            }
            check::check_history(&tx, Category::Account, exec_at)?;
            check::check_history(&tx, Category::Storage, exec_at)?;

            if let Some(to) = plan.unwind_to {
                info!(from = plan.target, to, "unwinding tail for re-execution");
                self.pipeline.unwind_to(&mut tx, to)?;
                depth = 0;
            }
        }

        tx.commit_and_begin()?;
        let progress = self.pipeline.progress(&tx, StageId::Execution)?;
        info!(progress, "small-step sync complete");
        Ok(SmallStepOutcome { progress, interrupted: false })
    }

    /// Install the one-shot bounded override with the capture hook.
    fn install_execution_override(&mut self, cap: BlockNumber, expected: &ExpectedMaps) {
        let executor = self.executor.clone();
        let config = exec_config(&self.config);
        let cancel = self.cancel.clone();
        let expected = expected.clone();
        self.pipeline.install_override(
            StageId::Execution,
            Box::new(move |tx, run| {
                let mut hook: ChangeSetHook<'_> = Box::new(move |number, accounts, storages| {
                    let mut maps = expected.lock();
                    maps.0.insert(number, accounts.clone());
                    maps.1.insert(number, storages.clone());
                });
                let to = cap.min(run.target).min(executor.last_block());
                execute_window(tx, &*executor, run.from, to, &config, Some(&mut hook), &cancel)
            }),
        );
    }
}

fn exec_config(config: &SmallStepConfig) -> ExecConfig {
    ExecConfig {
        write_receipts: config.write_receipts,
        commit_threshold: config.batch_size as usize,
    }
}
