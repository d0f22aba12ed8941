//! The pipeline walker: enabled stages forward in order, unwind in
//! reverse, one-shot overrides consumed as they are used.

use std::collections::HashMap;

use tracing::{debug, info};

use weir_core::error::WeirError;
use weir_core::kv::{KvRead, WriteTx};
use weir_core::types::BlockNumber;
use weir_store::progress;

use crate::stage::{OneShotForward, StageId, StageRun, SyncStage};

struct StageSlot {
    stage: Box<dyn SyncStage>,
    enabled: bool,
}

/// Ordered, named sequence of synchronization stages.
pub struct Pipeline {
    stages: Vec<StageSlot>,
    overrides: HashMap<StageId, OneShotForward>,
}

impl Pipeline {
    /// Build a pipeline from stages in dependency order.
    pub fn new(stages: Vec<Box<dyn SyncStage>>) -> Self {
        Self {
            stages: stages.into_iter().map(|stage| StageSlot { stage, enabled: true }).collect(),
            overrides: HashMap::new(),
        }
    }

    /// Disable stages: their progress freezes and both forward and
    /// unwind passes skip them.
    pub fn disable_stages(&mut self, ids: &[StageId]) {
        for slot in &mut self.stages {
            if ids.contains(&slot.stage.id()) {
                slot.enabled = false;
            }
        }
    }

    /// Re-enable a stage.
    pub fn enable_stage(&mut self, id: StageId) {
        for slot in &mut self.stages {
            if slot.stage.id() == id {
                slot.enabled = true;
            }
        }
    }

    /// Install a single-use forward override for one stage. Consumed on
    /// first use; the stage reverts to its default operation afterwards.
    pub fn install_override(&mut self, id: StageId, forward: OneShotForward) {
        self.overrides.insert(id, forward);
    }

    /// Current progress of a stage.
    pub fn progress(&self, view: &dyn KvRead, id: StageId) -> Result<BlockNumber, WeirError> {
        progress::load(view, id.as_str())
    }

    /// Walk enabled stages in order, advancing each to `target`.
    ///
    /// A failing stage aborts the pass immediately; stages that already
    /// ran keep the progress they committed.
    pub fn run(&mut self, tx: &mut WriteTx, target: BlockNumber) -> Result<(), WeirError> {
        for slot in &mut self.stages {
            let id = slot.stage.id();
            if !slot.enabled {
                debug!(stage = %id, "stage disabled, skipping");
                continue;
            }
            let from = progress::load(tx, id.as_str())?;
            if from >= target {
                debug!(stage = %id, from, target, "stage already at target");
                continue;
            }
            let run = StageRun { from, target };
            let reached = match self.overrides.remove(&id) {
                Some(forward) => forward(tx, run)?,
                None => slot.stage.forward(tx, run)?,
            };
            progress::save(tx, id.as_str(), reached);
            info!(stage = %id, from, to = reached, "stage advanced");
        }
        Ok(())
    }

    /// Walk enabled stages in reverse order, unwinding each whose
    /// progress exceeds `target`.
    pub fn unwind_to(&mut self, tx: &mut WriteTx, target: BlockNumber) -> Result<(), WeirError> {
        for slot in self.stages.iter_mut().rev() {
            let id = slot.stage.id();
            if !slot.enabled {
                debug!(stage = %id, "stage disabled, skipping unwind");
                continue;
            }
            let from = progress::load(tx, id.as_str())?;
            if from <= target {
                continue;
            }
            slot.stage.unwind(tx, target)?;
            progress::save(tx, id.as_str(), target);
            info!(stage = %id, from, to = target, "stage unwound");
        }
        Ok(())
    }
}
