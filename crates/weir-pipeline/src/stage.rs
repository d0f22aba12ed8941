//! Stage identities and the stage contract.

use std::fmt;

use weir_core::error::WeirError;
use weir_core::kv::WriteTx;
use weir_core::types::BlockNumber;

/// The pipeline's stages, in declared dependency order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageId {
    /// Header retrieval from the block source.
    Headers,
    /// Sender-recovery cursor (the recovery itself is external).
    Senders,
    /// Block execution and audit-trail capture.
    Execution,
}

impl StageId {
    /// All stages in dependency order.
    pub const ORDER: [StageId; 3] = [StageId::Headers, StageId::Senders, StageId::Execution];

    /// Stable name used as the progress key.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Headers => "headers",
            StageId::Senders => "senders",
            StageId::Execution => "execution",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input of one forward invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageRun {
    /// The stage's current progress.
    pub from: BlockNumber,
    /// The block to advance to, inclusive.
    pub target: BlockNumber,
}

/// One unit of the synchronization pipeline.
///
/// A stage advances from its own recorded progress to a target and can
/// unwind back to an earlier block. Both directions run inside the
/// transaction they are handed; a failing stage aborts the whole
/// pipeline pass, keeping whatever progress it committed.
pub trait SyncStage: Send {
    fn id(&self) -> StageId;

    /// Advance from `run.from` towards `run.target`; returns the new
    /// progress (which may fall short of the target if the stage ran
    /// out of input or was cancelled).
    fn forward(&mut self, tx: &mut WriteTx, run: StageRun) -> Result<BlockNumber, WeirError>;

    /// Roll the stage's effects back so that only blocks `<= to` remain.
    fn unwind(&mut self, tx: &mut WriteTx, to: BlockNumber) -> Result<(), WeirError>;
}

/// A single-use replacement for one stage's forward operation.
///
/// Injected per run and consumed on first use; afterwards the stage's
/// default operation applies again. The small-step synchronizer uses
/// this to bound the execution stage to one window and wire in its
/// capture hook without touching the other stages.
pub type OneShotForward =
    Box<dyn FnOnce(&mut WriteTx, StageRun) -> Result<BlockNumber, WeirError> + Send>;
