//! # weir-pipeline
//! The staged synchronization pipeline: named stages with independent
//! durable progress, walked forward to a target and unwound back in
//! reverse order, with the execution stage doing the state work and
//! keeping the audit trail (change sets, history index, receipts)
//! consistent in both directions.

pub mod exec;
pub mod headers_stage;
pub mod pipeline;
pub mod senders_stage;
pub mod stage;

pub use pipeline::Pipeline;
pub use stage::{OneShotForward, StageId, StageRun, SyncStage};
