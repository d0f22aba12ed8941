//! # weir-verify
//! The consistency oracles. The small-step synchronizer churns the
//! pipeline forward and back in bounded windows, comparing captured
//! change sets against the persisted audit trail; the historical replay
//! verifier re-executes finalized blocks against as-of views and audits
//! the same trail from the other direction.

pub mod check;
pub mod compare;
pub mod config;
pub mod plan;
pub mod replay;
pub mod small_step;

pub use config::{parse_byte_size, ReplayConfig, SmallStepConfig};
pub use replay::{ReplayOutcome, ReplayVerifier};
pub use small_step::{SmallStepOutcome, SmallStepSync};
