//! Error types for the Weir verification engine.
//!
//! Every fault here requires human investigation: the engine is a
//! correctness oracle, so nothing is retried automatically. Cancellation
//! is not an error anywhere in this taxonomy.
use thiserror::Error;

use crate::changeset::Category;
use crate::types::BlockNumber;

/// Serialization/deserialization failure of a canonical encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("codec: {0}")]
pub struct CodecError(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChangeSetError {
    #[error("duplicate key in change set: 0x{0}")] DuplicateKey(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backend: {0}")] Backend(String),
    #[error("corrupt history chunk for key 0x{key} at boundary {boundary}: {reason}")]
    ChunkDecode { key: String, boundary: u64, reason: String },
    #[error("missing header record for block {0}")] MissingHeader(BlockNumber),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown change-set category: {0}")] UnknownCategory(String),
    #[error("malformed size parameter: {0}")] MalformedSize(String),
    #[error("unwind-every must be at least 1")] ZeroStep,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("no block at number {0}")] MissingBlock(BlockNumber),
    #[error("execution of block {block} failed: {reason}")]
    Execution { block: BlockNumber, reason: String },
    #[error("state view: {0}")] View(String),
}

/// Divergence between the live execution path and the persisted audit
/// trail. Always fatal to the current run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("{category} change set mismatch in block {block} at index {index}: expected {expected}, got {actual}")]
    ChangeSetMismatch {
        block: BlockNumber,
        category: Category,
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("no {category} history entry for key 0x{key} at block {block}")]
    MissingHistoryEntry { block: BlockNumber, category: Category, key: String },
    #[error("receipt digest mismatch for block {block}: expected {expected}, got {actual}")]
    ReceiptDigestMismatch { block: BlockNumber, expected: String, actual: String },
    #[error("state divergence in table {table} at key 0x{key}: left {left}, right {right}")]
    StateDivergence { table: String, key: String, left: String, right: String },
}

#[derive(Error, Debug)]
pub enum WeirError {
    #[error(transparent)] Codec(#[from] CodecError),
    #[error(transparent)] ChangeSet(#[from] ChangeSetError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] Exec(#[from] ExecError),
    #[error(transparent)] Integrity(#[from] IntegrityError),
}
