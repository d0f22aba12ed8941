//! Trait interfaces between the verification engine and its collaborators.
//!
//! - [`StateView`] — read-only state a block executes against
//! - [`StateWriter`] — where execution sends its state writes; the
//!   recording strategy is [`ChangeSetWriter`], the discarding one is
//!   [`NoopWriter`], selected per call
//! - [`BlockExecutor`] — the opaque execution collaborator ("execute
//!   block N against view V, produce receipts and state effects")

use std::collections::HashMap;

use crate::changeset::{Category, ChangeSet};
use crate::error::{ChangeSetError, ExecError};
use crate::types::{BlockNumber, HeaderRecord, Receipt};

/// Read-only state view a block executes against.
///
/// For live execution this reads the transaction's plain-state tables;
/// for historical replay it is pinned to a past block and resolved
/// through the history index (weir-store).
pub trait StateView {
    /// Current value of an account-level key. `None` if absent.
    fn read_account(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ExecError>;

    /// Current value of a storage-level key. `None` if absent.
    fn read_storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ExecError>;
}

/// Sink for the state writes a block produces.
///
/// `original` is the value the key had before the block, `value` the
/// value it has afterwards (`None` = deleted). Implementations decide
/// whether to record, apply, or ignore.
pub trait StateWriter {
    fn write_account(
        &mut self,
        key: &[u8],
        original: Option<&[u8]>,
        value: Option<&[u8]>,
    ) -> Result<(), ExecError>;

    fn write_storage(
        &mut self,
        key: &[u8],
        original: Option<&[u8]>,
        value: Option<&[u8]>,
    ) -> Result<(), ExecError>;
}

/// Writer that ignores every state write.
///
/// Used by replay when change-set checking is disabled: execution still
/// runs and receipts are still derived, but nothing is captured.
pub struct NoopWriter;

impl StateWriter for NoopWriter {
    fn write_account(
        &mut self,
        _key: &[u8],
        _original: Option<&[u8]>,
        _value: Option<&[u8]>,
    ) -> Result<(), ExecError> {
        Ok(())
    }

    fn write_storage(
        &mut self,
        _key: &[u8],
        _original: Option<&[u8]>,
        _value: Option<&[u8]>,
    ) -> Result<(), ExecError> {
        Ok(())
    }
}

/// One pending state update captured by a [`ChangeSetWriter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateUpdate {
    pub category: Category,
    pub key: Vec<u8>,
    /// New value; `None` deletes the key.
    pub value: Option<Vec<u8>>,
}

/// Everything one block's execution produced, ready to persist.
#[derive(Clone, Debug)]
pub struct CapturedChanges {
    /// Account-category change set (prior values, first-touch order).
    pub accounts: ChangeSet,
    /// Storage-category change set (prior values, first-touch order).
    pub storages: ChangeSet,
    /// New values to apply to plain state, in first-touch order.
    pub updates: Vec<StateUpdate>,
}

#[derive(Default)]
struct CapturedColumn {
    order: Vec<Vec<u8>>,
    entries: HashMap<Vec<u8>, (Vec<u8>, Option<Vec<u8>>)>,
}

impl CapturedColumn {
    fn write(&mut self, key: &[u8], original: Option<&[u8]>, value: Option<&[u8]>) {
        match self.entries.get_mut(key) {
            // Repeated write to one key within a block collapses to a
            // single change: first-seen prior value, latest new value.
            Some((_, latest)) => *latest = value.map(<[u8]>::to_vec),
            None => {
                self.order.push(key.to_vec());
                self.entries.insert(
                    key.to_vec(),
                    (original.map_or_else(Vec::new, <[u8]>::to_vec), value.map(<[u8]>::to_vec)),
                );
            }
        }
    }

    fn drain(mut self, category: Category, block: BlockNumber, updates: &mut Vec<StateUpdate>)
        -> Result<ChangeSet, ChangeSetError>
    {
        let mut set = ChangeSet::new(category, block);
        for key in self.order {
            let (original, latest) = self.entries.remove(&key).unwrap();
            set.append(key.clone(), original)?;
            updates.push(StateUpdate { category, key, value: latest });
        }
        Ok(set)
    }
}

/// Writer that records every state write as change-set entries.
///
/// The recording strategy of the dual write path: it captures the prior
/// value per key (collapsing repeated writes) and buffers the new values
/// without applying them — the caller decides whether the buffered
/// updates ever reach plain state.
pub struct ChangeSetWriter {
    block: BlockNumber,
    accounts: CapturedColumn,
    storages: CapturedColumn,
}

impl ChangeSetWriter {
    /// Create a writer capturing the given block.
    pub fn new(block: BlockNumber) -> Self {
        Self { block, accounts: CapturedColumn::default(), storages: CapturedColumn::default() }
    }

    /// Finish capturing and hand back change sets plus buffered updates.
    pub fn into_captured(self) -> Result<CapturedChanges, ChangeSetError> {
        let mut updates = Vec::new();
        let accounts = self.accounts.drain(Category::Account, self.block, &mut updates)?;
        // Keep account updates ahead of storage updates; within a
        // category the first-touch order is preserved.
        let storages = self.storages.drain(Category::Storage, self.block, &mut updates)?;
        Ok(CapturedChanges { accounts, storages, updates })
    }
}

impl StateWriter for ChangeSetWriter {
    fn write_account(
        &mut self,
        key: &[u8],
        original: Option<&[u8]>,
        value: Option<&[u8]>,
    ) -> Result<(), ExecError> {
        self.accounts.write(key, original, value);
        Ok(())
    }

    fn write_storage(
        &mut self,
        key: &[u8],
        original: Option<&[u8]>,
        value: Option<&[u8]>,
    ) -> Result<(), ExecError> {
        self.storages.write(key, original, value);
        Ok(())
    }
}

/// Per-block callback handed the captured change sets before they are
/// persisted. The small-step synchronizer uses it to build the expected
/// side of its comparison.
pub type ChangeSetHook<'a> =
    Box<dyn FnMut(BlockNumber, &ChangeSet, &ChangeSet) + Send + 'a>;

/// The opaque execution collaborator.
///
/// Supplies block metadata and executes blocks against a state view,
/// streaming state writes to the given writer and returning receipts.
pub trait BlockExecutor: Send + Sync {
    /// Highest block number the collaborator can supply.
    fn last_block(&self) -> BlockNumber;

    /// Header record for a block; `None` past the chain head.
    fn header(&self, number: BlockNumber) -> Result<Option<HeaderRecord>, ExecError>;

    /// Execute a block. Reads prior state from `view`, reports every
    /// state write to `writer`, returns the block's receipts.
    fn execute(
        &self,
        number: BlockNumber,
        view: &dyn StateView,
        writer: &mut dyn StateWriter,
    ) -> Result<Vec<Receipt>, ExecError>;
}
