//! Historical (as-of) state view.
//!
//! Resolves the value a key had immediately after a pinned block,
//! without any historical snapshot: the history index locates the first
//! recorded mutation after the pin, and that block's change set holds
//! the key's prior value — which is the value as of the pin, since
//! nothing touched the key in between. Keys never mutated after the pin
//! read from live plain state.
//!
//! The view is read-only and never mutated by replay; state writes a
//! replayed block produces are captured, not applied.

use weir_core::changeset::Category;
use weir_core::error::ExecError;
use weir_core::kv::KvRead;
use weir_core::traits::StateView;
use weir_core::types::BlockNumber;

use crate::{changeset_store, history_store, tables};

/// Read-only state view pinned to the end of a block.
pub struct HistoricalStateView<'a> {
    view: &'a dyn KvRead,
    pinned: BlockNumber,
}

impl<'a> HistoricalStateView<'a> {
    /// Pin a view to the state as of the end of `pinned`.
    pub fn new(view: &'a dyn KvRead, pinned: BlockNumber) -> Self {
        Self { view, pinned }
    }

    /// The block this view is pinned to.
    pub fn pinned_block(&self) -> BlockNumber {
        self.pinned
    }

    fn read_as_of(&self, category: Category, key: &[u8]) -> Result<Option<Vec<u8>>, ExecError> {
        let next_change =
            history_store::first_at_or_after(self.view, category, key, self.pinned + 1)
                .map_err(|e| ExecError::View(e.to_string()))?;

        match next_change {
            Some(block) => {
                let set = changeset_store::fetch(self.view, block, category)
                    .map_err(|e| ExecError::View(e.to_string()))?
                    .ok_or_else(|| {
                        ExecError::View(format!(
                            "history names block {block} but no {category} change set is persisted"
                        ))
                    })?;
                let change = set.iter().find(|c| c.key == key).ok_or_else(|| {
                    ExecError::View(format!(
                        "history names block {block} but its {category} change set lacks key 0x{}",
                        hex::encode(key)
                    ))
                })?;
                if change.value.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(change.value.clone()))
                }
            }
            None => self
                .view
                .get(tables::state_table(category), key)
                .map_err(|e| ExecError::View(e.to_string())),
        }
    }
}

impl StateView for HistoricalStateView<'_> {
    fn read_account(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ExecError> {
        self.read_as_of(Category::Account, key)
    }

    fn read_storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ExecError> {
        self.read_as_of(Category::Storage, key)
    }
}
