//! Change-set model: the ordered record of key/value deltas one block
//! caused in one state category.
//!
//! A change stores the *prior* value of the key (the value it had before
//! the block ran); an empty value means the key did not exist, so unwind
//! deletes it. Ordering is first-touch order and is canonical: comparisons
//! are positional, never set-based.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ChangeSetError, CodecError, ConfigError};
use crate::types::BlockNumber;

/// State-mutation category a change set belongs to.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub enum Category {
    /// Account-level state (balances, nonces, code hashes).
    Account,
    /// Contract-storage slots.
    Storage,
}

impl Category {
    /// Both categories, in canonical order.
    pub const ALL: [Category; 2] = [Category::Account, Category::Storage];

    /// Stable lowercase name, used in progress keys and operator output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Account => "account",
            Category::Storage => "storage",
        }
    }

    /// Resolve an operator-supplied category name.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownCategory`] for any name other than `account`
    /// or `storage`.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "account" => Ok(Category::Account),
            "storage" => Ok(Category::Storage),
            other => Err(ConfigError::UnknownCategory(other.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single key/value delta.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Change {
    /// State key, unique within one change set.
    pub key: Vec<u8>,
    /// Prior value of the key; empty if the key did not exist.
    pub value: Vec<u8>,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{} => 0x{}", hex::encode(&self.key), hex::encode(&self.value))
    }
}

/// First point of divergence between two change sets.
///
/// A side is `None` when the other sequence is longer and this index lies
/// past its end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Divergence {
    /// Position of the first mismatch.
    pub index: usize,
    /// Entry of the expected sequence at that position, if any.
    pub expected: Option<Change>,
    /// Entry of the actual sequence at that position, if any.
    pub actual: Option<Change>,
}

/// An ordered sequence of changes produced by exactly one block in one
/// category. Empty change sets are valid: a block that mutated nothing in
/// the category still yields (and persists) one.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ChangeSet {
    /// Category this set records.
    pub category: Category,
    /// Block that produced the set.
    pub block: BlockNumber,
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Create an empty change set for a block and category.
    pub fn new(category: Category, block: BlockNumber) -> Self {
        Self { category, block, changes: Vec::new() }
    }

    /// Append a delta, preserving insertion order.
    ///
    /// # Errors
    ///
    /// [`ChangeSetError::DuplicateKey`] if the key is already present —
    /// capture is expected to produce exactly one entry per key per block.
    pub fn append(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), ChangeSetError> {
        if self.changes.iter().any(|c| c.key == key) {
            return Err(ChangeSetError::DuplicateKey(hex::encode(&key)));
        }
        self.changes.push(Change { key, value });
        Ok(())
    }

    /// Number of deltas.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the block mutated nothing in this category.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Iterate deltas in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Element-wise positional comparison, `self` being the expected side.
    ///
    /// Returns the first mismatching index with both entries; a length
    /// mismatch is reported at the first index past the shorter sequence
    /// with `None` on the missing side. `None` means the sets are equal.
    pub fn compare(&self, actual: &ChangeSet) -> Option<Divergence> {
        let longest = self.changes.len().max(actual.changes.len());
        for index in 0..longest {
            let expected = self.changes.get(index);
            let actual_entry = actual.changes.get(index);
            if expected != actual_entry {
                return Some(Divergence {
                    index,
                    expected: expected.cloned(),
                    actual: actual_entry.cloned(),
                });
            }
        }
        None
    }

    /// Serialize to the canonical byte form. Lossless and order-preserving.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CodecError(e.to_string()))
    }

    /// Deserialize from the canonical byte form.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (set, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError(e.to_string()))?;
        Ok(set)
    }
}
