//! The capture-vs-persisted checkers shared by both oracles.

use tracing::error;

use weir_core::changeset::{Category, Change, ChangeSet};
use weir_core::error::{IntegrityError, WeirError};
use weir_core::kv::KvRead;
use weir_core::types::BlockNumber;
use weir_store::{changeset_store, history_store};

fn describe(change: &Option<Change>) -> String {
    match change {
        Some(change) => change.to_string(),
        None => "<missing>".to_string(),
    }
}

/// Compare captured change sets for one block against the persisted
/// ones, both categories, positionally. An absent side reads as empty.
///
/// # Errors
///
/// [`IntegrityError::ChangeSetMismatch`] naming the block, category,
/// index, and both sides in hex; the first divergence is also logged as
/// a structured report.
pub fn check_change_sets(
    view: &dyn KvRead,
    block: BlockNumber,
    expected_accounts: Option<&ChangeSet>,
    expected_storages: Option<&ChangeSet>,
) -> Result<(), WeirError> {
    for (category, expected) in
        [(Category::Account, expected_accounts), (Category::Storage, expected_storages)]
    {
        let empty = ChangeSet::new(category, block);
        let expected = expected.unwrap_or(&empty);
        let persisted =
            changeset_store::fetch(view, block, category)?.unwrap_or_else(|| empty.clone());

        if let Some(divergence) = expected.compare(&persisted) {
            let expected_entry = describe(&divergence.expected);
            let actual_entry = describe(&divergence.actual);
            error!(
                block,
                %category,
                index = divergence.index,
                expected = %expected_entry,
                actual = %actual_entry,
                "change set mismatch"
            );
            return Err(IntegrityError::ChangeSetMismatch {
                block,
                category,
                index: divergence.index,
                expected: expected_entry,
                actual: actual_entry,
            }
            .into());
        }
    }
    Ok(())
}

/// Verify that every key in the persisted change sets of a category,
/// from `from_block` upward, has an exact history-index entry at its
/// block.
///
/// # Errors
///
/// [`IntegrityError::MissingHistoryEntry`] on the first key whose
/// mutation is not recorded.
pub fn check_history(
    view: &dyn KvRead,
    category: Category,
    from_block: BlockNumber,
) -> Result<(), WeirError> {
    changeset_store::scan(view, from_block, category, &mut |block, set| {
        for change in set.iter() {
            let hit = history_store::search(view, category, &change.key, block)?;
            if !hit.found {
                let key = hex::encode(&change.key);
                error!(block, %category, key = %key, "missing history index entry");
                return Err(IntegrityError::MissingHistoryEntry { block, category, key }.into());
            }
        }
        Ok(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weir_core::kv::{MemoryKv, WriteTx};

    fn set(category: Category, block: BlockNumber, entries: &[(&[u8], &[u8])]) -> ChangeSet {
        let mut cs = ChangeSet::new(category, block);
        for (k, v) in entries {
            cs.append(k.to_vec(), v.to_vec()).unwrap();
        }
        cs
    }

    #[test]
    fn matching_sets_pass() {
        let mut tx = WriteTx::begin(Arc::new(MemoryKv::new()));
        let accounts = set(Category::Account, 4, &[(b"k", b"v")]);
        let storages = set(Category::Storage, 4, &[]);
        changeset_store::append(&mut tx, &accounts).unwrap();
        changeset_store::append(&mut tx, &storages).unwrap();

        check_change_sets(&tx, 4, Some(&accounts), Some(&storages)).unwrap();
    }

    #[test]
    fn empty_expected_against_absent_persisted_passes() {
        let tx = WriteTx::begin(Arc::new(MemoryKv::new()));
        check_change_sets(&tx, 9, None, None).unwrap();

        let empty = set(Category::Account, 9, &[]);
        check_change_sets(&tx, 9, Some(&empty), None).unwrap();
    }

    #[test]
    fn tampered_value_is_a_mismatch() {
        let mut tx = WriteTx::begin(Arc::new(MemoryKv::new()));
        let expected = set(Category::Account, 4, &[(b"k", b"v")]);
        changeset_store::append(&mut tx, &set(Category::Account, 4, &[(b"k", b"TAMPERED")]))
            .unwrap();

        let err = check_change_sets(&tx, 4, Some(&expected), None).unwrap_err();
        match err {
            WeirError::Integrity(IntegrityError::ChangeSetMismatch {
                block, category, index, ..
            }) => {
                assert_eq!(block, 4);
                assert_eq!(category, Category::Account);
                assert_eq!(index, 0);
            }
            other => panic!("expected ChangeSetMismatch, got {other:?}"),
        }
    }

    #[test]
    fn missing_persisted_entry_is_a_mismatch() {
        let tx = WriteTx::begin(Arc::new(MemoryKv::new()));
        let expected = set(Category::Storage, 6, &[(b"k", b"v")]);
        let err = check_change_sets(&tx, 6, None, Some(&expected)).unwrap_err();
        assert!(matches!(
            err,
            WeirError::Integrity(IntegrityError::ChangeSetMismatch {
                category: Category::Storage,
                ..
            })
        ));
    }

    #[test]
    fn history_check_passes_when_recorded() {
        let mut tx = WriteTx::begin(Arc::new(MemoryKv::new()));
        let cs = set(Category::Account, 5, &[(b"twenty-byte-key-0000", b"v")]);
        changeset_store::append(&mut tx, &cs).unwrap();
        history_store::record_mutation(&mut tx, Category::Account, b"twenty-byte-key-0000", 5)
            .unwrap();

        check_history(&tx, Category::Account, 1).unwrap();
    }

    /// A change set persisted for block 5 with key 0xAA but no history
    /// entry must fail citing block 5 and the key.
    #[test]
    fn missing_history_entry_cites_block_and_key() {
        let mut tx = WriteTx::begin(Arc::new(MemoryKv::new()));
        let cs = set(Category::Account, 5, &[(&[0xAA], &[0x01])]);
        changeset_store::append(&mut tx, &cs).unwrap();

        let err = check_history(&tx, Category::Account, 1).unwrap_err();
        match err {
            WeirError::Integrity(IntegrityError::MissingHistoryEntry { block, key, .. }) => {
                assert_eq!(block, 5);
                assert_eq!(key, "aa");
            }
            other => panic!("expected MissingHistoryEntry, got {other:?}"),
        }
    }

    #[test]
    fn history_check_ignores_blocks_below_start() {
        let mut tx = WriteTx::begin(Arc::new(MemoryKv::new()));
        // Block 2 has no history entry, but the check starts at 3.
        changeset_store::append(&mut tx, &set(Category::Account, 2, &[(&[0xAA], &[1])]))
            .unwrap();
        check_history(&tx, Category::Account, 3).unwrap();
        assert!(check_history(&tx, Category::Account, 2).is_err());
    }
}
