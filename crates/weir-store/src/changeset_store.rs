//! Persistent change-set store.
//!
//! One serialized [`ChangeSet`] per (block, category), keyed by the
//! big-endian block number so scans walk in block order. Absent entries
//! read as empty sets at the call sites that compare.

use weir_core::changeset::{Category, ChangeSet};
use weir_core::error::WeirError;
use weir_core::kv::{KvRead, WriteTx};
use weir_core::types::BlockNumber;

use crate::tables;

/// Persist a change set under its (block, category) slot.
pub fn append(tx: &mut WriteTx, set: &ChangeSet) -> Result<(), WeirError> {
    let table = tables::change_set_table(set.category);
    tx.put(table, tables::block_key(set.block).to_vec(), set.encode()?);
    Ok(())
}

/// Load the change set persisted for a block, if any.
pub fn fetch(
    view: &dyn KvRead,
    block: BlockNumber,
    category: Category,
) -> Result<Option<ChangeSet>, WeirError> {
    let table = tables::change_set_table(category);
    match view.get(table, &tables::block_key(block))? {
        Some(bytes) => Ok(Some(ChangeSet::decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Walk persisted change sets of a category from `from_block` upward.
///
/// `visit` returns `false` to stop early. The walk is lazy and finite;
/// calling it again restarts from `from_block`.
pub fn scan(
    view: &dyn KvRead,
    from_block: BlockNumber,
    category: Category,
    visit: &mut dyn FnMut(BlockNumber, &ChangeSet) -> Result<bool, WeirError>,
) -> Result<(), WeirError> {
    let table = tables::change_set_table(category);
    view.scan_from(table, &tables::block_key(from_block), &mut |key, value| {
        let block = match tables::decode_block_key(key) {
            Some(block) => block,
            // Foreign-width key in a block-keyed table; nothing we wrote.
            None => return Ok(true),
        };
        let set = ChangeSet::decode(value)?;
        visit(block, &set)
    })
}

/// Remove all change sets at or above `from_block`, both categories.
pub fn truncate(tx: &mut WriteTx, from_block: BlockNumber) -> Result<(), WeirError> {
    for category in Category::ALL {
        let table = tables::change_set_table(category);
        let mut doomed = Vec::new();
        tx.scan_from(table, &tables::block_key(from_block), &mut |key, _| {
            doomed.push(key.to_vec());
            Ok(true)
        })?;
        for key in doomed {
            tx.delete(table, key);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weir_core::kv::MemoryKv;

    fn tx() -> WriteTx {
        WriteTx::begin(Arc::new(MemoryKv::new()))
    }

    fn set(category: Category, block: BlockNumber, entries: &[(&[u8], &[u8])]) -> ChangeSet {
        let mut cs = ChangeSet::new(category, block);
        for (k, v) in entries {
            cs.append(k.to_vec(), v.to_vec()).unwrap();
        }
        cs
    }

    #[test]
    fn append_fetch_roundtrip() {
        let mut tx = tx();
        let cs = set(Category::Account, 5, &[(b"k", b"v")]);
        append(&mut tx, &cs).unwrap();

        let back = fetch(&tx, 5, Category::Account).unwrap().unwrap();
        assert_eq!(back, cs);
        assert!(fetch(&tx, 5, Category::Storage).unwrap().is_none());
        assert!(fetch(&tx, 6, Category::Account).unwrap().is_none());
    }

    #[test]
    fn empty_set_persists_and_reads_back_empty() {
        let mut tx = tx();
        append(&mut tx, &ChangeSet::new(Category::Storage, 3)).unwrap();
        let back = fetch(&tx, 3, Category::Storage).unwrap().unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn scan_walks_in_block_order_from_start() {
        let mut tx = tx();
        for block in [9u64, 3, 6] {
            append(&mut tx, &set(Category::Account, block, &[(b"k", b"v")])).unwrap();
        }

        let mut seen = Vec::new();
        scan(&tx, 4, Category::Account, &mut |block, _| {
            seen.push(block);
            Ok(true)
        })
        .unwrap();
        assert_eq!(seen, vec![6, 9]);
    }

    #[test]
    fn scan_early_stop() {
        let mut tx = tx();
        for block in 1..=5u64 {
            append(&mut tx, &set(Category::Account, block, &[])).unwrap();
        }
        let mut seen = 0;
        scan(&tx, 1, Category::Account, &mut |_, _| {
            seen += 1;
            Ok(seen < 2)
        })
        .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn truncate_removes_at_and_above() {
        let mut tx = tx();
        for block in 1..=6u64 {
            append(&mut tx, &set(Category::Account, block, &[(b"a", b"1")])).unwrap();
            append(&mut tx, &set(Category::Storage, block, &[(b"s", b"2")])).unwrap();
        }

        truncate(&mut tx, 4).unwrap();

        for category in Category::ALL {
            for block in 1..=3u64 {
                assert!(fetch(&tx, block, category).unwrap().is_some());
            }
            for block in 4..=6u64 {
                assert!(fetch(&tx, block, category).unwrap().is_none(), "{category} {block}");
            }
        }
    }

    #[test]
    fn fetch_sees_uncommitted_appends() {
        let backend = Arc::new(MemoryKv::new());
        let mut tx = WriteTx::begin(backend.clone());
        append(&mut tx, &set(Category::Account, 2, &[(b"k", b"v")])).unwrap();

        // Visible through the transaction, not yet on the backend.
        assert!(fetch(&tx, 2, Category::Account).unwrap().is_some());
        assert!(fetch(&*backend, 2, Category::Account).unwrap().is_none());

        tx.commit_and_begin().unwrap();
        assert!(fetch(&*backend, 2, Category::Account).unwrap().is_some());
    }
}
