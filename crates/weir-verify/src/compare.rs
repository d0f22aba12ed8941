//! Whole-state comparison against a reference store.
//!
//! Run after the small-step loop completes when a reference chaindata
//! is supplied: the state and audit tables must match entry for entry.

use std::collections::BTreeMap;

use tracing::error;

use weir_core::error::{IntegrityError, WeirError};
use weir_core::kv::KvRead;
use weir_store::tables;

/// Tables covered by the final comparison. Progress cursors and
/// receipts are allowed to differ between runs; state and audit
/// records are not.
pub const COMPARED_TABLES: &[&str] = &[
    tables::ACCOUNT_STATE,
    tables::STORAGE_STATE,
    tables::ACCOUNT_CHANGES,
    tables::STORAGE_CHANGES,
    tables::ACCOUNT_HISTORY,
    tables::STORAGE_HISTORY,
];

fn snapshot(view: &dyn KvRead, table: &'static str) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, WeirError> {
    let mut out = BTreeMap::new();
    view.scan_from(table, &[], &mut |key, value| {
        out.insert(key.to_vec(), value.to_vec());
        Ok(true)
    })?;
    Ok(out)
}

/// Compare the state and audit tables of two stores.
///
/// # Errors
///
/// [`IntegrityError::StateDivergence`] naming the table, key, and both
/// sides of the first difference; also logged as a structured report.
pub fn compare_backends(left: &dyn KvRead, right: &dyn KvRead) -> Result<(), WeirError> {
    for table in COMPARED_TABLES {
        let left_entries = snapshot(left, table)?;
        let right_entries = snapshot(right, table)?;

        for key in left_entries.keys().chain(right_entries.keys()) {
            let left_value = left_entries.get(key);
            let right_value = right_entries.get(key);
            if left_value != right_value {
                let describe = |value: Option<&Vec<u8>>| match value {
                    Some(value) => format!("0x{}", hex::encode(value)),
                    None => "<absent>".to_string(),
                };
                let (left_repr, right_repr) = (describe(left_value), describe(right_value));
                error!(
                    table,
                    key = %hex::encode(key),
                    left = %left_repr,
                    right = %right_repr,
                    "state divergence against reference store"
                );
                return Err(IntegrityError::StateDivergence {
                    table: (*table).to_string(),
                    key: hex::encode(key),
                    left: left_repr,
                    right: right_repr,
                }
                .into());
            }
        }
    }
    Ok(())
}
