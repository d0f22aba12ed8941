//! Table registry and key encodings.
//!
//! Block-keyed tables use 8-byte big-endian keys so range scans yield
//! block order; history tables append an 8-byte big-endian chunk
//! boundary to the state key.

use weir_core::changeset::Category;
use weir_core::types::BlockNumber;

// --- Table names ---

pub const ACCOUNT_STATE: &str = "account_state";
pub const STORAGE_STATE: &str = "storage_state";
pub const ACCOUNT_CHANGES: &str = "account_changes";
pub const STORAGE_CHANGES: &str = "storage_changes";
pub const ACCOUNT_HISTORY: &str = "account_history";
pub const STORAGE_HISTORY: &str = "storage_history";
pub const HEADERS: &str = "headers";
pub const RECEIPTS: &str = "receipts";
pub const STAGE_PROGRESS: &str = "stage_progress";

/// All table names, in column-family declaration order.
pub const ALL_TABLES: &[&str] = &[
    ACCOUNT_STATE,
    STORAGE_STATE,
    ACCOUNT_CHANGES,
    STORAGE_CHANGES,
    ACCOUNT_HISTORY,
    STORAGE_HISTORY,
    HEADERS,
    RECEIPTS,
    STAGE_PROGRESS,
];

/// Plain-state table of a category.
pub fn state_table(category: Category) -> &'static str {
    match category {
        Category::Account => ACCOUNT_STATE,
        Category::Storage => STORAGE_STATE,
    }
}

/// Change-set table of a category.
pub fn change_set_table(category: Category) -> &'static str {
    match category {
        Category::Account => ACCOUNT_CHANGES,
        Category::Storage => STORAGE_CHANGES,
    }
}

/// History-index table of a category.
pub fn history_table(category: Category) -> &'static str {
    match category {
        Category::Account => ACCOUNT_HISTORY,
        Category::Storage => STORAGE_HISTORY,
    }
}

/// Encode a block number as a big-endian key for ordered iteration.
pub fn block_key(number: BlockNumber) -> [u8; 8] {
    number.to_be_bytes()
}

/// Decode a big-endian block key. `None` if the length is wrong.
pub fn decode_block_key(bytes: &[u8]) -> Option<BlockNumber> {
    let array: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(array))
}

/// Encode a history-index key: state key || chunk boundary (BE).
pub fn history_key(key: &[u8], boundary: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 8);
    out.extend_from_slice(key);
    out.extend_from_slice(&boundary.to_be_bytes());
    out
}

/// Split a history-index key into (state key, boundary) for a known
/// state-key length. `None` if the lengths do not line up.
pub fn split_history_key(raw: &[u8], key_len: usize) -> Option<(&[u8], u64)> {
    if raw.len() != key_len + 8 {
        return None;
    }
    let boundary = u64::from_be_bytes(raw[key_len..].try_into().ok()?);
    Some((&raw[..key_len], boundary))
}
