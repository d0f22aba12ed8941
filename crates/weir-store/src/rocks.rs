//! RocksDB-backed key-value storage.
//!
//! Implements [`KvBackend`] with one column family per table. Batches
//! apply through an atomic [`WriteBatch`] for crash safety.

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};

use weir_core::error::{StoreError, WeirError};
use weir_core::kv::{KvBackend, KvRead, WriteOp};

use crate::tables::ALL_TABLES;

/// RocksDB-backed persistent storage for the Weir audit trail.
pub struct RocksKv {
    db: DB,
}

impl RocksKv {
    /// Open or create a database at the given path.
    ///
    /// Creates all column families if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_TABLES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), "chaindata opened");
        Ok(Self { db })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family: {name}")))
    }
}

impl KvRead for RocksKv {
    fn get(&self, table: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf_handle(table)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn scan_from(
        &self,
        table: &'static str,
        from: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool, WeirError>,
    ) -> Result<(), WeirError> {
        let cf = self.cf_handle(table)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(from, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            if !visit(&key, &value)? {
                break;
            }
        }
        Ok(())
    }
}

impl KvBackend for RocksKv {
    fn apply(&self, batch: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut write_batch = WriteBatch::default();
        for op in batch {
            match op {
                WriteOp::Put { table, key, value } => {
                    let cf = self.cf_handle(table)?;
                    write_batch.put_cf(cf, key, value);
                }
                WriteOp::Delete { table, key } => {
                    let cf = self.cf_handle(table)?;
                    write_batch.delete_cf(cf, key);
                }
            }
        }
        self.db
            .write(write_batch)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::ACCOUNT_STATE;

    fn temp_kv() -> (RocksKv, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let kv = RocksKv::open(dir.path().join("chaindata")).unwrap();
        (kv, dir)
    }

    #[test]
    fn put_get_roundtrip() {
        let (kv, _dir) = temp_kv();
        kv.apply(vec![WriteOp::Put {
            table: ACCOUNT_STATE,
            key: vec![1, 2],
            value: vec![9],
        }])
        .unwrap();
        assert_eq!(kv.get(ACCOUNT_STATE, &[1, 2]).unwrap(), Some(vec![9]));
        assert_eq!(kv.get(ACCOUNT_STATE, &[1, 3]).unwrap(), None);
    }

    #[test]
    fn delete_removes() {
        let (kv, _dir) = temp_kv();
        kv.apply(vec![WriteOp::Put { table: ACCOUNT_STATE, key: vec![1], value: vec![1] }])
            .unwrap();
        kv.apply(vec![WriteOp::Delete { table: ACCOUNT_STATE, key: vec![1] }]).unwrap();
        assert_eq!(kv.get(ACCOUNT_STATE, &[1]).unwrap(), None);
    }

    #[test]
    fn scan_is_ordered_from_lower_bound() {
        let (kv, _dir) = temp_kv();
        kv.apply(vec![
            WriteOp::Put { table: ACCOUNT_STATE, key: vec![3], value: vec![3] },
            WriteOp::Put { table: ACCOUNT_STATE, key: vec![1], value: vec![1] },
            WriteOp::Put { table: ACCOUNT_STATE, key: vec![2], value: vec![2] },
        ])
        .unwrap();

        let mut keys = Vec::new();
        kv.scan_from(ACCOUNT_STATE, &[2], &mut |k, _| {
            keys.push(k.to_vec());
            Ok(true)
        })
        .unwrap();
        assert_eq!(keys, vec![vec![2], vec![3]]);
    }

    #[test]
    fn batch_is_atomic_across_tables() {
        let (kv, _dir) = temp_kv();
        kv.apply(vec![
            WriteOp::Put { table: crate::tables::HEADERS, key: vec![1], value: vec![1] },
            WriteOp::Put { table: crate::tables::RECEIPTS, key: vec![1], value: vec![2] },
        ])
        .unwrap();
        assert_eq!(kv.get(crate::tables::HEADERS, &[1]).unwrap(), Some(vec![1]));
        assert_eq!(kv.get(crate::tables::RECEIPTS, &[1]).unwrap(), Some(vec![2]));
    }

    #[test]
    fn reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chaindata");
        {
            let kv = RocksKv::open(&path).unwrap();
            kv.apply(vec![WriteOp::Put { table: ACCOUNT_STATE, key: vec![7], value: vec![7] }])
                .unwrap();
            kv.flush().unwrap();
        }
        let kv = RocksKv::open(&path).unwrap();
        assert_eq!(kv.get(ACCOUNT_STATE, &[7]).unwrap(), Some(vec![7]));
    }
}
