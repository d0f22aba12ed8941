//! Key-value storage abstraction and scoped transactions.
//!
//! The engine consumes storage through [`KvBackend`]: named tables of
//! byte keys to byte values with ordered scans and atomic batch writes.
//! [`MemoryKv`] is the in-memory implementation suitable for tests; the
//! production backend is RocksDB (weir-store).
//!
//! [`WriteTx`] layers a read-your-writes overlay on a backend and is the
//! unit of crash-atomicity for one synchronizer iteration. Dropping a
//! transaction discards uncommitted writes, so it is released on every
//! exit path.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{StoreError, WeirError};

/// A single write against a named table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    Put { table: &'static str, key: Vec<u8>, value: Vec<u8> },
    Delete { table: &'static str, key: Vec<u8> },
}

impl WriteOp {
    /// Approximate byte footprint, used for batch-size accounting.
    fn weight(&self) -> usize {
        match self {
            WriteOp::Put { key, value, .. } => key.len() + value.len() + 16,
            WriteOp::Delete { key, .. } => key.len() + 16,
        }
    }
}

/// Ordered reads over named tables.
///
/// `visit` receives `(key, value)` pairs in ascending key order starting
/// at `from` and returns `false` to stop early. Implemented both by
/// backends (committed data) and by [`WriteTx`] (committed data merged
/// with the pending overlay).
pub trait KvRead {
    /// Point lookup. Returns `None` for absent keys.
    fn get(&self, table: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Ordered scan from `from` (inclusive) to the end of the table.
    fn scan_from(
        &self,
        table: &'static str,
        from: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool, WeirError>,
    ) -> Result<(), WeirError>;
}

/// The opaque transactional storage collaborator.
pub trait KvBackend: KvRead + Send + Sync {
    /// Apply a batch of writes atomically.
    fn apply(&self, batch: Vec<WriteOp>) -> Result<(), StoreError>;
}

/// In-memory storage backend for testing.
///
/// Plain `BTreeMap`s behind a lock, no persistence, unbounded growth.
pub struct MemoryKv {
    tables: RwLock<HashMap<&'static str, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKv {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self { tables: RwLock::new(HashMap::new()) }
    }

    /// Number of entries in a table.
    pub fn table_len(&self, table: &'static str) -> usize {
        self.tables.read().get(table).map_or(0, |t| t.len())
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KvRead for MemoryKv {
    fn get(&self, table: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.tables.read().get(table).and_then(|t| t.get(key).cloned()))
    }

    fn scan_from(
        &self,
        table: &'static str,
        from: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool, WeirError>,
    ) -> Result<(), WeirError> {
        // Snapshot the range so visitors can read the backend again
        // without holding the table lock.
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = {
            let tables = self.tables.read();
            match tables.get(table) {
                Some(t) => t
                    .range::<[u8], _>((Bound::Included(from), Bound::Unbounded))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };
        for (key, value) in pairs {
            if !visit(&key, &value)? {
                break;
            }
        }
        Ok(())
    }
}

impl KvBackend for MemoryKv {
    fn apply(&self, batch: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        for op in batch {
            match op {
                WriteOp::Put { table, key, value } => {
                    tables.entry(table).or_default().insert(key, value);
                }
                WriteOp::Delete { table, key } => {
                    if let Some(t) = tables.get_mut(table) {
                        t.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Scoped read-write transaction over a backend.
///
/// Writes accumulate in an ordered overlay with read-your-writes
/// semantics (scans see the overlay merged over committed data).
/// [`commit_and_begin`](WriteTx::commit_and_begin) applies the overlay
/// atomically and starts a fresh transaction in place.
pub struct WriteTx {
    backend: Arc<dyn KvBackend>,
    overlay: BTreeMap<(&'static str, Vec<u8>), Option<Vec<u8>>>,
    pending: usize,
}

impl WriteTx {
    /// Begin a transaction against a backend.
    pub fn begin(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend, overlay: BTreeMap::new(), pending: 0 }
    }

    /// The backend this transaction commits into.
    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// Buffer a put.
    pub fn put(&mut self, table: &'static str, key: Vec<u8>, value: Vec<u8>) {
        self.pending += key.len() + value.len() + 16;
        self.overlay.insert((table, key), Some(value));
    }

    /// Buffer a delete.
    pub fn delete(&mut self, table: &'static str, key: Vec<u8>) {
        self.pending += key.len() + 16;
        self.overlay.insert((table, key), None);
    }

    /// Approximate bytes buffered since the last commit.
    pub fn pending_bytes(&self) -> usize {
        self.pending
    }

    /// Apply all buffered writes atomically and begin a new transaction.
    pub fn commit_and_begin(&mut self) -> Result<(), StoreError> {
        if self.overlay.is_empty() {
            return Ok(());
        }
        let batch: Vec<WriteOp> = std::mem::take(&mut self.overlay)
            .into_iter()
            .map(|((table, key), value)| match value {
                Some(value) => WriteOp::Put { table, key, value },
                None => WriteOp::Delete { table, key },
            })
            .collect();
        self.pending = 0;
        self.backend.apply(batch)
    }

    /// Apply all buffered writes and consume the transaction.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.commit_and_begin()
    }

    /// Discard all buffered writes; the transaction stays usable.
    pub fn rollback(&mut self) {
        self.overlay.clear();
        self.pending = 0;
    }
}

impl KvRead for WriteTx {
    fn get(&self, table: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(pending) = self.overlay.get(&(table, key.to_vec())) {
            return Ok(pending.clone());
        }
        self.backend.get(table, key)
    }

    fn scan_from(
        &self,
        table: &'static str,
        from: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool, WeirError>,
    ) -> Result<(), WeirError> {
        // Merge committed data with the overlay: overlay entries win, and
        // a pending delete hides the committed value.
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        self.backend.scan_from(table, from, &mut |key, value| {
            merged.insert(key.to_vec(), Some(value.to_vec()));
            Ok(true)
        })?;
        let lower = (table, from.to_vec());
        for ((t, key), value) in self.overlay.range(lower..) {
            if *t != table {
                break;
            }
            merged.insert(key.clone(), value.clone());
        }
        for (key, value) in merged {
            if let Some(value) = value {
                if !visit(&key, &value)? {
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Byte-accounted buffered writer, used for bulk receipt persistence.
///
/// Callers flush when [`pending_bytes`](BatchWriter::pending_bytes)
/// crosses their threshold and must perform a final
/// [`flush`](BatchWriter::flush) before returning.
pub struct BatchWriter {
    backend: Arc<dyn KvBackend>,
    ops: Vec<WriteOp>,
    bytes: usize,
}

impl BatchWriter {
    /// Create a writer against a backend.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend, ops: Vec::new(), bytes: 0 }
    }

    /// Buffer a put.
    pub fn put(&mut self, table: &'static str, key: Vec<u8>, value: Vec<u8>) {
        let op = WriteOp::Put { table, key, value };
        self.bytes += op.weight();
        self.ops.push(op);
    }

    /// Approximate bytes buffered since the last flush.
    pub fn pending_bytes(&self) -> usize {
        self.bytes
    }

    /// Apply all buffered writes atomically.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.ops.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.ops);
        self.bytes = 0;
        self.backend.apply(batch)
    }
}
