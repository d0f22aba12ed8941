//! Deterministic synthetic chain: the reference workload.
//!
//! Stands in for the execution collaborator in the harness binary and the
//! test suite. Every block's state writes and receipts are derived from
//! BLAKE3 of (seed, block number), so live execution, unwinding,
//! re-execution, and historical replay all reproduce byte-identical
//! change sets. Keys are drawn from small per-category key spaces so
//! blocks regularly update and delete keys touched by earlier blocks.

use crate::changeset::Category;
use crate::error::{CodecError, ExecError};
use crate::traits::{BlockExecutor, StateView, StateWriter};
use crate::types::{receipt_digest, BlockNumber, HeaderRecord, Receipt};

/// Distinct account keys the workload cycles through.
const ACCOUNT_KEY_SPACE: u8 = 16;
/// Distinct storage keys the workload cycles through.
const STORAGE_KEY_SPACE: u8 = 24;

/// One derived state write.
struct SynthOp {
    category: Category,
    key: Vec<u8>,
    /// New value; `None` deletes the key.
    value: Option<Vec<u8>>,
}

/// A deterministic chain of synthetic blocks.
pub struct SyntheticChain {
    seed: u64,
    headers: Vec<HeaderRecord>,
}

impl SyntheticChain {
    /// Derive a chain of `blocks` blocks from a seed.
    ///
    /// Header receipt digests are precomputed here with the same
    /// derivation [`execute`](BlockExecutor::execute) uses, mirroring a
    /// chain whose producers committed to their receipts.
    pub fn generate(seed: u64, blocks: u64) -> Result<Self, CodecError> {
        let mut headers = Vec::with_capacity(blocks as usize);
        for number in 1..=blocks {
            let receipts = receipts_for(seed, number);
            headers.push(HeaderRecord { number, receipt_digest: receipt_digest(&receipts)? });
        }
        Ok(Self { seed, headers })
    }

    /// The seed this chain was derived from.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl BlockExecutor for SyntheticChain {
    fn last_block(&self) -> BlockNumber {
        self.headers.len() as u64
    }

    fn header(&self, number: BlockNumber) -> Result<Option<HeaderRecord>, ExecError> {
        if number == 0 {
            return Ok(None);
        }
        Ok(self.headers.get(number as usize - 1).copied())
    }

    fn execute(
        &self,
        number: BlockNumber,
        view: &dyn StateView,
        writer: &mut dyn StateWriter,
    ) -> Result<Vec<Receipt>, ExecError> {
        if number == 0 || number > self.last_block() {
            return Err(ExecError::MissingBlock(number));
        }
        for op in block_ops(self.seed, number) {
            match op.category {
                Category::Account => {
                    let original = view.read_account(&op.key)?;
                    writer.write_account(&op.key, original.as_deref(), op.value.as_deref())?;
                }
                Category::Storage => {
                    let original = view.read_storage(&op.key)?;
                    writer.write_storage(&op.key, original.as_deref(), op.value.as_deref())?;
                }
            }
        }
        Ok(receipts_for(self.seed, number))
    }
}

fn material(seed: u64, number: BlockNumber, tag: u8, index: u8) -> [u8; 32] {
    let mut input = Vec::with_capacity(18);
    input.extend_from_slice(&seed.to_le_bytes());
    input.extend_from_slice(&number.to_le_bytes());
    input.push(tag);
    input.push(index);
    blake3::hash(&input).into()
}

fn account_key(seed: u64, slot: u8) -> Vec<u8> {
    let mut input = b"weir-account".to_vec();
    input.extend_from_slice(&seed.to_le_bytes());
    input.push(slot);
    blake3::hash(&input).as_bytes()[..20].to_vec()
}

fn storage_key(seed: u64, slot: u8) -> Vec<u8> {
    let mut input = b"weir-storage".to_vec();
    input.extend_from_slice(&seed.to_le_bytes());
    input.push(slot);
    blake3::hash(&input).as_bytes().to_vec()
}

/// Derive the state writes of one block.
fn block_ops(seed: u64, number: BlockNumber) -> Vec<SynthOp> {
    let shape = material(seed, number, b'#', 0);
    let account_ops = shape[0] % 4; // 0..=3, occasionally an empty category
    let storage_ops = shape[1] % 3; // 0..=2

    let mut ops = Vec::new();
    for index in 0..account_ops {
        let m = material(seed, number, b'a', index);
        ops.push(SynthOp {
            category: Category::Account,
            key: account_key(seed, m[0] % ACCOUNT_KEY_SPACE),
            value: (m[1] % 5 != 0).then(|| m[2..10].to_vec()),
        });
    }
    for index in 0..storage_ops {
        let m = material(seed, number, b's', index);
        ops.push(SynthOp {
            category: Category::Storage,
            key: storage_key(seed, m[0] % STORAGE_KEY_SPACE),
            value: (m[1] % 6 != 0).then(|| m[2..16].to_vec()),
        });
    }
    // Sometimes write the first account key twice in one block to
    // exercise the per-key collapse in capture.
    if shape[2] % 4 == 0 && account_ops > 0 {
        let m = material(seed, number, b'r', 0);
        ops.push(SynthOp {
            category: Category::Account,
            key: ops[0].key.clone(),
            value: Some(m[..8].to_vec()),
        });
    }
    ops
}

/// Derive the receipts of one block, one per state write.
fn receipts_for(seed: u64, number: BlockNumber) -> Vec<Receipt> {
    block_ops(seed, number)
        .iter()
        .enumerate()
        .map(|(index, op)| {
            let m = material(seed, number, b'x', index as u8);
            Receipt {
                success: m[0] % 7 != 0,
                gas_used: 21_000 + u64::from(m[1]) * 64 + op.key.len() as u64,
                output: m[2..10].to_vec(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ChangeSetWriter;
    use std::collections::HashMap;

    /// A view over plain hash maps, enough to drive the executor.
    struct MapView {
        accounts: HashMap<Vec<u8>, Vec<u8>>,
        storages: HashMap<Vec<u8>, Vec<u8>>,
    }

    impl MapView {
        fn new() -> Self {
            Self { accounts: HashMap::new(), storages: HashMap::new() }
        }
    }

    impl StateView for MapView {
        fn read_account(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ExecError> {
            Ok(self.accounts.get(key).cloned())
        }

        fn read_storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ExecError> {
            Ok(self.storages.get(key).cloned())
        }
    }

    #[test]
    fn generate_produces_headers_for_every_block() {
        let chain = SyntheticChain::generate(1, 10).unwrap();
        assert_eq!(chain.last_block(), 10);
        assert_eq!(chain.header(1).unwrap().unwrap().number, 1);
        assert_eq!(chain.header(10).unwrap().unwrap().number, 10);
        assert_eq!(chain.header(0).unwrap(), None);
        assert_eq!(chain.header(11).unwrap(), None);
    }

    #[test]
    fn execution_is_deterministic() {
        let chain = SyntheticChain::generate(7, 5).unwrap();
        let view = MapView::new();

        let mut first = ChangeSetWriter::new(3);
        let receipts_a = chain.execute(3, &view, &mut first).unwrap();
        let mut second = ChangeSetWriter::new(3);
        let receipts_b = chain.execute(3, &view, &mut second).unwrap();

        assert_eq!(receipts_a, receipts_b);
        let a = first.into_captured().unwrap();
        let b = second.into_captured().unwrap();
        assert_eq!(a.accounts.compare(&b.accounts), None);
        assert_eq!(a.storages.compare(&b.storages), None);
    }

    #[test]
    fn receipts_match_precomputed_header_digest() {
        let chain = SyntheticChain::generate(42, 20).unwrap();
        let view = MapView::new();
        for number in 1..=20 {
            let mut writer = ChangeSetWriter::new(number);
            let receipts = chain.execute(number, &view, &mut writer).unwrap();
            let digest = receipt_digest(&receipts).unwrap();
            assert_eq!(digest, chain.header(number).unwrap().unwrap().receipt_digest);
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = SyntheticChain::generate(1, 5).unwrap();
        let b = SyntheticChain::generate(2, 5).unwrap();
        let digests_a: Vec<_> = (1..=5).map(|n| a.header(n).unwrap().unwrap().receipt_digest).collect();
        let digests_b: Vec<_> = (1..=5).map(|n| b.header(n).unwrap().unwrap().receipt_digest).collect();
        assert_ne!(digests_a, digests_b);
    }

    #[test]
    fn execute_out_of_range_fails() {
        let chain = SyntheticChain::generate(1, 3).unwrap();
        let view = MapView::new();
        let mut writer = crate::traits::NoopWriter;
        assert!(matches!(
            chain.execute(0, &view, &mut writer).unwrap_err(),
            ExecError::MissingBlock(0)
        ));
        assert!(matches!(
            chain.execute(4, &view, &mut writer).unwrap_err(),
            ExecError::MissingBlock(4)
        ));
    }

    #[test]
    fn workload_touches_both_categories_over_time() {
        let chain = SyntheticChain::generate(9, 50).unwrap();
        let view = MapView::new();
        let mut account_changes = 0usize;
        let mut storage_changes = 0usize;
        for number in 1..=50 {
            let mut writer = ChangeSetWriter::new(number);
            chain.execute(number, &view, &mut writer).unwrap();
            let captured = writer.into_captured().unwrap();
            account_changes += captured.accounts.len();
            storage_changes += captured.storages.len();
        }
        assert!(account_changes > 0);
        assert!(storage_changes > 0);
    }
}
