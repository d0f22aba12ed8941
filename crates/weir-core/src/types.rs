//! Core protocol types: digests, header records, receipts.
//!
//! Block numbers are plain `u64` per protocol convention; 0 means
//! "before the first block" (stage progress of a stage that never ran).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// A block number. 0 denotes "not run" for stage progress cursors.
pub type BlockNumber = u64;

/// A 32-byte digest value.
///
/// Used for receipt digests (BLAKE3 over the canonical encoding).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Digest32(pub [u8; 32]);

impl Digest32 {
    /// The zero digest (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a digest from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// BLAKE3 hash of arbitrary bytes.
    pub fn hash(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero digest.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Digest32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Digest32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An execution receipt, one per top-level action of a block.
///
/// Weir does not interpret receipts; it only re-derives them and digests
/// them for comparison against the recorded header digest.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Receipt {
    /// Whether the action completed without reverting.
    pub success: bool,
    /// Gas consumed by the action.
    pub gas_used: u64,
    /// Opaque action output.
    pub output: Vec<u8>,
}

/// Compute the canonical digest over a block's receipts.
///
/// BLAKE3 over the bincode encoding of the full receipt list. The same
/// derivation is used when headers are produced and when the replay
/// verifier re-derives receipts, so any divergence is an execution bug.
pub fn receipt_digest(receipts: &[Receipt]) -> Result<Digest32, CodecError> {
    let encoded = bincode::encode_to_vec(receipts, bincode::config::standard())
        .map_err(|e| CodecError(e.to_string()))?;
    Ok(Digest32::hash(&encoded))
}

/// The slice of a block header the verification engine cares about.
///
/// Full headers live with the execution collaborator; Weir persists only
/// the number and the receipt digest recorded at production time.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct HeaderRecord {
    /// Block number.
    pub number: BlockNumber,
    /// Digest over the block's receipts, recorded when the block was made.
    pub receipt_digest: Digest32,
}

impl HeaderRecord {
    /// Serialize to the canonical byte form.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CodecError(e.to_string()))
    }

    /// Deserialize from the canonical byte form.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (record, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError(e.to_string()))?;
        Ok(record)
    }
}
