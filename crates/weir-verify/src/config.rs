//! Run configuration for the oracles.
//!
//! Explicit values threaded through construction; nothing here is
//! ambient process state. Configuration faults surface before any work
//! is performed.

use weir_core::error::ConfigError;
use weir_core::types::BlockNumber;

/// Parse a human byte-size string: a plain number or a number with a
/// `b`, `kb`, `mb`, or `gb` suffix (case-insensitive).
///
/// # Errors
///
/// [`ConfigError::MalformedSize`] for anything else, including overflow.
pub fn parse_byte_size(input: &str) -> Result<u64, ConfigError> {
    let lowered = input.trim().to_ascii_lowercase();
    let malformed = || ConfigError::MalformedSize(input.to_string());

    let (digits, multiplier) = if let Some(rest) = lowered.strip_suffix("kb") {
        (rest, 1024u64)
    } else if let Some(rest) = lowered.strip_suffix("mb") {
        (rest, 1024 * 1024)
    } else if let Some(rest) = lowered.strip_suffix("gb") {
        (rest, 1024 * 1024 * 1024)
    } else if let Some(rest) = lowered.strip_suffix('b') {
        (rest, 1)
    } else {
        (lowered.as_str(), 1)
    };

    let value: u64 = digits.trim().parse().map_err(|_| malformed())?;
    value.checked_mul(multiplier).ok_or_else(malformed)
}

/// Configuration of the small-step synchronizer.
#[derive(Clone, Debug)]
pub struct SmallStepConfig {
    /// Global stop block; 0 means "the source head".
    pub stop_block: BlockNumber,
    /// Blocks to unwind at the stop boundary. 0 disables unwinding.
    pub unwind_depth: u64,
    /// Forward window size per iteration. Must be at least 1.
    pub unwind_every: u64,
    /// Mid-window commit threshold in bytes. 0 commits per iteration only.
    pub batch_size: u64,
    /// Persist receipts while executing.
    pub write_receipts: bool,
}

impl SmallStepConfig {
    /// Surface configuration faults before any work happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unwind_every == 0 {
            return Err(ConfigError::ZeroStep);
        }
        Ok(())
    }
}

impl Default for SmallStepConfig {
    fn default() -> Self {
        Self {
            stop_block: 0,
            unwind_depth: 0,
            unwind_every: 1000,
            batch_size: 0,
            write_receipts: true,
        }
    }
}

/// Configuration of the historical replay verifier.
#[derive(Clone, Debug)]
pub struct ReplayConfig {
    /// First block to replay; clamped up to 1.
    pub start_block: BlockNumber,
    /// Compare captured change sets against the persisted trail.
    pub check_changes: bool,
    /// Persist recomputed receipts through the batch writer.
    pub write_receipts: bool,
    /// Batch writer flush threshold in bytes.
    pub batch_size: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            start_block: 1,
            check_changes: true,
            write_receipts: false,
            batch_size: 4 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_numbers() {
        assert_eq!(parse_byte_size("0").unwrap(), 0);
        assert_eq!(parse_byte_size("4096").unwrap(), 4096);
        assert_eq!(parse_byte_size(" 42 ").unwrap(), 42);
    }

    #[test]
    fn parses_suffixes_case_insensitive() {
        assert_eq!(parse_byte_size("512b").unwrap(), 512);
        assert_eq!(parse_byte_size("512kb").unwrap(), 512 * 1024);
        assert_eq!(parse_byte_size("16MB").unwrap(), 16 * 1024 * 1024);
        assert_eq!(parse_byte_size("1Gb").unwrap(), 1024 * 1024 * 1024);
    }

    #[test]
    fn rejects_malformed_sizes() {
        for bad in ["", "mb", "12xb", "-5", "1.5mb", "12 34"] {
            let err = parse_byte_size(bad).unwrap_err();
            assert!(matches!(err, ConfigError::MalformedSize(_)), "{bad}");
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!(matches!(
            parse_byte_size("99999999999999999999gb").unwrap_err(),
            ConfigError::MalformedSize(_)
        ));
        assert!(matches!(
            parse_byte_size(&format!("{}gb", u64::MAX)).unwrap_err(),
            ConfigError::MalformedSize(_)
        ));
    }

    #[test]
    fn zero_step_is_a_config_fault() {
        let config = SmallStepConfig { unwind_every: 0, ..SmallStepConfig::default() };
        assert_eq!(config.validate().unwrap_err(), ConfigError::ZeroStep);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(SmallStepConfig::default().validate().is_ok());
    }
}
