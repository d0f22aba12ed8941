//! Integration test suite for the Weir verification engine.
//!
//! Exercises the full capture → persist → verify → unwind → re-verify
//! cycle across crates: churn convergence against uninterrupted runs,
//! audit-trail divergence injection, and the RocksDB backend end to end.

pub mod helpers;
