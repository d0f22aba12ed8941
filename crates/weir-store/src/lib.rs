//! # weir-store
//! Persistent stores of the Weir audit trail: plain state, change sets,
//! chunked history indices, headers, receipts, and stage progress — all
//! expressed over the [`weir_core::kv`] abstraction, with a RocksDB
//! backend for production use.

pub mod changeset_store;
pub mod headers;
pub mod historical;
pub mod history_store;
pub mod progress;
pub mod receipts;
pub mod rocks;
pub mod tables;
