//! Strata Performance Benchmarks
//!
//! This crate contains benchmarks for Strata components:
//! - Row store writes and versioned reads
//! - Hash unique index lookups and growth
//! - B-tree range index maintenance and range scans
//! - Undo/redo over large transactions
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench -p strata-bench
//! ```

pub mod utils;
