//! # strata-test
//!
//! Integration tests for Strata.
//!
//! This crate contains:
//! - A shared customer/order schema used by the scenarios in `tests/`
//! - Helpers for building stores and seeding data
//! - Opt-in log output for debugging failing scenarios

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Shared schema and seeding helpers
pub mod fixtures;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a `tracing` subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
