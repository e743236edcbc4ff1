//! Configuration for Strata.
//!
//! This module provides configuration structures for the storage kernel.

mod store;

pub use store::{HashIndexConfig, StoreConfig};
