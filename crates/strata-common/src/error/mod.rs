//! Error handling for Strata.
//!
//! This module provides a unified error type and result alias used
//! across all Strata components.

mod store;

pub use store::{ErrorCode, StoreError};

/// Result type alias for Strata operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
