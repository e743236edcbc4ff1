//! # strata-common
//!
//! Common types, errors, and utilities for Strata.
//!
//! This crate provides the foundational pieces shared by every layer of the
//! storage kernel:
//!
//! - **Types**: identifiers for rows, versions, stores and tables
//! - **Errors**: the unified [`StoreError`] taxonomy with stable error codes
//! - **Config**: [`StoreConfig`] and index tuning knobs
//! - **Memory**: the [`memory::PagedArray`] that backs every versioned structure
//!
//! ## Example
//!
//! ```rust
//! use strata_common::types::{RowId, Version};
//! use strata_common::error::StoreResult;
//!
//! fn example() -> StoreResult<()> {
//!     let row = RowId::new(7);
//!     let version = Version::INITIAL.next();
//!     assert_eq!(row.as_usize(), 7);
//!     assert_eq!(version.as_u64(), 1);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod memory;
pub mod types;

pub use config::{HashIndexConfig, StoreConfig};
pub use constants::*;
pub use error::{ErrorCode, StoreError, StoreResult};
pub use types::{RowId, StoreId, TableId, Version};
