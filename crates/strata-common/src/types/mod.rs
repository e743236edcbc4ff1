//! Type definitions for Strata.
//!
//! This module contains the identifier types used across the storage kernel.

mod ids;

pub use ids::{RowId, StoreId, TableId, Version};
