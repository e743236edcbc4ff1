//! Memory management utilities for Strata.
//!
//! - [`PagedArray`]: append-only growable array whose cells never move

mod paged;

pub use paged::PagedArray;
