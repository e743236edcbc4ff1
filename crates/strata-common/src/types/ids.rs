//! Core identifier types for Strata.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Row identifier - a stable handle to one row of one table.
///
/// Row identifiers are allocated append-only and are never reused, even
/// after the row is deleted or the transaction that created it is rolled back.
///
/// # Example
///
/// ```rust
/// use strata_common::types::RowId;
///
/// let row = RowId::new(3);
/// assert_eq!(row.as_u32(), 3);
/// assert_eq!(row.next(), RowId::new(4));
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RowId(u32);

impl RowId {
    /// The first row of every table.
    pub const FIRST: Self = Self(0);

    /// Largest representable row identifier.
    pub const MAX: Self = Self(u32::MAX);

    /// Creates a new `RowId` from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the identifier as an array index.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns the next row identifier.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Converts an array index into a row identifier.
    ///
    /// Returns `None` when the index does not fit.
    #[inline]
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }
}

impl fmt::Debug for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowId({})", self.0)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RowId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl From<RowId> for u32 {
    #[inline]
    fn from(id: RowId) -> Self {
        id.0
    }
}

/// Version number - identifies one committed state of the whole store.
///
/// Versions increase monotonically. Every committed, undone or redone
/// transaction consumes exactly one version. Version 0 is the empty store.
///
/// # Example
///
/// ```rust
/// use strata_common::types::Version;
///
/// let v = Version::INITIAL;
/// assert!(v.is_initial());
/// assert_eq!(v.next().as_u64(), 1);
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Version(u64);

impl Version {
    /// The version of an empty store.
    pub const INITIAL: Self = Self(0);

    /// Creates a new `Version` from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following version.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the preceding version, saturating at [`Version::INITIAL`].
    #[inline]
    #[must_use]
    pub const fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Checks if this is the version of the empty store.
    #[inline]
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    #[inline]
    fn from(version: u64) -> Self {
        Self::new(version)
    }
}

impl From<Version> for u64 {
    #[inline]
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Store identifier - the registration slot of one row store inside a
/// transaction manager.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StoreId(u32);

impl StoreId {
    /// Creates a new `StoreId`.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the identifier as an array index.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreId({})", self.0)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Table identifier - the declaration slot of one table in a store schema.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TableId(u32);

impl TableId {
    /// Creates a new `TableId`.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the identifier as an array index.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
