//! System-wide constants for Strata.

// =============================================================================
// Paged Array Constants
// =============================================================================

/// Default number of cells in one page of a [`crate::memory::PagedArray`].
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Smallest page a paged array accepts.
pub const MIN_PAGE_SIZE: usize = 4;

/// Largest page a paged array accepts.
pub const MAX_PAGE_SIZE: usize = 1 << 16;

/// Initial number of slots in a page directory.
pub const INITIAL_DIRECTORY_SIZE: usize = 4;

// =============================================================================
// Hash Index Constants
// =============================================================================

/// Default bucket count of a fresh hash index. Must be prime.
pub const DEFAULT_HASH_INITIAL_SIZE: usize = 37;

/// Default load factor of a hash index.
///
/// The index grows when live entries exceed `load_factor * size` and
/// rehashes in place when collision bits exceed the same threshold.
pub const DEFAULT_HASH_LOAD_FACTOR: f64 = 0.75;

/// Lowest accepted hash load factor.
pub const MIN_HASH_LOAD_FACTOR: f64 = 0.5;

/// Highest accepted hash load factor.
pub const MAX_HASH_LOAD_FACTOR: f64 = 0.95;

// =============================================================================
// B-Tree Constants
// =============================================================================

/// Minimum degree of the range index B-tree.
pub const BTREE_MIN_DEGREE: usize = 3;

/// Maximum keys in one B-tree node (`2 * t - 1`).
pub const BTREE_MAX_KEYS: usize = 2 * BTREE_MIN_DEGREE - 1;

/// Maximum children of one B-tree node (`2 * t`).
pub const BTREE_MAX_CHILDREN: usize = 2 * BTREE_MIN_DEGREE;

/// Minimum keys in a non-root B-tree node (`t - 1`).
///
/// Before descending into a child with this many keys, delete borrows from
/// a sibling or merges.
pub const BTREE_MIN_KEYS: usize = BTREE_MIN_DEGREE - 1;
