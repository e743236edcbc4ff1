//! Paged growable array with stable cell addresses.
//!
//! Cells live in fixed-size pages that are allocated lazily and never
//! relocated. Only the page directory grows, by doubling, and it holds
//! shared page handles, so a cell at `(page, offset)` stays where it is for
//! the lifetime of the array.
//!
//! # Two-Phase Append
//!
//! ```text
//! prepare_add(n)        fixed_add(value)
//! ┌──────────────┐      ┌──────────────────────────┐
//! │ may allocate │ ───▶ │ write cell, publish len  │
//! │ pages / grow │      │ no allocation, no failure │
//! └──────────────┘      └──────────────────────────┘
//! ```
//!
//! Anything that can fail happens in `prepare_add`. The visible transition
//! (`len` moving forward) happens in `fixed_add`/`fixed_allocate`, which
//! cannot fail once capacity is reserved.
//!
//! # Thread Safety
//!
//! One writer, many readers. The writer is serialized by the caller (the
//! transaction editor role). `len` is stored with release ordering after the
//! cell is written, and loaded with acquire ordering by readers, so a reader
//! that observes an index below `len` observes the cell contents written
//! before it.
//!
//! Each cell sits behind its own `parking_lot::RwLock` and the directory
//! behind another. Readers hold the directory lock only long enough to clone
//! a page handle, and a cell lock only for the duration of their closure, so
//! a reader contends with the writer only on the one cell being rewritten.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::constants::{DEFAULT_PAGE_SIZE, INITIAL_DIRECTORY_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE};

/// One page of cells.
struct Page<T> {
    cells: Box<[RwLock<T>]>,
}

impl<T: Default> Page<T> {
    fn new(size: usize) -> Self {
        Self {
            cells: (0..size).map(|_| RwLock::new(T::default())).collect(),
        }
    }
}

/// An append-only array of cells grouped in stable pages.
///
/// # Example
///
/// ```rust
/// use strata_common::memory::PagedArray;
///
/// let array: PagedArray<u64> = PagedArray::with_page_size(4);
/// array.prepare_add(10);
/// for i in 0..10 {
///     array.fixed_add(i * 2);
/// }
/// assert_eq!(array.len(), 10);
/// assert_eq!(array.get(7), Some(14));
/// assert_eq!(array.get(10), None);
/// ```
pub struct PagedArray<T> {
    /// Page directory. Grows by doubling; pages are shared handles.
    directory: RwLock<Vec<Arc<Page<T>>>>,
    /// Number of published cells.
    len: AtomicUsize,
    /// log2 of the page size.
    page_shift: u32,
    /// Mask selecting the offset within a page.
    page_mask: usize,
}

impl<T: Default> PagedArray<T> {
    /// Creates an empty array with the default page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates an empty array with the given page size.
    ///
    /// The page size is clamped to the supported range and rounded up to a
    /// power of two.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        let page_size = page_size
            .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
            .next_power_of_two();

        Self {
            directory: RwLock::new(Vec::with_capacity(INITIAL_DIRECTORY_SIZE)),
            len: AtomicUsize::new(0),
            page_shift: page_size.trailing_zeros(),
            page_mask: page_size - 1,
        }
    }
}

impl<T> PagedArray<T> {
    /// Returns the number of cells in one page.
    #[inline]
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_mask + 1
    }

    /// Returns the number of published cells.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns true if no cell has been published.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of allocated cells.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.directory.read().len() << self.page_shift
    }

    /// Handle to the page holding `index`. The directory lock is held only
    /// for the clone, so cell access never blocks directory growth.
    fn page(&self, index: usize) -> Option<Arc<Page<T>>> {
        self.directory.read().get(index >> self.page_shift).cloned()
    }

    /// Reads a published cell through a closure.
    pub fn with<R>(&self, index: usize, f: impl FnOnce(&T) -> R) -> Option<R> {
        if index >= self.len() {
            return None;
        }
        let page = self.page(index)?;
        let cell = page.cells[index & self.page_mask].read();
        Some(f(&cell))
    }

    /// Mutates a published cell in place.
    ///
    /// Only the single writer may call this.
    pub fn update<R>(&self, index: usize, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        if index >= self.len() {
            return None;
        }
        let page = self.page(index)?;
        let mut cell = page.cells[index & self.page_mask].write();
        Some(f(&mut cell))
    }
}

impl<T: Default> PagedArray<T> {
    /// Reserves room for `additional` more cells.
    ///
    /// This is the only operation that allocates. After it returns, the next
    /// `additional` calls to [`fixed_add`](Self::fixed_add) (or one
    /// [`fixed_allocate`](Self::fixed_allocate) of that many cells) cannot
    /// fail.
    pub fn prepare_add(&self, additional: usize) {
        let required = self.len.load(Ordering::Relaxed) + additional;
        if required <= self.capacity() {
            return;
        }

        let pages_needed = (required + self.page_mask) >> self.page_shift;
        let page_size = self.page_size();

        // Build pages outside the directory lock.
        let existing = self.directory.read().len();
        let fresh: Vec<Arc<Page<T>>> = (existing..pages_needed)
            .map(|_| Arc::new(Page::new(page_size)))
            .collect();

        let mut directory = self.directory.write();
        if directory.capacity() < pages_needed {
            let doubled = (directory.capacity() * 2)
                .max(pages_needed)
                .max(INITIAL_DIRECTORY_SIZE);
            let mut grown = Vec::with_capacity(doubled);
            grown.extend(directory.iter().cloned());
            *directory = grown;
        }
        directory.extend(fresh);
    }

    /// Appends a cell into already reserved capacity and returns its index.
    ///
    /// # Panics
    ///
    /// Panics if capacity was not reserved with
    /// [`prepare_add`](Self::prepare_add); that is a caller bug.
    pub fn fixed_add(&self, value: T) -> usize {
        let index = self.len.load(Ordering::Relaxed);
        let page = Arc::clone(&self.directory.read()[index >> self.page_shift]);
        *page.cells[index & self.page_mask].write() = value;
        self.len.store(index + 1, Ordering::Release);
        index
    }

    /// Publishes `count` default cells from reserved capacity and returns the
    /// index of the first one.
    ///
    /// # Panics
    ///
    /// Panics if capacity was not reserved; that is a caller bug.
    pub fn fixed_allocate(&self, count: usize) -> usize {
        let first = self.len.load(Ordering::Relaxed);
        assert!(
            first + count <= self.capacity(),
            "fixed_allocate past reserved capacity"
        );
        self.len.store(first + count, Ordering::Release);
        first
    }

    /// Reserves and appends one cell.
    pub fn push(&self, value: T) -> usize {
        self.prepare_add(1);
        self.fixed_add(value)
    }
}

impl<T: Clone> PagedArray<T> {
    /// Returns a copy of a published cell.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.with(index, T::clone)
    }
}

impl<T: Default> Default for PagedArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for PagedArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedArray")
            .field("len", &self.len.load(Ordering::Relaxed))
            .field("pages", &self.directory.read().len())
            .field("page_size", &(self.page_mask + 1))
            .finish()
    }
}
