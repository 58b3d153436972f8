//! Pagination parameters for collection listings.
//!
//! Pages are 0-indexed, and a page size of zero disables pagination entirely.

use serde::{Deserialize, Serialize};

/// Parameters for slicing a listing into fixed-size pages.
///
/// # Example
///
/// ```ignore
/// use docmap::page::Pagination;
///
/// let params = Pagination::new(2, 50);
/// // Third page of 50 items
/// assert_eq!(params.offset(), 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    /// The page number (0-indexed).
    pub page: u64,
    /// Number of items per page; `0` disables paging.
    pub page_size: u64,
}

impl Pagination {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self { page, page_size }
    }

    /// Pagination that returns everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.page_size > 0
    }

    /// Number of items to skip to reach this page.
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.page_size)
    }

    /// The `(skip, limit)` pair for a find request, or `None` when disabled.
    pub fn window(&self) -> Option<(u64, u64)> {
        self.is_enabled().then(|| (self.offset(), self.page_size))
    }
}
