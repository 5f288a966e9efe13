//! Configuration for tupledb.

use crate::common::{Error, Result};

/// Default size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems. Tests shrink it to force
/// multi-page tables with only a handful of tuples.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of pages the buffer pool caches.
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Process-wide settings fixed when a [`Database`](crate::Database) or
/// [`BufferPool`](crate::BufferPool) is constructed.
///
/// # Example
/// ```
/// use tupledb::Config;
///
/// let config = Config::default().with_pool_pages(8);
/// assert_eq!(config.page_size, 4096);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Bytes per page, header included.
    pub page_size: usize,
    /// Maximum number of pages resident in the buffer pool.
    pub pool_pages: usize,
}

impl Config {
    /// Override the page size. Only meant for test harnesses.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Override the buffer pool capacity.
    pub fn with_pool_pages(mut self, pool_pages: usize) -> Self {
        self.pool_pages = pool_pages;
        self
    }

    /// Reject settings no heap file or buffer pool can work with.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be > 0".to_string()));
        }
        if self.pool_pages == 0 {
            return Err(Error::Config("pool_pages must be > 0".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pool_pages: DEFAULT_POOL_PAGES,
        }
    }
}
