//! Table and page identifier types.

use std::fmt;
use std::path::Path;

/// Identifies a table (one heap file).
///
/// A heap file derives its id from the CRC32 of its canonical path, so the
/// same file opened twice gets the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl TableId {
    /// Derive a table id from a file path.
    pub fn from_path(path: &Path) -> Self {
        TableId(crc32fast::hash(path.to_string_lossy().as_bytes()))
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table({})", self.0)
    }
}

/// Identifies a page: a table plus the page number within its file.
///
/// This is the key of both the buffer pool cache and the lock table.
///
/// # Example
/// ```
/// use tupledb::{PageId, TableId};
///
/// let page_id = PageId::new(TableId(1), 42);
/// assert_eq!(page_id.page_no(), 42);
/// assert_eq!(page_id.table_id(), TableId(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    table_id: TableId,
    page_no: u32,
}

impl PageId {
    /// Create a new PageId.
    #[inline]
    pub fn new(table_id: TableId, page_no: u32) -> Self {
        PageId { table_id, page_no }
    }

    #[inline]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    #[inline]
    pub fn page_no(&self) -> u32 {
        self.page_no
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({}:{})", self.table_id.0, self.page_no)
    }
}
