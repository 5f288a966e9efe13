//! Heap File - the page store for one table.
//!
//! The [`HeapFile`] handles all direct file operations for a table:
//! - Reading and writing single pages
//! - Appending empty pages
//! - Table-level tuple insert/delete, routed through the buffer pool
//! - Sequential scans via [`HeapFileIterator`]

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::{BufferPool, PageRef};
use crate::common::{Error, PageId, Permission, Result, TableId, TransactionId};
use crate::storage::page::HeapPage;
use crate::storage::tuple::{RecordId, Tuple, TupleDesc};

/// Stores one table as a flat sequence of fixed-size pages.
///
/// # File Layout
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0    S       2S        ...      N×S        (S = page_size)
/// ```
///
/// The file length is always a multiple of the page size.
///
/// # Thread Safety
/// The file handle sits behind a `Mutex` so a seek and the read or write
/// that follows it are never interleaved with another thread's. Page-level
/// isolation between transactions is the buffer pool's job: tuple-level
/// operations here always fetch pages through it.
///
/// # Durability
/// Every page write is followed by `sync_data()`.
#[derive(Debug)]
pub struct HeapFile {
    path: PathBuf,
    table_id: TableId,
    schema: Arc<TupleDesc>,
    page_size: usize,
    file: Mutex<File>,
}

impl HeapFile {
    /// Create a new, empty table file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, schema: TupleDesc, page_size: usize) -> Result<Self> {
        check_geometry(&schema, page_size)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        Self::from_file(path.as_ref(), file, schema, page_size)
    }

    /// Open an existing table file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist, cannot be opened, or its
    /// length is not a multiple of `page_size`.
    pub fn open<P: AsRef<Path>>(path: P, schema: TupleDesc, page_size: usize) -> Result<Self> {
        check_geometry(&schema, page_size)?;
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "{} is {} bytes, not a multiple of page size {}",
                    path.as_ref().display(),
                    len,
                    page_size
                ),
            )));
        }

        Self::from_file(path.as_ref(), file, schema, page_size)
    }

    /// Open an existing table file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(
        path: P,
        schema: TupleDesc,
        page_size: usize,
    ) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, schema, page_size)
        } else {
            Self::create(path, schema, page_size)
        }
    }

    fn from_file(path: &Path, file: File, schema: TupleDesc, page_size: usize) -> Result<Self> {
        let path = path.canonicalize()?;
        Ok(Self {
            table_id: TableId::from_path(&path),
            path,
            schema: Arc::new(schema),
            page_size,
            file: Mutex::new(file),
        })
    }

    #[inline]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Arc<TupleDesc> {
        &self.schema
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    // ========================================================================
    // Page I/O
    // ========================================================================

    /// Read a page from disk.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page lies beyond the end of the file
    ///   or belongs to another table
    /// - `Error::CorruptPage` if the bytes do not decode
    pub fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        if page_id.table_id() != self.table_id {
            return Err(Error::PageNotFound(page_id));
        }

        let mut data = vec![0u8; self.page_size];
        {
            let mut file = self.file.lock();
            let page_count = Self::count_pages(&file, self.page_size)?;
            if page_id.page_no() >= page_count {
                return Err(Error::PageNotFound(page_id));
            }
            file.seek(SeekFrom::Start(self.offset_of(page_id)))?;
            file.read_exact(&mut data)?;
        }

        HeapPage::from_bytes(page_id, Arc::clone(&self.schema), self.page_size, &data)
    }

    /// Write a page's byte image at its offset.
    ///
    /// Writing page number `page_count()` appends it; anything further out
    /// would leave a hole and is rejected.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        self.write_page_bytes(page.id(), &page.to_bytes())
    }

    /// Write a raw page image at the offset of `page_id`.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page would not be contiguous with the
    ///   file or belongs to another table
    /// - `Error::CorruptPage` if `data` is not exactly one page long
    pub fn write_page_bytes(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        if page_id.table_id() != self.table_id {
            return Err(Error::PageNotFound(page_id));
        }
        if data.len() != self.page_size {
            return Err(Error::CorruptPage {
                page_id,
                reason: format!("image is {} bytes, page size is {}", data.len(), self.page_size),
            });
        }

        let mut file = self.file.lock();
        let page_count = Self::count_pages(&file, self.page_size)?;
        if page_id.page_no() > page_count {
            return Err(Error::PageNotFound(page_id));
        }
        file.seek(SeekFrom::Start(self.offset_of(page_id)))?;
        file.write_all(data)?;
        file.sync_data()?;
        Ok(())
    }

    /// Extend the file by one zeroed page and return its page number.
    ///
    /// Concurrent appends each get their own page.
    pub fn append_empty_page(&self) -> Result<u32> {
        let mut file = self.file.lock();
        let page_no = Self::count_pages(&file, self.page_size)?;

        file.seek(SeekFrom::Start(page_no as u64 * self.page_size as u64))?;
        file.write_all(&vec![0u8; self.page_size])?;
        file.sync_data()?;

        debug!(table = %self.table_id, page_no, "appended empty page");
        Ok(page_no)
    }

    /// Number of pages in the file (file length / page size, rounded down).
    pub fn page_count(&self) -> Result<u32> {
        let file = self.file.lock();
        Self::count_pages(&file, self.page_size)
    }

    fn count_pages(file: &File, page_size: usize) -> Result<u32> {
        Ok((file.metadata()?.len() / page_size as u64) as u32)
    }

    #[inline]
    fn offset_of(&self, page_id: PageId) -> u64 {
        page_id.page_no() as u64 * self.page_size as u64
    }

    // ========================================================================
    // Tuple operations (through the buffer pool)
    // ========================================================================

    /// Insert a copy of `tuple` into the first page with a free slot.
    ///
    /// Pages are checked in page order under a shared lock. The first page
    /// with room is upgraded to write permission and takes the tuple; full
    /// pages are released again unless `tid` already held them. If every
    /// page is full a new empty page is appended and used. Returns the new
    /// record id and the pages that were modified.
    ///
    /// # Errors
    /// - `Error::InvalidTuple` if the tuple does not match the table schema
    /// - `Error::TransactionAborted` if a page lock request deadlocks
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<(RecordId, Vec<PageRef>)> {
        if !tuple.schema().same_types(&self.schema) {
            return Err(Error::InvalidTuple(format!(
                "schema [{}] does not match table schema [{}]",
                tuple.schema(),
                self.schema
            )));
        }

        for page_no in 0..self.page_count()? {
            let page_id = PageId::new(self.table_id, page_no);
            let held_before = pool.holds_lock(tid, page_id);

            let has_room = pool
                .get_page(tid, page_id, Permission::ReadOnly)?
                .read()
                .empty_slot_count()
                > 0;
            if !has_room {
                if !held_before {
                    pool.unsafe_release_page(tid, page_id);
                }
                continue;
            }

            // Other readers may hold the page; this waits them out.
            let page = pool.get_page(tid, page_id, Permission::ReadWrite)?;
            let record_id = page.write().insert_tuple(tuple)?;
            return Ok((record_id, vec![page]));
        }

        let page_no = self.append_empty_page()?;
        let page = pool.get_page(tid, PageId::new(self.table_id, page_no), Permission::ReadWrite)?;
        let record_id = page.write().insert_tuple(tuple)?;
        Ok((record_id, vec![page]))
    }

    /// Remove `tuple` from the page its record id points at.
    ///
    /// # Errors
    /// - `Error::InvalidTuple` if the tuple has no record id
    /// - `Error::RecordNotFound` if the record id belongs to another table
    ///   or its slot is empty
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| Error::InvalidTuple("tuple has no record id".to_string()))?;
        if record_id.page_id.table_id() != self.table_id {
            return Err(Error::RecordNotFound(record_id));
        }

        let page = pool.get_page(tid, record_id.page_id, Permission::ReadWrite)?;
        page.write().delete_tuple(tuple)?;
        Ok(vec![page])
    }

    /// Sequential scan over every live tuple, in page then slot order.
    ///
    /// The iterator starts closed; call [`HeapFileIterator::open`] first.
    pub fn iter<'a>(&'a self, pool: &'a BufferPool, tid: TransactionId) -> HeapFileIterator<'a> {
        HeapFileIterator {
            file: self,
            pool,
            tid,
            next_page: None,
            buffered: Vec::new().into_iter(),
        }
    }
}

fn check_geometry(schema: &TupleDesc, page_size: usize) -> Result<()> {
    if page_size == 0 {
        return Err(Error::Config("page_size must be > 0".to_string()));
    }
    if HeapPage::slots_per_page(page_size, schema) == 0 {
        return Err(Error::Config(format!(
            "page size {} cannot hold a {}-byte tuple",
            page_size,
            schema.byte_size()
        )));
    }
    Ok(())
}

/// Lazy scan over a [`HeapFile`].
///
/// Each page is fetched through the buffer pool with read-only permission,
/// so the scanning transaction takes shared locks like any other reader.
/// Tuples are copied out of the page before they are yielded.
pub struct HeapFileIterator<'a> {
    file: &'a HeapFile,
    pool: &'a BufferPool,
    tid: TransactionId,
    next_page: Option<u32>,
    buffered: std::vec::IntoIter<Tuple>,
}

impl HeapFileIterator<'_> {
    /// Position the scan before the first tuple.
    pub fn open(&mut self) {
        self.next_page = Some(0);
        self.buffered = Vec::new().into_iter();
    }

    /// Restart from the first page.
    pub fn rewind(&mut self) {
        self.close();
        self.open();
    }

    /// Stop the scan; `next()` yields `None` until reopened.
    pub fn close(&mut self) {
        self.next_page = None;
        self.buffered = Vec::new().into_iter();
    }

    fn load_page(&mut self, page_no: u32) -> Result<()> {
        let page_id = PageId::new(self.file.table_id, page_no);
        let page = self.pool.get_page(self.tid, page_id, Permission::ReadOnly)?;
        let tuples: Vec<Tuple> = page.read().tuples().cloned().collect();
        self.buffered = tuples.into_iter();
        Ok(())
    }
}

impl Iterator for HeapFileIterator<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tuple) = self.buffered.next() {
                return Some(Ok(tuple));
            }

            let page_no = self.next_page?;
            let page_count = match self.file.page_count() {
                Ok(n) => n,
                Err(e) => return Some(Err(e)),
            };
            if page_no >= page_count {
                self.next_page = None;
                return None;
            }

            self.next_page = Some(page_no + 1);
            if let Err(e) = self.load_page(page_no) {
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tuple::{Field, Type};
    use tempfile::tempdir;

    fn int_schema() -> TupleDesc {
        TupleDesc::new(&[Type::Int])
    }

    fn int_tuple(file: &HeapFile, v: i32) -> Tuple {
        Tuple::new(file.schema().clone(), vec![Field::Int(v)]).unwrap()
    }

    #[test]
    fn test_create_new_table_file() {
        let dir = tempdir().unwrap();
        let hf = HeapFile::create(dir.path().join("t.dat"), int_schema(), 4096).unwrap();
        assert_eq!(hf.page_count().unwrap(), 0);
        assert_eq!(hf.table_id(), TableId::from_path(hf.path()));
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");

        HeapFile::create(&path, int_schema(), 4096).unwrap();
        assert!(HeapFile::create(&path, int_schema(), 4096).is_err());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let dir = tempdir().unwrap();
        assert!(HeapFile::open(dir.path().join("missing.dat"), int_schema(), 4096).is_err());
    }

    #[test]
    fn test_open_rejects_partial_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");
        std::fs::write(&path, vec![0u8; 100]).unwrap();
        assert!(HeapFile::open(&path, int_schema(), 4096).is_err());
    }

    #[test]
    fn test_same_path_same_table_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");
        let a = HeapFile::create(&path, int_schema(), 4096).unwrap();
        let b = HeapFile::open(&path, int_schema(), 4096).unwrap();
        assert_eq!(a.table_id(), b.table_id());
    }

    #[test]
    fn test_append_and_read_page() {
        let dir = tempdir().unwrap();
        let hf = HeapFile::create(dir.path().join("t.dat"), int_schema(), 4096).unwrap();

        assert_eq!(hf.append_empty_page().unwrap(), 0);
        assert_eq!(hf.append_empty_page().unwrap(), 1);
        assert_eq!(hf.page_count().unwrap(), 2);

        let page = hf.read_page(PageId::new(hf.table_id(), 1)).unwrap();
        assert_eq!(page.empty_slot_count(), page.num_slots());
    }

    #[test]
    fn test_write_and_read_page_roundtrip() {
        let dir = tempdir().unwrap();
        let hf = HeapFile::create(dir.path().join("t.dat"), int_schema(), 4096).unwrap();
        let pid = PageId::new(hf.table_id(), 0);

        let mut page = HeapPage::empty(pid, hf.schema().clone(), 4096);
        page.insert_tuple(&int_tuple(&hf, 0x42)).unwrap();
        page.insert_tuple(&int_tuple(&hf, -1)).unwrap();
        hf.write_page(&page).unwrap();
        assert_eq!(hf.page_count().unwrap(), 1);

        let back = hf.read_page(pid).unwrap();
        assert_eq!(back.to_bytes(), page.to_bytes());
    }

    #[test]
    fn test_write_only_touches_its_own_page() {
        let dir = tempdir().unwrap();
        let hf = HeapFile::create(dir.path().join("t.dat"), int_schema(), 4096).unwrap();
        for _ in 0..3 {
            hf.append_empty_page().unwrap();
        }

        let pid = PageId::new(hf.table_id(), 1);
        let mut page = HeapPage::empty(pid, hf.schema().clone(), 4096);
        page.insert_tuple(&int_tuple(&hf, 7)).unwrap();
        hf.write_page(&page).unwrap();

        assert_eq!(hf.page_count().unwrap(), 3);
        for n in [0, 2] {
            let other = hf.read_page(PageId::new(hf.table_id(), n)).unwrap();
            assert_eq!(other.tuples().count(), 0);
        }
        assert_eq!(hf.read_page(pid).unwrap().tuples().count(), 1);
    }

    #[test]
    fn test_read_beyond_end() {
        let dir = tempdir().unwrap();
        let hf = HeapFile::create(dir.path().join("t.dat"), int_schema(), 4096).unwrap();
        hf.append_empty_page().unwrap();

        let result = hf.read_page(PageId::new(hf.table_id(), 1));
        assert!(matches!(result, Err(Error::PageNotFound(_))));
    }

    #[test]
    fn test_write_leaving_hole_fails() {
        let dir = tempdir().unwrap();
        let hf = HeapFile::create(dir.path().join("t.dat"), int_schema(), 4096).unwrap();
        let page = HeapPage::empty(PageId::new(hf.table_id(), 2), hf.schema().clone(), 4096);
        assert!(hf.write_page(&page).is_err());
        assert_eq!(hf.page_count().unwrap(), 0);
    }

    #[test]
    fn test_foreign_page_id_rejected() {
        let dir = tempdir().unwrap();
        let hf = HeapFile::create(dir.path().join("t.dat"), int_schema(), 4096).unwrap();
        hf.append_empty_page().unwrap();
        let foreign = PageId::new(TableId(hf.table_id().0.wrapping_add(1)), 0);
        assert!(matches!(hf.read_page(foreign), Err(Error::PageNotFound(_))));
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.dat");

        {
            let hf = HeapFile::create(&path, int_schema(), 4096).unwrap();
            let mut page = HeapPage::empty(PageId::new(hf.table_id(), 0), hf.schema().clone(), 4096);
            page.insert_tuple(&int_tuple(&hf, 1234)).unwrap();
            hf.write_page(&page).unwrap();
        }

        let hf = HeapFile::open_or_create(&path, int_schema(), 4096).unwrap();
        assert_eq!(hf.page_count().unwrap(), 1);
        let page = hf.read_page(PageId::new(hf.table_id(), 0)).unwrap();
        let values: Vec<Field> = page.tuples().map(|t| t.field(0).cloned().unwrap()).collect();
        assert_eq!(values, vec![Field::Int(1234)]);
    }

    #[test]
    fn test_page_too_small_for_tuple() {
        let dir = tempdir().unwrap();
        let schema = TupleDesc::new(&[Type::Str]);
        assert!(matches!(
            HeapFile::create(dir.path().join("t.dat"), schema, 64),
            Err(Error::Config(_))
        ));
    }
}
