//! Buffer pool - the single entry point for page access.
//!
//! The [`BufferPool`] provides:
//! - Page caching between heap files and memory, bounded by a page count
//! - Strict two-phase page locking through its [`LockManager`]
//! - Dirty page tracking per transaction
//! - Commit (flush) and abort (discard and restore) of a transaction's pages

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::buffer::replacer::LruReplacer;
use crate::buffer::BufferPoolStats;
use crate::catalog::Catalog;
use crate::common::{Error, PageId, Permission, Result, TableId, TransactionId};
use crate::concurrency::{LockManager, LockMode};
use crate::storage::{HeapPage, RecordId, Tuple};

/// Shared handle to a cached page.
///
/// Hold the guard only as long as needed, and never across another call into
/// the pool.
pub type PageRef = Arc<RwLock<HeapPage>>;

struct PoolState {
    pages: HashMap<PageId, PageRef>,
    replacer: LruReplacer,
    /// Pre-transaction images of pages written to disk before their owner
    /// finished, keyed by owner. Restored if the owner aborts.
    stolen: HashMap<TransactionId, HashMap<PageId, Vec<u8>>>,
}

/// Bounded cache of heap pages shared by all transactions.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                         BufferPool                           │
/// │  ┌──────────────┐   ┌─────────────────────────────────────┐  │
/// │  │ LockManager  │   │ state: Mutex<PoolState>             │  │
/// │  │ page locks + │   │   pages:    PageId → PageRef        │  │
/// │  │ wait-for     │   │   replacer: LruReplacer             │  │
/// │  └──────────────┘   │   stolen:   tid → before images     │  │
/// │  ┌──────────────┐   └─────────────────────────────────────┘  │
/// │  │ Catalog      │──▶ HeapFile per table (page I/O)           │
/// │  └──────────────┘                                            │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Eviction
/// Least-recently-used. The oldest clean page goes first. If every cached
/// page is dirty, the oldest page dirtied by the *requesting* transaction is
/// written back and dropped, and its before image is kept so an abort can
/// put it back on disk. Pages dirtied by other running transactions are
/// never evicted; with no candidate left the request fails with
/// [`Error::NoEvictablePage`].
///
/// # Thread Safety
/// - Page locks are acquired before `state` is taken, so a blocked
///   transaction never holds the cache mutex.
/// - Fetch-or-evict, commit and abort each run under one `state` critical
///   section.
/// - `stats` is all atomic counters.
pub struct BufferPool {
    capacity: usize,
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    state: Mutex<PoolState>,
    stats: BufferPoolStats,
}

impl BufferPool {
    /// Create a pool caching at most `capacity` pages of `catalog`'s tables.
    ///
    /// # Errors
    /// `Error::Config` if `capacity` is zero.
    pub fn new(capacity: usize, catalog: Arc<Catalog>) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("buffer pool capacity must be > 0".to_string()));
        }

        Ok(Self {
            capacity,
            catalog,
            lock_manager: LockManager::new(),
            state: Mutex::new(PoolState {
                pages: HashMap::new(),
                replacer: LruReplacer::new(),
                stolen: HashMap::new(),
            }),
            stats: BufferPoolStats::new(),
        })
    }

    // ========================================================================
    // Page access
    // ========================================================================

    /// Fetch a page on behalf of `tid`.
    ///
    /// Blocks until the page lock matching `permission` is granted, then
    /// serves the page from the cache or loads it from its heap file,
    /// evicting first if the cache is full. With `ReadWrite` the page is
    /// marked dirty by `tid` right away.
    ///
    /// # Errors
    /// - `Error::TableNotFound` if the page's table is not in the catalog
    /// - `Error::TransactionAborted` if waiting for the lock would deadlock
    /// - `Error::PageNotFound` if the page is past the end of the file
    /// - `Error::NoEvictablePage` if the cache is full of other
    ///   transactions' dirty pages
    pub fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> Result<PageRef> {
        let file = self.catalog.heap_file(page_id.table_id())?;
        self.lock_manager.acquire_lock(page_id, tid, permission)?;

        let mut state = self.state.lock();
        let cached = state.pages.get(&page_id).cloned();
        let page = match cached {
            Some(page) => {
                BufferPoolStats::bump(&self.stats.cache_hits);
                trace!(%tid, page = %page_id, "cache hit");
                page
            }
            None => {
                BufferPoolStats::bump(&self.stats.cache_misses);
                debug!(%tid, page = %page_id, "cache miss");

                self.make_room(&mut state, tid)?;
                let page = Arc::new(RwLock::new(file.read_page(page_id)?));
                BufferPoolStats::bump(&self.stats.pages_read);
                state.pages.insert(page_id, Arc::clone(&page));
                page
            }
        };
        state.replacer.record_access(page_id);

        if permission == Permission::ReadWrite {
            page.write().mark_dirty(Some(tid));
        }
        Ok(page)
    }

    // ========================================================================
    // Tuple operations
    // ========================================================================

    /// Insert `tuple` into table `table_id` on behalf of `tid`.
    ///
    /// Every page the heap file touched is marked dirty by `tid` and
    /// (re)installed in the cache.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: Tuple,
    ) -> Result<RecordId> {
        let file = self.catalog.heap_file(table_id)?;
        let (record_id, pages) = file.insert_tuple(self, tid, &tuple)?;
        self.install_dirty(tid, pages)?;

        trace!(%tid, record = %record_id, "inserted tuple");
        Ok(record_id)
    }

    /// Delete `tuple` (located by its record id) on behalf of `tid`.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| Error::InvalidTuple("tuple has no record id".to_string()))?;
        let file = self.catalog.heap_file(record_id.page_id.table_id())?;
        let pages = file.delete_tuple(self, tid, tuple)?;
        self.install_dirty(tid, pages)?;

        trace!(%tid, record = %record_id, "deleted tuple");
        Ok(())
    }

    fn install_dirty(&self, tid: TransactionId, pages: Vec<PageRef>) -> Result<()> {
        for page in pages {
            let page_id = {
                let mut guard = page.write();
                guard.mark_dirty(Some(tid));
                guard.id()
            };

            let mut state = self.state.lock();
            let cached = state.pages.get(&page_id).map(|p| Arc::ptr_eq(p, &page));
            match cached {
                Some(true) => {}
                Some(false) => {
                    state.pages.insert(page_id, page);
                }
                None => {
                    self.make_room(&mut state, tid)?;
                    state.pages.insert(page_id, page);
                }
            }
            state.replacer.record_access(page_id);
        }
        Ok(())
    }

    // ========================================================================
    // Transaction completion
    // ========================================================================

    /// Finish `tid`, then release every lock it holds.
    ///
    /// On commit, every page dirtied by `tid` is written to its heap file
    /// and becomes the page's new before image. On abort, those pages are
    /// dropped from the cache and any page written early by eviction is
    /// restored on disk from its before image.
    ///
    /// # Errors
    /// If a commit write fails the error is returned and the locks are kept;
    /// the caller should then abort `tid`. Abort always releases the locks
    /// and reports the first restore failure, if any.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        let outcome = if commit {
            self.commit_pages(tid)?;
            Ok(())
        } else {
            self.abort_pages(tid)
        };

        let released = self.lock_manager.release_all(tid);
        debug!(%tid, commit, locks = released.len(), "transaction complete");
        outcome
    }

    fn commit_pages(&self, tid: TransactionId) -> Result<()> {
        let mut state = self.state.lock();

        let mut dirty: Vec<PageRef> = state
            .pages
            .values()
            .filter(|page| page.read().dirtied_by() == Some(tid))
            .cloned()
            .collect();
        dirty.sort_by_key(|page| page.read().id());

        for page in &dirty {
            let mut guard = page.write();
            self.catalog
                .heap_file(guard.id().table_id())?
                .write_page(&guard)?;
            BufferPoolStats::bump(&self.stats.pages_written);
            guard.set_before_image();
            guard.mark_dirty(None);
        }

        // Early-written pages still cached were rewritten above; evicted
        // ones are on disk already.
        state.stolen.remove(&tid);

        debug!(%tid, flushed = dirty.len(), "committed pages");
        Ok(())
    }

    fn abort_pages(&self, tid: TransactionId) -> Result<()> {
        let mut state = self.state.lock();
        let stolen = state.stolen.remove(&tid).unwrap_or_default();

        // Cached copies of early-written pages carry tid's changes even when
        // clean, so they go too.
        let doomed: Vec<PageId> = state
            .pages
            .iter()
            .filter(|(page_id, page)| {
                page.read().dirtied_by() == Some(tid) || stolen.contains_key(*page_id)
            })
            .map(|(&page_id, _)| page_id)
            .collect();
        for &page_id in &doomed {
            state.pages.remove(&page_id);
            state.replacer.remove(page_id);
            BufferPoolStats::bump(&self.stats.pages_discarded);
        }

        let mut restores: Vec<(PageId, Vec<u8>)> = stolen.into_iter().collect();
        restores.sort_by_key(|(page_id, _)| *page_id);

        let mut first_error = None;
        for (page_id, image) in &restores {
            let restored = self
                .catalog
                .heap_file(page_id.table_id())
                .and_then(|file| file.write_page_bytes(*page_id, image));
            match restored {
                Ok(()) => BufferPoolStats::bump(&self.stats.pages_written),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        debug!(%tid, discarded = doomed.len(), restored = restores.len(), "aborted pages");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Flushing and discarding
    // ========================================================================

    /// Drop `page_id` from the cache without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        let mut state = self.state.lock();
        if let Some(page) = state.pages.remove(&page_id) {
            state.replacer.remove(page_id);
            if page.read().is_dirty() {
                BufferPoolStats::bump(&self.stats.pages_discarded);
            }
            debug!(page = %page_id, "discarded page");
        }
    }

    /// Write `page_id` to its heap file if it is cached and dirty.
    ///
    /// The page stays cached and stays dirty by its owner, which may keep
    /// changing it; commit writes it again. The before image is kept in
    /// case the owner aborts.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(page) = state.pages.get(&page_id).cloned() {
            self.write_back(&mut state, &page)?;
        }
        Ok(())
    }

    /// Write every page dirtied by `tid`.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        let mut state = self.state.lock();
        let dirty: Vec<PageRef> = state
            .pages
            .values()
            .filter(|page| page.read().dirtied_by() == Some(tid))
            .cloned()
            .collect();
        for page in &dirty {
            self.write_back(&mut state, page)?;
        }
        Ok(())
    }

    /// Write every dirty page in the cache.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut state = self.state.lock();
        let cached: Vec<PageRef> = state.pages.values().cloned().collect();
        for page in &cached {
            self.write_back(&mut state, page)?;
        }
        debug!(pages = cached.len(), "flushed all pages");
        Ok(())
    }

    fn write_back(&self, state: &mut PoolState, page: &PageRef) -> Result<()> {
        let guard = page.read();
        let Some(owner) = guard.dirtied_by() else {
            return Ok(());
        };

        self.catalog
            .heap_file(guard.id().table_id())?
            .write_page(&guard)?;
        BufferPoolStats::bump(&self.stats.pages_written);

        state
            .stolen
            .entry(owner)
            .or_default()
            .entry(guard.id())
            .or_insert_with(|| guard.before_image().to_vec());
        debug!(page = %guard.id(), %owner, "wrote back dirty page");
        Ok(())
    }

    // ========================================================================
    // Eviction
    // ========================================================================

    fn make_room(&self, state: &mut PoolState, tid: TransactionId) -> Result<()> {
        while state.pages.len() >= self.capacity {
            self.evict_one(state, tid)?;
        }
        Ok(())
    }

    fn evict_one(&self, state: &mut PoolState, tid: TransactionId) -> Result<()> {
        let pages = &state.pages;
        let clean = state.replacer.find_victim(|page_id| {
            pages
                .get(&page_id)
                .is_some_and(|page| !page.read().is_dirty())
        });
        let victim = match clean {
            Some(page_id) => page_id,
            None => {
                let own = state.replacer.find_victim(|page_id| {
                    pages
                        .get(&page_id)
                        .is_some_and(|page| page.read().dirtied_by() == Some(tid))
                });
                let page_id = own.ok_or(Error::NoEvictablePage)?;
                let page = pages.get(&page_id).cloned().ok_or(Error::PageNotFound(page_id))?;
                self.write_back(state, &page)?;
                BufferPoolStats::bump(&self.stats.dirty_evictions);
                page_id
            }
        };

        state.pages.remove(&victim);
        state.replacer.remove(victim);
        BufferPoolStats::bump(&self.stats.evictions);
        debug!(%tid, page = %victim, "evicted page");
        Ok(())
    }

    // ========================================================================
    // Locks
    // ========================================================================

    /// True if `tid` holds any lock on `page_id`.
    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds(page_id, tid)
    }

    /// Mode `tid` holds `page_id` in, if any.
    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.lock_manager.lock_mode(page_id, tid)
    }

    /// Release `tid`'s lock on one page before the transaction ends.
    ///
    /// Breaks two-phase locking; only safe for pages `tid` read and will
    /// not depend on, such as pages a scan found full.
    pub fn unsafe_release_page(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.release_lock(page_id, tid)
    }

    /// Get the lock manager.
    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Get the pool size in pages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pages currently cached.
    pub fn cached_page_count(&self) -> usize {
        self.state.lock().pages.len()
    }

    /// Check if `page_id` is in the cache.
    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.state.lock().pages.contains_key(&page_id)
    }

    /// Get the catalog pages are resolved against.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Get buffer pool statistics.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("cached", &self.cached_page_count())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
