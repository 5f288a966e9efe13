//! Page-granularity lock manager with deadlock detection.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::page_lock::{LockMode, PageLock};
use super::waits_for::WaitsForGraph;
use crate::common::{Error, PageId, Permission, Result, TransactionId};

/// Grants shared/exclusive page locks to transactions under strict
/// two-phase locking.
///
/// Locks are only released in bulk by [`release_all`](Self::release_all)
/// when a transaction finishes, or page by page through
/// [`release_lock`](Self::release_lock) for callers that know what they are
/// doing.
///
/// Every time a request has to wait, the requester's wait-for edges are
/// refreshed and the whole graph is searched for a cycle. If one is found
/// the *requester* is refused with [`Error::TransactionAborted`]; the
/// other transactions keep waiting.
///
/// # Thread Safety
/// Latches are always taken in the order page lock, then `waits_for` or
/// `held`. `locks` is only held long enough to clone an `Arc`.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<PageId, Arc<PageLock>>>,
    held: Mutex<HashMap<TransactionId, HashSet<PageId>>>,
    waits_for: Mutex<WaitsForGraph>,
    deadlocks: AtomicU64,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn page_lock(&self, page_id: PageId) -> Arc<PageLock> {
        Arc::clone(self.locks.lock().entry(page_id).or_default())
    }

    fn existing_lock(&self, page_id: PageId) -> Option<Arc<PageLock>> {
        self.locks.lock().get(&page_id).cloned()
    }

    /// Block until `tid` holds `page_id` with `permission`.
    ///
    /// Returns `Err(TransactionAborted(tid))` if waiting would close a
    /// cycle in the wait-for graph. The caller is expected to abort the
    /// transaction, which releases whatever it already holds.
    pub fn acquire_lock(
        &self,
        page_id: PageId,
        tid: TransactionId,
        permission: Permission,
    ) -> Result<()> {
        let mode = LockMode::from(permission);
        let lock = self.page_lock(page_id);

        lock.acquire_with(tid, mode, |blockers| {
            let mut graph = self.waits_for.lock();
            graph.set_waits(tid, blockers);
            if blockers.is_empty() || !graph.has_cycle() {
                return Ok(());
            }

            graph.clear_waits(tid);
            self.deadlocks.fetch_add(1, Ordering::Relaxed);
            warn!(%tid, page = %page_id, ?mode, ?blockers, "deadlock detected");
            Err(Error::TransactionAborted(tid))
        })?;

        self.held.lock().entry(tid).or_default().insert(page_id);
        Ok(())
    }

    /// Release `tid`'s lock on one page. Returns false if it held none.
    pub fn release_lock(&self, page_id: PageId, tid: TransactionId) -> bool {
        let released = self
            .existing_lock(page_id)
            .and_then(|lock| lock.release(tid))
            .is_some();

        let mut held = self.held.lock();
        if let Some(pages) = held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                held.remove(&tid);
            }
        }
        released
    }

    /// Release every lock `tid` holds and forget its wait-for edges.
    /// Returns the pages that were released, in page order.
    pub fn release_all(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .held
            .lock()
            .remove(&tid)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        pages.sort();

        self.waits_for.lock().remove_transaction(tid);

        for &page_id in &pages {
            if let Some(lock) = self.existing_lock(page_id) {
                lock.release(tid);
            }
        }

        debug!(%tid, released = pages.len(), "released all locks");
        pages
    }

    /// True if `tid` holds `page_id` in any mode.
    pub fn holds(&self, page_id: PageId, tid: TransactionId) -> bool {
        self.lock_mode(page_id, tid).is_some()
    }

    pub fn lock_mode(&self, page_id: PageId, tid: TransactionId) -> Option<LockMode> {
        self.existing_lock(page_id)
            .and_then(|lock| lock.mode_of(tid))
    }

    /// Transactions currently holding `page_id`.
    pub fn holders_of(&self, page_id: PageId) -> Vec<TransactionId> {
        self.existing_lock(page_id)
            .map(|lock| lock.holders())
            .unwrap_or_default()
    }

    /// Pages `tid` holds a lock on, in page order.
    pub fn pages_held_by(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .held
            .lock()
            .get(&tid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }

    /// Transactions `tid` is currently blocked on.
    pub fn waiting_on(&self, tid: TransactionId) -> Vec<TransactionId> {
        self.waits_for.lock().waits_on(tid)
    }

    /// Number of requests refused because of a deadlock so far.
    pub fn deadlocks_detected(&self) -> u64 {
        self.deadlocks.load(Ordering::Relaxed)
    }
}
