//! Per-page shared/exclusive lock.
//!
//! A [`PageLock`] tracks which transactions hold a page and in which mode.
//! Acquisition blocks the calling thread on a condition variable until the
//! request is compatible with the current holders.

use std::collections::HashMap;
use std::convert::Infallible;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::common::{Permission, TransactionId};

/// Mode a transaction holds a page in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl From<Permission> for LockMode {
    fn from(permission: Permission) -> Self {
        match permission {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

#[derive(Debug, Default)]
struct LockState {
    holders: HashMap<TransactionId, LockMode>,
    /// Threads parked in `acquire_with`.
    waiting: usize,
}

impl LockState {
    /// Holders other than `tid` that stop `tid` from getting `mode`.
    fn conflicting_holders(&self, tid: TransactionId, mode: LockMode) -> Vec<TransactionId> {
        match mode {
            LockMode::Shared => {
                if self.holders.contains_key(&tid) {
                    return Vec::new();
                }
                self.holders
                    .iter()
                    .filter(|(_, &m)| m == LockMode::Exclusive)
                    .map(|(&holder, _)| holder)
                    .collect()
            }
            LockMode::Exclusive => self
                .holders
                .keys()
                .filter(|&&holder| holder != tid)
                .copied()
                .collect(),
        }
    }

    fn grant(&mut self, tid: TransactionId, mode: LockMode) {
        match mode {
            // An exclusive holder keeps its exclusive lock.
            LockMode::Shared => {
                self.holders.entry(tid).or_insert(LockMode::Shared);
            }
            LockMode::Exclusive => {
                self.holders.insert(tid, LockMode::Exclusive);
            }
        }
        debug_assert!(
            self.holders.len() == 1
                || self.holders.values().all(|&m| m == LockMode::Shared),
            "exclusive lock shared with another holder"
        );
    }
}

/// Lock protecting one page.
///
/// # States per (page, transaction)
/// ```text
///            acquire_shared              acquire_exclusive
/// unlocked ─────────────────▶ shared ──────────────────────▶ exclusive
///     ▲                         │                                │
///     └──────── release ────────┴────────────── release ─────────┘
/// ```
///
/// # Invariant
/// The holder map never has more than one entry while any entry is
/// exclusive.
///
/// # Thread Safety
/// Holder state lives behind a `Mutex`. Waiters park on a `Condvar` that
/// every release notifies, and so does every shared grant made while
/// someone is parked, so a waiting writer sees readers that joined after
/// it started waiting.
#[derive(Debug, Default)]
pub struct PageLock {
    state: Mutex<LockState>,
    changed: Condvar,
}

impl PageLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a shared lock, blocking while another transaction holds the page
    /// exclusively. Returns immediately if `tid` already holds any lock.
    pub fn acquire_shared(&self, tid: TransactionId) {
        match self.acquire_with(tid, LockMode::Shared, |_| Ok::<(), Infallible>(())) {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Take an exclusive lock, blocking while any other transaction holds
    /// the page. Upgrades a shared lock held by `tid` itself.
    pub fn acquire_exclusive(&self, tid: TransactionId) {
        match self.acquire_with(tid, LockMode::Exclusive, |_| Ok::<(), Infallible>(())) {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Blocking acquisition with a hook.
    ///
    /// `observe` runs under the lock's latch each time the request is
    /// evaluated, with the holders currently in the way. An empty slice
    /// means the lock is about to be granted. If `observe` fails the
    /// request is abandoned and its error returned; nothing is recorded.
    ///
    /// Parked requests are re-evaluated whenever the holder set changes,
    /// including when another shared holder joins.
    pub fn acquire_with<E>(
        &self,
        tid: TransactionId,
        mode: LockMode,
        mut observe: impl FnMut(&[TransactionId]) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut state = self.state.lock();
        loop {
            let blockers = state.conflicting_holders(tid, mode);
            observe(&blockers)?;

            if blockers.is_empty() {
                let joined = !state.holders.contains_key(&tid);
                state.grant(tid, mode);
                if joined && state.waiting > 0 {
                    self.changed.notify_all();
                }
                trace!(%tid, ?mode, "lock granted");
                return Ok(());
            }

            trace!(%tid, ?mode, ?blockers, "waiting for lock");
            state.waiting += 1;
            self.changed.wait(&mut state);
            state.waiting -= 1;
        }
    }

    /// Drop `tid`'s shared lock. An exclusive lock is left alone.
    /// Returns whether anything was released. Waiters are always woken.
    pub fn release_shared(&self, tid: TransactionId) -> bool {
        self.release_if(tid, LockMode::Shared)
    }

    /// Drop `tid`'s exclusive lock. A shared lock is left alone.
    pub fn release_exclusive(&self, tid: TransactionId) -> bool {
        self.release_if(tid, LockMode::Exclusive)
    }

    /// Drop whatever `tid` holds.
    pub fn release(&self, tid: TransactionId) -> Option<LockMode> {
        let released = self.state.lock().holders.remove(&tid);
        self.changed.notify_all();
        released
    }

    fn release_if(&self, tid: TransactionId, mode: LockMode) -> bool {
        let released = {
            let mut state = self.state.lock();
            if state.holders.get(&tid) == Some(&mode) {
                state.holders.remove(&tid);
                true
            } else {
                false
            }
        };
        self.changed.notify_all();
        released
    }

    /// True if `tid` holds the page in any mode.
    pub fn can_read(&self, tid: TransactionId) -> bool {
        self.state.lock().holders.contains_key(&tid)
    }

    /// True if `tid` holds the page exclusively.
    pub fn can_write(&self, tid: TransactionId) -> bool {
        self.mode_of(tid) == Some(LockMode::Exclusive)
    }

    pub fn mode_of(&self, tid: TransactionId) -> Option<LockMode> {
        self.state.lock().holders.get(&tid).copied()
    }

    /// True if requesting `mode` right now would block `tid`.
    pub fn would_block(&self, tid: TransactionId, mode: LockMode) -> bool {
        !self.state.lock().conflicting_holders(tid, mode).is_empty()
    }

    pub fn holders(&self) -> Vec<TransactionId> {
        self.state.lock().holders.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn tid(n: u64) -> TransactionId {
        TransactionId::from_raw(n)
    }

    #[test]
    fn test_shared_locks_coexist() {
        let lock = PageLock::new();
        lock.acquire_shared(tid(1));
        lock.acquire_shared(tid(2));

        assert!(lock.can_read(tid(1)));
        assert!(lock.can_read(tid(2)));
        assert!(!lock.can_write(tid(1)));
        assert_eq!(lock.holders().len(), 2);
    }

    #[test]
    fn test_exclusive_satisfies_shared() {
        let lock = PageLock::new();
        lock.acquire_exclusive(tid(1));
        lock.acquire_shared(tid(1));

        assert_eq!(lock.mode_of(tid(1)), Some(LockMode::Exclusive));
        assert_eq!(lock.holders(), vec![tid(1)]);
    }

    #[test]
    fn test_upgrade_sole_holder() {
        let lock = PageLock::new();
        lock.acquire_shared(tid(1));
        lock.acquire_exclusive(tid(1));

        assert!(lock.can_write(tid(1)));
        assert_eq!(lock.holders(), vec![tid(1)]);
    }

    #[test]
    fn test_would_block() {
        let lock = PageLock::new();
        lock.acquire_shared(tid(1));

        assert!(!lock.would_block(tid(2), LockMode::Shared));
        assert!(lock.would_block(tid(2), LockMode::Exclusive));
        assert!(!lock.would_block(tid(1), LockMode::Exclusive));

        lock.acquire_shared(tid(2));
        assert!(lock.would_block(tid(1), LockMode::Exclusive));
    }

    #[test]
    fn test_release_matches_mode() {
        let lock = PageLock::new();
        lock.acquire_exclusive(tid(1));

        assert!(!lock.release_shared(tid(1)));
        assert!(lock.can_write(tid(1)));

        assert!(lock.release_exclusive(tid(1)));
        assert!(!lock.can_read(tid(1)));
        assert!(lock.holders().is_empty());
    }

    #[test]
    fn test_observe_error_abandons_request() {
        let lock = PageLock::new();
        lock.acquire_exclusive(tid(1));

        let result = lock.acquire_with(tid(2), LockMode::Shared, |blockers| {
            assert_eq!(blockers, &[tid(1)]);
            Err("refused")
        });
        assert_eq!(result, Err("refused"));
        assert!(!lock.can_read(tid(2)));
    }

    #[test]
    fn test_observe_sees_empty_blockers_on_grant() {
        let lock = PageLock::new();
        let mut seen = Vec::new();
        lock.acquire_with(tid(1), LockMode::Exclusive, |blockers| {
            seen.push(blockers.len());
            Ok::<(), ()>(())
        })
        .unwrap();
        assert_eq!(seen, vec![0]);
    }

    #[test]
    fn test_exclusive_blocks_until_release() {
        let lock = Arc::new(PageLock::new());
        lock.acquire_exclusive(tid(1));

        let acquired = Arc::new(AtomicBool::new(false));
        let handle = {
            let lock = Arc::clone(&lock);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                lock.acquire_shared(tid(2));
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        lock.release(tid(1));
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(lock.mode_of(tid(2)), Some(LockMode::Shared));
    }

    #[test]
    fn test_upgrade_waits_for_other_readers() {
        let lock = Arc::new(PageLock::new());
        lock.acquire_shared(tid(1));
        lock.acquire_shared(tid(2));

        let handle = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || lock.acquire_exclusive(tid(1)))
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(lock.mode_of(tid(1)), Some(LockMode::Shared));

        lock.release_shared(tid(2));
        handle.join().unwrap();
        assert!(lock.can_write(tid(1)));
        assert_eq!(lock.holders(), vec![tid(1)]);
    }

    #[test]
    fn test_waiting_writer_sees_late_reader() {
        let lock = Arc::new(PageLock::new());
        lock.acquire_shared(tid(1));

        let seen = Arc::new(parking_lot::Mutex::new(Vec::<Vec<TransactionId>>::new()));
        let handle = {
            let lock = Arc::clone(&lock);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                lock.acquire_with(tid(3), LockMode::Exclusive, |blockers| {
                    let mut blockers = blockers.to_vec();
                    blockers.sort();
                    seen.lock().push(blockers);
                    Ok::<(), ()>(())
                })
            })
        };
        while seen.lock().is_empty() {
            thread::sleep(Duration::from_millis(5));
        }

        // A reader joining while the writer is parked shows up in the
        // writer's next evaluation, before any release.
        lock.acquire_shared(tid(2));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !seen.lock().contains(&vec![tid(1), tid(2)]) {
            assert!(std::time::Instant::now() < deadline, "writer never re-evaluated");
            thread::sleep(Duration::from_millis(5));
        }

        lock.release(tid(1));
        lock.release(tid(2));
        handle.join().unwrap().unwrap();
        assert!(lock.can_write(tid(3)));
    }

    #[test]
    fn test_permission_maps_to_mode() {
        assert_eq!(LockMode::from(Permission::ReadOnly), LockMode::Shared);
        assert_eq!(LockMode::from(Permission::ReadWrite), LockMode::Exclusive);
    }
}
