//! LRU (Least-Recently-Used) replacement policy.

use std::collections::{BTreeMap, HashMap};

use crate::common::PageId;

/// Orders cached pages by last access.
///
/// The replacer does not decide on its own which page may go: the buffer
/// pool walks candidates from least to most recently used and applies its
/// own dirtiness rules.
///
/// ```text
///  order (tick -> page)     oldest ──────────────▶ newest
///                           [3: P1] [7: P4] [9: P2]
/// ```
#[derive(Debug, Default)]
pub struct LruReplacer {
    tick: u64,
    last_access: HashMap<PageId, u64>,
    order: BTreeMap<u64, PageId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `page_id` to the most-recently-used end, tracking it if new.
    pub fn record_access(&mut self, page_id: PageId) {
        self.tick += 1;
        if let Some(old) = self.last_access.insert(page_id, self.tick) {
            self.order.remove(&old);
        }
        self.order.insert(self.tick, page_id);
    }

    /// Stop tracking `page_id`.
    pub fn remove(&mut self, page_id: PageId) {
        if let Some(tick) = self.last_access.remove(&page_id) {
            self.order.remove(&tick);
        }
    }

    /// Least recently used page accepted by `evictable`.
    pub fn find_victim(&self, mut evictable: impl FnMut(PageId) -> bool) -> Option<PageId> {
        self.order.values().copied().find(|&page_id| evictable(page_id))
    }

    /// Tracked pages, least recently used first.
    pub fn iter(&self) -> impl Iterator<Item = PageId> + '_ {
        self.order.values().copied()
    }

    pub fn len(&self) -> usize {
        self.last_access.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_access.is_empty()
    }
}
