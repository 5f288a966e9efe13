//! Eviction ordering for the buffer pool.
//!
//! - [`LruReplacer`] - Least-recently-used ordering over cached pages

mod lru;

pub use lru::LruReplacer;
