//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache between transactions and the
//! heap files. Every page access, tuple change and transaction end goes
//! through it.
//!
//! # Components
//! - [`BufferPool`] - The page cache and transaction entry point
//! - [`PageRef`] - Shared handle to a cached page
//! - [`BufferPoolStats`] - Performance statistics
//! - [`replacer`] - Eviction ordering

mod buffer_pool;
pub mod replacer;
mod stats;

pub use buffer_pool::{BufferPool, PageRef};
pub use stats::{BufferPoolStats, StatsSnapshot};
