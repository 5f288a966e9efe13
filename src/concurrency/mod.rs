//! Transaction concurrency control.
//!
//! - [`PageLock`] - Shared/exclusive lock on a single page
//! - [`LockManager`] - Strict two-phase locking over all pages, with
//!   deadlock detection on a wait-for graph

mod lock_manager;
mod page_lock;
mod waits_for;

pub use lock_manager::LockManager;
pub use page_lock::{LockMode, PageLock};
pub use waits_for::WaitsForGraph;
