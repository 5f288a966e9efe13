//! Common types and utilities shared across tupledb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration
//! - Error types
//! - Identifiers (TableId, PageId, TransactionId)
//! - Access permissions

pub mod config;
pub mod error;
mod page_id;
mod transaction_id;

pub use config::Config;
pub use error::{Error, Result};
pub use page_id::{PageId, TableId};
pub use transaction_id::TransactionId;

/// Access a transaction requests when fetching a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Shared access; many readers at once.
    ReadOnly,
    /// Exclusive access; the page is marked dirty on fetch.
    ReadWrite,
}
