//! Error types for tupledb.

use thiserror::Error;

use crate::common::{PageId, TransactionId};
use crate::storage::RecordId;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in tupledb.
///
/// Lookup failures, deadlock aborts, storage failures and capacity
/// exhaustion all travel through this one enum so callers can match on the
/// variant they care about (most importantly [`Error::TransactionAborted`]).
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from heap file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page lies beyond the end of its table file.
    #[error("{0} not found")]
    PageNotFound(PageId),

    /// Requested table is not registered in the catalog.
    #[error("table {0} not found")]
    TableNotFound(String),

    /// The slot a tuple claims to live in is empty or belongs elsewhere.
    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    /// The transaction was chosen as a deadlock victim.
    ///
    /// The caller must finish it with `transaction_complete(tid, false)` and
    /// may retry under a fresh transaction id.
    #[error("{0} aborted")]
    TransactionAborted(TransactionId),

    /// Every cached page is dirtied by another live transaction.
    #[error("buffer pool is full and no page can be evicted")]
    NoEvictablePage,

    /// Page has no empty slot left.
    #[error("{0} is full")]
    PageFull(PageId),

    /// Page bytes on disk do not decode under the table schema.
    #[error("{page_id} is corrupt: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    /// Tuple does not fit the schema it is being stored under.
    #[error("invalid tuple: {0}")]
    InvalidTuple(String),

    /// Configuration value out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed line in a catalog schema file.
    #[error("schema file line {line}: {reason}")]
    SchemaParse { line: usize, reason: String },
}

impl Error {
    /// True for deadlock aborts.
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, Error::TransactionAborted(_))
    }

    /// True when a page, table or record could not be found.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            Error::PageNotFound(_) | Error::TableNotFound(_) | Error::RecordNotFound(_)
        )
    }
}
