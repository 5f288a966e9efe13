//! Transaction identifier type.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque token naming one transaction.
///
/// Carries no state of its own. It keys the lock table and records which
/// transaction dirtied a cached page.
///
/// # Example
/// ```
/// use tupledb::TransactionId;
///
/// let t1 = TransactionId::new();
/// let t2 = TransactionId::new();
/// assert_ne!(t1, t2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocate a process-unique transaction id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        TransactionId(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw id. Uniqueness is the caller's problem.
    #[inline]
    pub fn from_raw(id: u64) -> Self {
        TransactionId(id)
    }

    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txn({})", self.0)
    }
}
