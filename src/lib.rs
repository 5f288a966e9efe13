//! tupledb - the storage and concurrency core of a single-node relational
//! engine: a page cache, a strict two-phase page lock manager with deadlock
//! detection, and the on-disk heap page format.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Database                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Buffer Pool (buffer/)                       │   │
//! │  │  get_page · insert_tuple · delete_tuple                  │   │
//! │  │  transaction_complete · LRU eviction · statistics        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │            ↓ lock first                  ↓ then load/flush      │
//! │  ┌──────────────────────────┐  ┌───────────────────────────┐   │
//! │  │ Lock Manager             │  │ Catalog (catalog.rs)      │   │
//! │  │ (concurrency/)           │  │ table id → HeapFile       │   │
//! │  │ PageLock + wait-for DFS  │  └───────────────────────────┘   │
//! │  └──────────────────────────┘                ↓                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │     HeapFile + HeapPage + SlotBitmap + Tuple             │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (ids, permissions, Error, config)
//! - [`buffer`] - Buffer pool and eviction ordering
//! - [`concurrency`] - Page locks and deadlock detection
//! - [`storage`] - Heap files, page format and tuples
//! - [`catalog`] - Table registry
//! - [`database`] - The context object tying them together
//!
//! # Quick Start
//! ```no_run
//! use tupledb::{Config, Database, Field, Tuple, TupleDesc, Type};
//!
//! # fn main() -> tupledb::Result<()> {
//! let db = Database::new(Config::default())?;
//! let table = db.create_table("accounts.dat", "accounts", TupleDesc::new(&[Type::Int]), None)?;
//! let schema = db.catalog().schema(table)?;
//!
//! let tid = db.begin();
//! db.buffer_pool().insert_tuple(tid, table, Tuple::new(schema, vec![Field::Int(100)])?)?;
//!
//! let file = db.catalog().heap_file(table)?;
//! let mut scan = file.iter(db.buffer_pool(), tid);
//! scan.open();
//! for tuple in scan {
//!     println!("{:?}", tuple?.fields());
//! }
//! db.commit(tid)?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod database;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{DEFAULT_PAGE_SIZE, DEFAULT_POOL_PAGES};
pub use common::{Config, Error, PageId, Permission, Result, TableId, TransactionId};

pub use buffer::{BufferPool, BufferPoolStats, PageRef, StatsSnapshot};
pub use catalog::Catalog;
pub use concurrency::{LockManager, LockMode, PageLock};
pub use database::Database;
pub use storage::{Field, HeapFile, HeapPage, RecordId, Tuple, TupleDesc, Type};
