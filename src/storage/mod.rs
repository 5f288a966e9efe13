//! Storage layer - table files, page format and tuples.
//!
//! This module handles persistent storage:
//! - [`HeapFile`] - Per-table page store
//! - [`page`] - Slotted page layout
//! - [`tuple`] - Fixed-width rows and schemas

mod heap_file;
pub mod page;
pub mod tuple;

pub use heap_file::{HeapFile, HeapFileIterator};
pub use page::HeapPage;
pub use tuple::{Field, RecordId, Tuple, TupleDesc, Type, STRING_LEN};
