//! Page types and layout.
//!
//! This module contains:
//! - [`HeapPage`] - A decoded slotted page of tuples
//! - [`SlotBitmap`] - The occupancy header at the start of every page

mod heap_page;
mod slot_bitmap;

pub use heap_page::HeapPage;
pub use slot_bitmap::SlotBitmap;
