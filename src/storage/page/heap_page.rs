//! HeapPage - a slotted page of fixed-width tuples.
//!
//! A [`HeapPage`] is the decoded form of one page of a heap file. It is
//! what the buffer pool caches and what callers read and mutate under a
//! page lock.

use std::sync::Arc;

use crate::common::{Error, PageId, Result, TransactionId};
use crate::storage::tuple::{RecordId, Tuple, TupleDesc};

use super::slot_bitmap::SlotBitmap;

/// A page of tuples.
///
/// # Memory Layout
/// ```text
/// ┌──────────────┬─────────┬─────────┬─────┬───────────┬─────────┐
/// │ slot bitmap  │ slot 0  │ slot 1  │ ... │ slot N-1  │ 0 pad   │
/// │ ceil(N/8) B  │ size B  │ size B  │     │ size B    │         │
/// └──────────────┴─────────┴─────────┴─────┴───────────┴─────────┘
/// N = (page_size * 8) / (size * 8 + 1),  size = schema.byte_size()
/// ```
///
/// Each slot costs its tuple bytes plus one header bit, which is where `N`
/// comes from. Free slots are written as zeros.
///
/// # Dirty tracking
/// `dirtied_by` names the transaction that last modified the page (or
/// fetched it with write permission). `before_image` is the byte image as
/// of the last load from disk or commit.
#[derive(Debug, Clone)]
pub struct HeapPage {
    id: PageId,
    schema: Arc<TupleDesc>,
    page_size: usize,
    header: SlotBitmap,
    tuples: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
    before_image: Vec<u8>,
}

impl HeapPage {
    /// Number of tuple slots a page of `page_size` bytes holds.
    pub fn slots_per_page(page_size: usize, schema: &TupleDesc) -> usize {
        let tuple_bits = schema.byte_size() * 8 + 1;
        (page_size * 8) / tuple_bits
    }

    /// Decode a page image.
    ///
    /// # Errors
    /// `Error::CorruptPage` if `data` is not exactly `page_size` bytes or a
    /// used slot does not decode under `schema`.
    pub fn from_bytes(
        id: PageId,
        schema: Arc<TupleDesc>,
        page_size: usize,
        data: &[u8],
    ) -> Result<Self> {
        if data.len() != page_size {
            return Err(corrupt(
                id,
                format!("expected {} bytes, got {}", page_size, data.len()),
            ));
        }

        let num_slots = Self::slots_per_page(page_size, &schema);
        let header = SlotBitmap::from_bytes(data, num_slots);
        if header.has_stray_bits() {
            return Err(corrupt(id, "header marks slots past the end".to_string()));
        }

        let tuple_size = schema.byte_size();
        let mut tuples = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if !header.is_used(slot) {
                tuples.push(None);
                continue;
            }
            let start = header.len_bytes() + slot * tuple_size;
            let mut tuple = Tuple::parse(&schema, &data[start..start + tuple_size])
                .map_err(|reason| corrupt(id, format!("slot {}: {}", slot, reason)))?;
            tuple.set_record_id(Some(RecordId::new(id, slot)));
            tuples.push(Some(tuple));
        }

        Ok(Self {
            id,
            schema,
            page_size,
            header,
            tuples,
            dirtied_by: None,
            before_image: data.to_vec(),
        })
    }

    /// A page with every slot free.
    pub fn empty(id: PageId, schema: Arc<TupleDesc>, page_size: usize) -> Self {
        let num_slots = Self::slots_per_page(page_size, &schema);
        Self {
            id,
            schema,
            page_size,
            header: SlotBitmap::new(num_slots),
            tuples: vec![None; num_slots],
            dirtied_by: None,
            before_image: vec![0u8; page_size],
        }
    }

    /// Encode to the exact on-disk image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; self.page_size];
        self.header.write_to(&mut data);

        let tuple_size = self.schema.byte_size();
        let base = self.header.len_bytes();
        for (slot, tuple) in self.tuples.iter().enumerate() {
            if let Some(tuple) = tuple {
                let start = base + slot * tuple_size;
                tuple.write_to(&mut data[start..start + tuple_size]);
            }
        }
        data
    }

    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn schema(&self) -> &Arc<TupleDesc> {
        &self.schema
    }

    #[inline]
    pub fn num_slots(&self) -> usize {
        self.header.num_slots()
    }

    pub fn empty_slot_count(&self) -> usize {
        self.header.count_free()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.header.is_used(slot)
    }

    /// Live tuples in slot order.
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().flatten()
    }

    /// Store a copy of `tuple` in the first free slot and return its address.
    ///
    /// # Errors
    /// - `Error::InvalidTuple` if the tuple's column types differ from the
    ///   page schema
    /// - `Error::PageFull` if no slot is free
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<RecordId> {
        if !tuple.schema().same_types(&self.schema) {
            return Err(Error::InvalidTuple(format!(
                "schema [{}] does not match table schema [{}]",
                tuple.schema(),
                self.schema
            )));
        }
        let slot = self.header.first_free().ok_or(Error::PageFull(self.id))?;

        let record_id = RecordId::new(self.id, slot);
        let mut stored = tuple.clone();
        stored.set_record_id(Some(record_id));
        self.tuples[slot] = Some(stored);
        self.header.set_used(slot, true);
        Ok(record_id)
    }

    /// Free the slot `tuple` was stored in.
    ///
    /// # Errors
    /// `Error::RecordNotFound` if the tuple has no record id on this page or
    /// the slot is already free.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let record_id = match tuple.record_id() {
            Some(rid) if rid.page_id == self.id => rid,
            Some(rid) => return Err(Error::RecordNotFound(rid)),
            None => {
                return Err(Error::InvalidTuple(
                    "tuple has no record id".to_string(),
                ))
            }
        };
        if !self.header.is_used(record_id.slot) {
            return Err(Error::RecordNotFound(record_id));
        }
        self.tuples[record_id.slot] = None;
        self.header.set_used(record_id.slot, false);
        Ok(())
    }

    /// Record which transaction (if any) has modified this page.
    pub fn mark_dirty(&mut self, dirtied_by: Option<TransactionId>) {
        self.dirtied_by = dirtied_by;
    }

    #[inline]
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.is_some()
    }

    /// Image of the page as of its last load or commit.
    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }

    /// Take the current content as the new before image.
    pub fn set_before_image(&mut self) {
        self.before_image = self.to_bytes();
    }
}

fn corrupt(page_id: PageId, reason: String) -> Error {
    Error::CorruptPage { page_id, reason }
}

// ============================================================================
// TESTS
// ============================================================================
