//! Page header: the slot occupancy bitmap.
//!
//! Every heap page starts with a [`SlotBitmap`], one bit per slot, rounded
//! up to a whole byte.

/// Occupancy bitmap stored at the beginning of every heap page.
///
/// # Layout
/// ```text
/// byte 0            byte 1            ...
/// ┌───────────────┐ ┌───────────────┐
/// │7 6 5 4 3 2 1 0│ │F E D C B A 9 8│   <- slot numbers
/// └───────────────┘ └───────────────┘
/// ```
///
/// Slot `i` lives in byte `i / 8` at bit `i % 8`, least significant bit
/// first. Padding bits past the last slot are always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotBitmap {
    bytes: Vec<u8>,
    num_slots: usize,
}

impl SlotBitmap {
    /// Empty bitmap for `num_slots` slots.
    pub fn new(num_slots: usize) -> Self {
        Self {
            bytes: vec![0u8; Self::size_for(num_slots)],
            num_slots,
        }
    }

    /// Bytes needed to hold `num_slots` bits.
    #[inline]
    pub const fn size_for(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// Read a bitmap from the beginning of a page image.
    ///
    /// # Panics
    /// Panics if `data` is shorter than the header.
    pub fn from_bytes(data: &[u8], num_slots: usize) -> Self {
        let size = Self::size_for(num_slots);
        assert!(data.len() >= size, "buffer too small for SlotBitmap");
        Self {
            bytes: data[..size].to_vec(),
            num_slots,
        }
    }

    /// Write this bitmap to the beginning of a page image.
    pub fn write_to(&self, data: &mut [u8]) {
        data[..self.bytes.len()].copy_from_slice(&self.bytes);
    }

    #[inline]
    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    #[inline]
    pub fn is_used(&self, slot: usize) -> bool {
        slot < self.num_slots && self.bytes[slot / 8] & (1 << (slot % 8)) != 0
    }

    /// Mark a slot used or free.
    ///
    /// # Panics
    /// Panics if `slot` is out of range.
    pub fn set_used(&mut self, slot: usize, used: bool) {
        assert!(slot < self.num_slots, "slot {} out of range", slot);
        let mask = 1u8 << (slot % 8);
        if used {
            self.bytes[slot / 8] |= mask;
        } else {
            self.bytes[slot / 8] &= !mask;
        }
    }

    /// First free slot, if any.
    pub fn first_free(&self) -> Option<usize> {
        (0..self.num_slots).find(|&slot| !self.is_used(slot))
    }

    pub fn count_free(&self) -> usize {
        (0..self.num_slots).filter(|&slot| !self.is_used(slot)).count()
    }

    /// True if a bit is set beyond the last slot.
    pub fn has_stray_bits(&self) -> bool {
        (self.num_slots..self.bytes.len() * 8).any(|bit| self.bytes[bit / 8] & (1 << (bit % 8)) != 0)
    }
}
