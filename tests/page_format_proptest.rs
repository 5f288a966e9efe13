//! Property tests for the heap page byte format.

use std::sync::Arc;

use proptest::prelude::*;
use tupledb::storage::page::SlotBitmap;
use tupledb::storage::STRING_LEN;
use tupledb::{Field, HeapPage, PageId, TableId, Tuple, TupleDesc, Type};

const PAGE_SIZE: usize = 512;

fn page_id() -> PageId {
    PageId::new(TableId(1), 0)
}

/// Hand-build a page image: header bits LSB first, big-endian ints, zeroed
/// free slots and tail.
fn int_page_image(slots: &[Option<i32>]) -> Vec<u8> {
    let header_len = SlotBitmap::size_for(slots.len());
    let mut data = vec![0u8; PAGE_SIZE];
    for (slot, value) in slots.iter().enumerate() {
        if let Some(v) = value {
            data[slot / 8] |= 1 << (slot % 8);
            let start = header_len + slot * 4;
            data[start..start + 4].copy_from_slice(&v.to_be_bytes());
        }
    }
    data
}

fn int_slots() -> impl Strategy<Value = Vec<Option<i32>>> {
    let n = HeapPage::slots_per_page(PAGE_SIZE, &TupleDesc::new(&[Type::Int]));
    prop::collection::vec(prop::option::of(any::<i32>()), n)
}

proptest! {
    #[test]
    fn prop_int_page_image_roundtrip(slots in int_slots()) {
        let schema = Arc::new(TupleDesc::new(&[Type::Int]));
        let image = int_page_image(&slots);

        let page = HeapPage::from_bytes(page_id(), schema, PAGE_SIZE, &image).unwrap();
        prop_assert_eq!(page.to_bytes(), image);

        let decoded: Vec<Field> = page.tuples().map(|t| t.fields()[0].clone()).collect();
        let expected: Vec<Field> = slots.iter().flatten().map(|&v| Field::Int(v)).collect();
        prop_assert_eq!(decoded, expected);
        prop_assert_eq!(
            page.empty_slot_count(),
            slots.iter().filter(|s| s.is_none()).count()
        );
    }

    #[test]
    fn prop_string_tuples_survive_encode_decode(
        rows in prop::collection::vec((any::<i32>(), "[a-z0-9 ]{0,128}"), 0..3)
    ) {
        let schema = Arc::new(TupleDesc::new(&[Type::Int, Type::Str]));
        let mut page = HeapPage::empty(page_id(), Arc::clone(&schema), PAGE_SIZE);
        for (n, s) in &rows {
            let tuple = Tuple::new(
                Arc::clone(&schema),
                vec![Field::Int(*n), Field::Str(s.clone())],
            )
            .unwrap();
            page.insert_tuple(&tuple).unwrap();
        }

        let image = page.to_bytes();
        prop_assert_eq!(image.len(), PAGE_SIZE);
        let decoded = HeapPage::from_bytes(page_id(), schema, PAGE_SIZE, &image).unwrap();
        prop_assert_eq!(decoded.to_bytes(), image);

        let values: Vec<(i32, String)> = decoded
            .tuples()
            .map(|t| match t.fields() {
                [Field::Int(n), Field::Str(s)] => (*n, s.clone()),
                other => panic!("unexpected fields {other:?}"),
            })
            .collect();
        prop_assert_eq!(values, rows);
    }

    #[test]
    fn prop_deletes_free_exactly_their_slots(
        deletes in prop::collection::btree_set(0usize..62, 0..62)
    ) {
        let schema = Arc::new(TupleDesc::new(&[Type::Int]));
        let mut page = HeapPage::empty(page_id(), Arc::clone(&schema), PAGE_SIZE);
        let capacity = page.num_slots();
        prop_assume!(capacity >= 62);

        let mut stored = Vec::new();
        for v in 0..capacity as i32 {
            let tuple = Tuple::new(Arc::clone(&schema), vec![Field::Int(v)]).unwrap();
            let rid = page.insert_tuple(&tuple).unwrap();
            let mut tuple = tuple;
            tuple.set_record_id(Some(rid));
            stored.push(tuple);
        }
        for &slot in &deletes {
            page.delete_tuple(&stored[slot]).unwrap();
        }

        prop_assert_eq!(page.empty_slot_count(), deletes.len());
        for slot in 0..capacity {
            prop_assert_eq!(page.is_slot_used(slot), !deletes.contains(&slot));
        }

        // Freed slots are refilled lowest first.
        if let Some(&lowest) = deletes.iter().next() {
            let tuple = Tuple::new(Arc::clone(&schema), vec![Field::Int(-1)]).unwrap();
            prop_assert_eq!(page.insert_tuple(&tuple).unwrap().slot, lowest);
        }
    }
}

#[test]
fn test_string_field_layout() {
    let schema = Arc::new(TupleDesc::new(&[Type::Str]));
    let mut page = HeapPage::empty(page_id(), Arc::clone(&schema), PAGE_SIZE);
    let tuple = Tuple::new(schema, vec![Field::Str("hey".to_string())]).unwrap();
    page.insert_tuple(&tuple).unwrap();

    let image = page.to_bytes();
    let header_len = SlotBitmap::size_for(page.num_slots());
    assert_eq!(image[0], 0b0000_0001);
    assert_eq!(&image[header_len..header_len + 4], &3u32.to_be_bytes());
    assert_eq!(&image[header_len + 4..header_len + 7], b"hey");
    assert!(image[header_len + 7..header_len + 4 + STRING_LEN]
        .iter()
        .all(|&b| b == 0));
}
