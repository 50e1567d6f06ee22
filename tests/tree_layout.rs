//! Bit-exact serialized layout of a nested bank tree in both byte orders.

use evio::{
    CompressionType, DataType, Endian, EventTree, EventWriter, LeafData, RecordInput,
    StructureKind, WriterOptions,
};

/// Bank (1,BANK,1) { Bank (2,BANK,2) { Bank (3,INT32,3) [1, 2] },
///                   Bank (4,BANK,4) { Bank (5,INT32,5) [10, 10] } }
fn nested_event() -> EventTree {
    let mut t = EventTree::new_bank(1, 1, DataType::Bank);
    let left = t
        .add_container(t.root(), StructureKind::Bank, 2, 2, DataType::Bank)
        .unwrap();
    t.add_leaf(
        left,
        StructureKind::Bank,
        3,
        3,
        LeafData::Int32(vec![0x01, 0x02]),
    )
    .unwrap();
    let right = t
        .add_container(t.root(), StructureKind::Bank, 4, 4, DataType::Bank)
        .unwrap();
    t.add_leaf(
        right,
        StructureKind::Bank,
        5,
        5,
        LeafData::Int32(vec![0x0a, 0x0a]),
    )
    .unwrap();
    t
}

/// Reference image, word by word.
const WORDS: [u32; 14] = [
    0x0000_000D, // root: 13 words follow
    0x0001_0E01, // tag 1, type BANK, num 1
    0x0000_0005, // left sub-bank: 5 words follow
    0x0002_0E02,
    0x0000_0003, // int bank: 3 words follow
    0x0003_0B03,
    0x0000_0001,
    0x0000_0002,
    0x0000_0005, // right sub-bank
    0x0004_0E04,
    0x0000_0003,
    0x0005_0B05,
    0x0000_000A,
    0x0000_000A,
];

fn reference_bytes(order: Endian) -> Vec<u8> {
    let mut out = Vec::with_capacity(WORDS.len() * 4);
    for w in WORDS {
        match order {
            Endian::Big => out.extend_from_slice(&w.to_be_bytes()),
            Endian::Little => out.extend_from_slice(&w.to_le_bytes()),
        }
    }
    out
}

#[test]
fn serialized_tree_matches_reference_both_orders() {
    let t = nested_event();
    for order in [Endian::Big, Endian::Little] {
        assert_eq!(t.to_bytes(order).unwrap(), reference_bytes(order), "{order:?}");
    }
}

#[test]
fn reference_bytes_parse_back_to_the_tree() {
    for order in [Endian::Big, Endian::Little] {
        let t = EventTree::parse(&reference_bytes(order), order).unwrap();
        assert_eq!(t, nested_event());
    }
}

#[test]
fn record_payload_carries_the_reference_image() {
    for order in [Endian::Big, Endian::Little] {
        let opts = WriterOptions::new("")
            .byte_order(order)
            .compression(CompressionType::Lz4);
        let mut w = EventWriter::to_buffer(opts).unwrap();
        w.add_event_tree(&nested_event()).unwrap();
        let bytes = w.into_buffer().unwrap();

        let record = RecordInput::parse(&bytes[56..], 56).unwrap();
        assert_eq!(record.event_count(), 1);
        assert_eq!(record.event_slice(0).unwrap(), reference_bytes(order));
    }
}
