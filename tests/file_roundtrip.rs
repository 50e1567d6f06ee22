//! End-to-end file scenarios: write, read back, survive corruption.

use std::io::{Read, Seek, SeekFrom, Write};

use evio::{
    CompressionType, DataType, Endian, EventTree, EventWriter, EventWriterMt, EvioError,
    EvioReader, LeafData, RecordHeader, WriterOptions,
};
use tempfile::TempDir;

#[test]
fn three_single_bank_events_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("three.evio");

    let tree = EventTree::leaf_bank(0x1234, 0x12, LeafData::Int32(vec![1])).unwrap();
    let mut w = EventWriter::create(WriterOptions::new(path.to_str().unwrap())).unwrap();
    for _ in 0..3 {
        w.add_event_tree(&tree).unwrap();
    }
    w.close().unwrap();

    let mut r = EvioReader::open(&path).unwrap();
    assert_eq!(r.event_count(), 3);
    for i in 0..3 {
        let bytes = r.event(i).unwrap();
        let back = EventTree::parse(&bytes, r.byte_order()).unwrap();
        assert_eq!(back.tag(back.root()), 0x1234);
        assert_eq!(back.num(back.root()), 0x12);
        assert_eq!(back.data_type(back.root()), DataType::Int32);
        assert_eq!(back.leaf_data(back.root()), &LeafData::Int32(vec![1]));
    }
}

#[test]
fn pipeline_writes_ten_thousand_events() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipeline.evio");

    let opts = WriterOptions::new(path.to_str().unwrap())
        .compression(CompressionType::Lz4)
        .workers(2)
        .ring_size(32)
        .record_limits(1000, 256 * 1024);
    let mut w = EventWriterMt::create(opts).unwrap();

    let mut events = Vec::with_capacity(10_000);
    for i in 0..10_000u32 {
        let mut ev = vec![0u8; 400];
        Endian::Big.write_u32(&mut ev[..4], i);
        for (j, b) in ev.iter_mut().enumerate().skip(4) {
            *b = ((i as usize + j) % 241) as u8;
        }
        w.add_event(&ev).unwrap();
        events.push(ev);
    }
    w.close().unwrap();

    let mut r = EvioReader::open(&path).unwrap();
    assert_eq!(r.event_count(), 10_000);
    assert!(r.record_count() > 1);
    for (i, expected) in events.iter().enumerate() {
        assert_eq!(&r.event(i as u64).unwrap(), expected, "event {i}");
    }
}

#[test]
fn sequential_cursor_matches_random_access() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cursor.evio");
    let mut w = EventWriter::create(
        WriterOptions::new(path.to_str().unwrap()).record_limits(7, 1 << 20),
    )
    .unwrap();
    for i in 0..50u32 {
        w.add_event(&i.to_be_bytes()).unwrap();
    }
    w.close().unwrap();

    let mut r = EvioReader::open(&path).unwrap();
    let mut sequential = Vec::new();
    while let Some(ev) = r.next_event().unwrap() {
        sequential.push(ev);
    }
    assert_eq!(sequential.len(), 50);
    for (i, ev) in sequential.iter().enumerate() {
        assert_eq!(&r.event(i as u64).unwrap(), ev);
    }
    r.rewind();
    assert_eq!(r.next_event().unwrap().unwrap(), sequential[0]);
}

/// Walks the on-disk records and returns their byte offsets.
fn record_offsets(path: &std::path::Path) -> Vec<u64> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)
        .unwrap()
        .read_to_end(&mut bytes)
        .unwrap();
    let mut offsets = Vec::new();
    let mut pos = 56u64;
    loop {
        let header = RecordHeader::read(&bytes[pos as usize..], pos).unwrap();
        if header.header_type.is_trailer() {
            break;
        }
        offsets.push(pos);
        pos += header.record_length_bytes() as u64;
    }
    offsets
}

#[test]
fn corrupt_record_magic_is_isolated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.evio");

    // Ten records of ten events each.
    let mut w = EventWriter::create(
        WriterOptions::new(path.to_str().unwrap()).record_limits(10, 1 << 20),
    )
    .unwrap();
    for i in 0..100u32 {
        w.add_event(&i.to_be_bytes()).unwrap();
    }
    w.close().unwrap();

    let offsets = record_offsets(&path);
    assert_eq!(offsets.len(), 10);
    {
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap();
        f.seek(SeekFrom::Start(offsets[5] + 28)).unwrap();
        f.write_all(&[0xde, 0xad, 0xbe, 0xef]).unwrap();
    }

    // The trailer index still opens the file.
    let mut r = EvioReader::open(&path).unwrap();
    assert_eq!(r.event_count(), 100);

    // Records before and after the damage stay readable.
    for i in 0..50u64 {
        assert_eq!(r.event(i).unwrap(), (i as u32).to_be_bytes());
    }
    for i in 60..100u64 {
        assert_eq!(r.event(i).unwrap(), (i as u32).to_be_bytes());
    }

    // An event inside record 5 reports a format error at that record.
    match r.event(55) {
        Err(EvioError::BadFormat { offset, .. }) => assert_eq!(offset, offsets[5]),
        other => panic!("expected BadFormat, got {other:?}"),
    }
}

#[test]
fn trailer_index_and_linear_scan_agree() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("indexed.evio");
    let mut w = EventWriter::create(
        WriterOptions::new(path.to_str().unwrap())
            .compression(CompressionType::Gzip)
            .record_limits(9, 1 << 20),
    )
    .unwrap();
    for i in 0..77u32 {
        w.add_event(&i.to_be_bytes()).unwrap();
    }
    w.close().unwrap();

    let mut indexed = EvioReader::open(&path).unwrap();

    // Clear the trailer-with-index bit so a second reader must scan.
    let scan_path = dir.path().join("scanned.evio");
    std::fs::copy(&path, &scan_path).unwrap();
    {
        let mut f = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&scan_path)
            .unwrap();
        let mut header = vec![0u8; 56];
        f.read_exact(&mut header).unwrap();
        let mut fh = evio::FileHeader::read(&header, 0).unwrap();
        fh.has_trailer_with_index = false;
        fh.trailer_position = 0;
        fh.write(&mut header).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f.write_all(&header).unwrap();
    }
    let mut scanned = EvioReader::open(&scan_path).unwrap();

    assert_eq!(indexed.record_count(), scanned.record_count());
    assert_eq!(indexed.event_count(), scanned.event_count());
    loop {
        let a = indexed.next_event().unwrap();
        let b = scanned.next_event().unwrap();
        assert_eq!(a, b);
        if a.is_none() {
            break;
        }
    }
}
