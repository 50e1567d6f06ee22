//! File splitting: generated names, per-file integrity, and stream equality
//! with the unsplit equivalent.

use evio::{CompressionType, Endian, EventWriter, EvioReader, WriterOptions};
use tempfile::TempDir;

fn events(n: usize) -> Vec<Vec<u8>> {
    // Pseudo-random payloads so compression cannot collapse the files far
    // below the split threshold.
    let mut rng: u32 = 0x6d2b_79f5;
    (0..n)
        .map(|i| {
            let mut ev = vec![0u8; 512];
            Endian::Big.write_u32(&mut ev[..4], i as u32);
            for b in ev.iter_mut().skip(4) {
                rng ^= rng << 13;
                rng ^= rng >> 17;
                rng ^= rng << 5;
                *b = rng as u8;
            }
            ev
        })
        .collect()
}

fn drain(reader: &mut EvioReader) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(ev) = reader.next_event().unwrap() {
        out.push(ev);
    }
    out
}

#[test]
fn split_files_carry_the_template_substitutions() {
    std::env::set_var("USER", "tester");
    let dir = TempDir::new().unwrap();
    let template = dir
        .path()
        .join("my_$(USER)_%s_run#%d_stream#%d_.%06d")
        .to_str()
        .unwrap()
        .to_string();

    let evs = events(600);
    let opts = WriterOptions::new(&template)
        .run(2, "MyRunType")
        .stream(3, 1)
        .record_limits(40, 32 * 1024)
        .split_bytes(64 * 1024);
    let mut w = EventWriter::create(opts).unwrap();
    for e in &evs {
        w.add_event(e).unwrap();
    }
    w.close().unwrap();
    let paths: Vec<_> = w.paths().to_vec();
    drop(w);

    assert!(paths.len() >= 3, "expected at least 3 splits, got {paths:?}");
    for (i, p) in paths.iter().enumerate() {
        let expected = dir
            .path()
            .join(format!("my_tester_MyRunType_run#2_stream#3_.{i:06}"));
        assert_eq!(p, &expected);
        assert!(p.exists());
    }

    // Every split is a well-formed file; the concatenated event sequence
    // equals what was written.
    let mut all = Vec::new();
    for p in &paths {
        let mut r = EvioReader::open(p).unwrap();
        all.extend(drain(&mut r));
    }
    assert_eq!(all, evs);
}

#[test]
fn split_and_unsplit_streams_are_identical() {
    let dir = TempDir::new().unwrap();
    let evs = events(400);

    let split_template = dir.path().join("split_%d.%06d").to_str().unwrap().to_string();
    let opts = WriterOptions::new(&split_template)
        .compression(CompressionType::Lz4)
        .record_limits(25, 16 * 1024)
        .split_bytes(40 * 1024);
    let mut w = EventWriter::create(opts).unwrap();
    for e in &evs {
        w.add_event(e).unwrap();
    }
    w.close().unwrap();
    let split_paths: Vec<_> = w.paths().to_vec();
    drop(w);
    assert!(split_paths.len() > 1);

    let unsplit = dir.path().join("unsplit.evio");
    let opts = WriterOptions::new(unsplit.to_str().unwrap())
        .compression(CompressionType::Lz4)
        .record_limits(25, 16 * 1024);
    let mut w = EventWriter::create(opts).unwrap();
    for e in &evs {
        w.add_event(e).unwrap();
    }
    w.close().unwrap();
    drop(w);

    let mut split_events = Vec::new();
    for p in &split_paths {
        let mut r = EvioReader::open(p).unwrap();
        split_events.extend(drain(&mut r));
    }
    let mut r = EvioReader::open(&unsplit).unwrap();
    let unsplit_events = drain(&mut r);
    assert_eq!(split_events, unsplit_events);
}

#[test]
fn every_split_repeats_the_first_event() {
    let dir = TempDir::new().unwrap();
    let template = dir.path().join("fe_%d.%06d").to_str().unwrap().to_string();
    let first: Vec<u8> = vec![0xfe; 16];

    let evs = events(300);
    let opts = WriterOptions::new(&template)
        .first_event(first.clone())
        .dictionary("<dict/>")
        .record_limits(20, 16 * 1024)
        .split_bytes(48 * 1024);
    let mut w = EventWriter::create(opts).unwrap();
    for e in &evs {
        w.add_event(e).unwrap();
    }
    w.close().unwrap();
    let paths: Vec<_> = w.paths().to_vec();
    drop(w);
    assert!(paths.len() > 1);

    for p in &paths {
        let mut r = EvioReader::open(p).unwrap();
        assert_eq!(r.dictionary_xml(), Some("<dict/>"));
        assert_eq!(r.first_event(), Some(first.as_slice()));
        // The first event leads every split's event stream.
        assert_eq!(r.event(0).unwrap(), first);
    }
}
