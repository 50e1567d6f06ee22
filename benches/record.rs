//! Record build and parse throughput across compression kinds.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use evio::{CompressionType, Endian, RecordInput, RecordOutput};

fn events() -> Vec<Vec<u8>> {
    (0..2_000usize)
        .map(|i| {
            let mut ev = vec![0u8; 400];
            for (j, b) in ev.iter_mut().enumerate() {
                *b = ((i * 13 + j) % 251) as u8;
            }
            ev
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let evs = events();
    let total: usize = evs.iter().map(|e| e.len()).sum();
    let mut group = c.benchmark_group("record_build");
    group.throughput(Throughput::Bytes(total as u64));
    for kind in [
        CompressionType::None,
        CompressionType::Lz4,
        CompressionType::Lz4Hc,
        CompressionType::Gzip,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{kind:?}")),
            &kind,
            |b, &kind| {
                let mut record = RecordOutput::new(Endian::Big, kind);
                b.iter(|| {
                    record.reset();
                    for e in &evs {
                        record.try_add_event(e).unwrap();
                    }
                    record.build(None).unwrap();
                    record.as_bytes().unwrap().len()
                });
            },
        );
    }
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let evs = events();
    let total: usize = evs.iter().map(|e| e.len()).sum();
    let mut group = c.benchmark_group("record_parse");
    group.throughput(Throughput::Bytes(total as u64));
    for kind in [CompressionType::None, CompressionType::Lz4] {
        let mut record = RecordOutput::new(Endian::Big, kind);
        for e in &evs {
            record.try_add_event(e).unwrap();
        }
        record.build(None).unwrap();
        let image = record.as_bytes().unwrap().to_vec();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{kind:?}")),
            &image,
            |b, image| {
                b.iter(|| RecordInput::parse(image, 0).unwrap().event_count());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_parse);
criterion_main!(benches);
