use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use segdir::{
    calculate_segment_size,
    directory::{SegmentList, SegmentListItem, SegmentListItemCodec},
    memory::RegionConfig,
};
use tempfile::TempDir;

fn benchmark_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("SegmentListItemCodec");
    let item = SegmentListItem::new(1001, 4096, 1024, 1_700_000_000);
    let encoded = SegmentListItemCodec::encode(&item);

    group.bench_function("encode", |b| b.iter(|| SegmentListItemCodec::encode(&item)));
    group.bench_function("decode", |b| {
        b.iter(|| SegmentListItemCodec::decode(&encoded).unwrap())
    });

    group.finish();
}

fn benchmark_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("calculate_segment_size");

    for length in [0usize, 1024, 1 << 20, 16 << 20].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(length), length, |b, &length| {
            b.iter(|| calculate_segment_size(length))
        });
    }

    group.finish();
}

fn benchmark_directory(c: &mut Criterion) {
    let mut group = c.benchmark_group("SegmentList");

    for capacity in [16usize, 256, 1024].iter() {
        group.bench_with_input(
            BenchmarkId::new("allocate_write_release", capacity),
            capacity,
            |b, &capacity| {
                let dir = TempDir::new().unwrap();
                let config = RegionConfig::new("bench").with_base_dir(dir.path());
                SegmentList::new(config.clone(), 1).init(capacity).unwrap();
                let payload = vec![0x5Au8; 512];

                b.iter(|| {
                    // A fresh view per call, as the client does
                    let mut list = SegmentList::new(config.clone(), 1);
                    let id = list.allocate_segment().unwrap();
                    list.write_to_segment(id, &payload).unwrap();
                    list.release_segment(id).unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_codec, benchmark_growth, benchmark_directory);
criterion_main!(benches);
