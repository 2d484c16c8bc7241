//! Criterion benchmarks for frame-file write and TOC-directed read.
//!
//! Run with:
//!   cargo bench --bench roundtrip

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gwframe::{
    FrAdcData, FrVect, FrameH, GpsTime, IFrameStream, OFrameStream, StreamPrefs,
    VectCompression,
};
use std::path::Path;

fn build_frame(frame: u32, n_samples: usize, compress: VectCompression) -> FrameH {
    let samples: Vec<i32> = (0..n_samples as i32).map(|i| i.wrapping_mul(2654435761u32 as i32)).collect();
    let vect = FrVect::from_i32_samples("H1:BENCH", &samples, 1.0 / n_samples as f64)
        .with_compression(compress);
    let mut h = FrameH::new(
        "BENCH",
        1,
        frame,
        GpsTime::new(1_300_000_000 + frame, 0),
        1.0,
    );
    h.push_adc(FrAdcData::new("H1:BENCH", n_samples as f64, vect));
    h
}

fn write_file(path: &Path, n_samples: usize, compress: VectCompression) {
    let prefs = StreamPrefs::default();
    let mut out = OFrameStream::create(path, &prefs).unwrap();
    for f in 0..4 {
        out.write_frame(&build_frame(f, n_samples, compress)).unwrap();
    }
    out.close().unwrap();
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_write");
    let dir = tempfile::tempdir().unwrap();

    for &n_samples in &[4_096usize, 65_536, 262_144] {
        let bytes = (n_samples * 4 * 4) as u64;
        group.throughput(Throughput::Bytes(bytes));
        group.bench_with_input(
            BenchmarkId::new("raw", n_samples),
            &n_samples,
            |b, &n| {
                let path = dir.path().join("bench-write.gwf");
                b.iter(|| write_file(&path, n, VectCompression::Raw));
            },
        );
    }
    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_read");
    let dir = tempfile::tempdir().unwrap();

    for &n_samples in &[4_096usize, 65_536, 262_144] {
        let path = dir.path().join(format!("bench-read-{}.gwf", n_samples));
        write_file(&path, n_samples, VectCompression::Raw);
        let bytes = (n_samples * 4) as u64;
        group.throughput(Throughput::Bytes(bytes));
        group.bench_with_input(
            BenchmarkId::new("by_name", n_samples),
            &n_samples,
            |b, _| {
                b.iter(|| {
                    let mut input = IFrameStream::open(&path, &StreamPrefs::default()).unwrap();
                    input.read_adc(2, "H1:BENCH").unwrap()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_write, bench_read);
criterion_main!(benches);
