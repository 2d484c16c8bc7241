//! E2E Test Suite 05: Cross-endian files
//!
//! The writer emits the host's natural byte order unless overridden; the
//! reader detects either orientation from the header probes.  Forcing the
//! writer to each order in turn and reading both files back exercises the
//! full foreign-order decode path, including payload byte swapping.

use gwframe::stream::codec::ByteOrder;
use gwframe::{
    FrAdcData, FrProcData, FrVect, FrameH, GpsTime, IFrameStream, OFrameStream, StreamPrefs,
    VectCompression,
};
use std::path::Path;
use tempfile::TempDir;

fn sample_frame() -> FrameH {
    let adc_samples: Vec<i32> = (0..64).map(|i| i * i - 1000).collect();
    let proc_samples: Vec<f64> = (0..64).map(|i| (i as f64 * 0.1).sin()).collect();
    let mut frame = FrameH::new("ENDIAN-TEST", 3, 0, GpsTime::new(1_187_008_882, 500), 1.0);
    frame.push_adc(FrAdcData::new(
        "H1:RAW",
        64.0,
        FrVect::from_i32_samples("H1:RAW", &adc_samples, 1.0 / 64.0),
    ));
    frame.proc_data.push(FrProcData::new(
        "H1:DERIVED",
        1.0,
        FrVect::from_f64_samples("H1:DERIVED", &proc_samples, 1.0 / 64.0)
            .with_compression(VectCompression::Zlib),
    ));
    frame
}

fn write_with_order(path: &Path, order: ByteOrder) {
    let mut prefs = StreamPrefs::default();
    prefs.output_order = Some(order);
    let mut out = OFrameStream::create(path, &prefs).unwrap();
    out.write_frame(&sample_frame()).unwrap();
    out.close().unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: Both byte orders read back the identical object tree
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn both_orders_decode_identically() {
    let dir = TempDir::new().unwrap();
    let le = dir.path().join("le.gwf");
    let be = dir.path().join("be.gwf");
    write_with_order(&le, ByteOrder::LittleEndian);
    write_with_order(&be, ByteOrder::BigEndian);

    let prefs = StreamPrefs::default();
    let mut le_in = IFrameStream::open(&le, &prefs).unwrap();
    let mut be_in = IFrameStream::open(&be, &prefs).unwrap();
    assert_eq!(le_in.endianness(), ByteOrder::LittleEndian);
    assert_eq!(be_in.endianness(), ByteOrder::BigEndian);

    let le_adc = le_in.read_adc(0, "H1:RAW").unwrap();
    let be_adc = be_in.read_adc(0, "H1:RAW").unwrap();
    assert_eq!(le_adc, be_adc);

    let le_proc = le_in.read_proc(0, "H1:DERIVED").unwrap();
    let be_proc = be_in.read_proc(0, "H1:DERIVED").unwrap();
    assert_eq!(le_proc, be_proc);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: The two files genuinely differ on disk
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn orders_produce_different_bytes() {
    let dir = TempDir::new().unwrap();
    let le = dir.path().join("le.gwf");
    let be = dir.path().join("be.gwf");
    write_with_order(&le, ByteOrder::LittleEndian);
    write_with_order(&be, ByteOrder::BigEndian);

    let le_bytes = std::fs::read(&le).unwrap();
    let be_bytes = std::fs::read(&be).unwrap();
    assert_eq!(le_bytes.len(), be_bytes.len());
    assert_ne!(le_bytes, be_bytes);
    // The 2-byte order probe right after the magic distinguishes them.
    assert_eq!(&le_bytes[5..7], &[0x34, 0x12]);
    assert_eq!(&be_bytes[5..7], &[0x12, 0x34]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: A foreign-order file decodes to equal the source object tree
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn foreign_order_equals_source_tree() {
    let dir = TempDir::new().unwrap();
    let foreign = match ByteOrder::host() {
        ByteOrder::LittleEndian => ByteOrder::BigEndian,
        ByteOrder::BigEndian => ByteOrder::LittleEndian,
    };
    let path = dir.path().join("foreign.gwf");
    write_with_order(&path, foreign);

    let source = sample_frame();
    let mut input = IFrameStream::open(&path, &StreamPrefs::default()).unwrap();
    let adc = input.read_adc(0, "H1:RAW").unwrap();
    assert_eq!(&adc, &source.raw_data.as_ref().unwrap().adc[0]);
    let proc = input.read_proc(0, "H1:DERIVED").unwrap();
    assert_eq!(&proc, &source.proc_data[0]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: Checksums hold across byte orders
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn foreign_order_file_verifies() {
    let dir = TempDir::new().unwrap();
    for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
        let path = dir.path().join("check.gwf");
        write_with_order(&path, order);
        let mut input = IFrameStream::open(&path, &StreamPrefs::default()).unwrap();
        input.verify().expect("cross-endian file must verify");
    }
}
