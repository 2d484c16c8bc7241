//! E2E Test Suite 01: Minimal file
//!
//! Writes the smallest interesting frame file — one frame, one ADC channel
//! — and reads it back, checking the header fields, the channel identity,
//! and element-wise payload equality.

use gwframe::{
    FrAdcData, FrVect, FrameH, GpsTime, IFrameStream, OFrameStream, StreamPrefs,
};
use tempfile::TempDir;

fn minimal_frame() -> FrameH {
    let samples: Vec<i32> = (0..16).collect();
    let vect = FrVect::from_i32_samples("H1:TEST", &samples, 1.0 / 16.0);
    let mut frame = FrameH::new("H-TEST", 1, 0, GpsTime::new(1_000_000_000, 0), 1.0);
    frame.push_adc(FrAdcData::new("H1:TEST", 16.0, vect));
    frame
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: Write one frame, reopen, check the frame header
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn frame_header_survives_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("minimal.gwf");
    let prefs = StreamPrefs::default();

    let mut out = OFrameStream::create(&path, &prefs).unwrap();
    out.write_frame(&minimal_frame()).unwrap();
    out.close().unwrap();

    let mut input = IFrameStream::open(&path, &prefs).unwrap();
    assert_eq!(input.n_frames(), 1);
    assert_eq!(input.version(), gwframe::FRAME_SPEC_CURRENT);

    let frame = input
        .read_frame_h(0, gwframe::objects::frameh::mask::NONE)
        .unwrap();
    assert_eq!(frame.name, "H-TEST");
    assert_eq!(frame.run, 1);
    assert_eq!(frame.frame, 0);
    assert_eq!(frame.gtime, GpsTime::new(1_000_000_000, 0));
    assert_eq!(frame.dt, 1.0);
    // Unselected sub-references stay empty on a masked read.
    assert!(frame.raw_data.is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: The ADC channel comes back with its samples intact
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn adc_payload_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("minimal.gwf");
    let prefs = StreamPrefs::default();

    let mut out = OFrameStream::create(&path, &prefs).unwrap();
    out.write_frame(&minimal_frame()).unwrap();
    out.close().unwrap();

    let mut input = IFrameStream::open(&path, &prefs).unwrap();
    let adc = input.read_adc(0, "H1:TEST").unwrap();
    assert_eq!(adc.name, "H1:TEST");
    assert_eq!(adc.sample_rate, 16.0);
    let data = adc.data.expect("channel must carry its sample vector");
    assert_eq!(data.n_data, 16);
    assert_eq!(data.as_i32().unwrap(), (0..16).collect::<Vec<i32>>());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: Whole-file checksum verification passes on an untouched file
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn untouched_file_verifies_cleanly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("minimal.gwf");
    let prefs = StreamPrefs::default();

    let mut out = OFrameStream::create(&path, &prefs).unwrap();
    out.write_frame(&minimal_frame()).unwrap();
    out.close().unwrap();

    let mut input = IFrameStream::open(&path, &prefs).unwrap();
    input.verify().expect("pristine file must verify");
    assert_eq!(input.warnings(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: Originating-library identity is recorded in the header
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn library_identity_recorded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("minimal.gwf");
    let prefs = StreamPrefs::default();

    let mut out = OFrameStream::create(&path, &prefs).unwrap();
    out.write_frame(&minimal_frame()).unwrap();
    out.close().unwrap();

    let input = IFrameStream::open(&path, &prefs).unwrap();
    assert_eq!(input.frame_library_name(), gwframe::library_name());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: Memory-mapped input reads the same bytes as buffered input
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn mmap_and_buffered_reads_agree() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("minimal.gwf");
    let prefs = StreamPrefs::default();

    let mut out = OFrameStream::create(&path, &prefs).unwrap();
    out.write_frame(&minimal_frame()).unwrap();
    out.close().unwrap();

    let mut buffered = IFrameStream::open(&path, &prefs).unwrap();
    let mut mapped_prefs = StreamPrefs::default();
    mapped_prefs.memory_mapped_io = true;
    let mut mapped = IFrameStream::open(&path, &mapped_prefs).unwrap();

    let a = buffered.read_adc(0, "H1:TEST").unwrap();
    let b = mapped.read_adc(0, "H1:TEST").unwrap();
    assert_eq!(a, b);
}
