//! E2E Test Suite 03: Version migration
//!
//! Writes files at the older data-format versions and reads them back with
//! the library configured (as always) for the current version, exercising
//! the full promotion chain and the demote-on-write pass.

use gwframe::{
    FrAdcData, FrEvent, FrVect, FrameH, GpsTime, IFrameStream, OFrameStream, StreamPrefs,
};
use gwframe::objects::event::EventParam;
use std::path::Path;
use tempfile::TempDir;

fn tree_with_adc_and_event() -> FrameH {
    let samples: Vec<i32> = (0..32).map(|i| i * 3 - 40).collect();
    let vect = FrVect::from_i32_samples("L1:MIGRATE", &samples, 1.0 / 32.0);
    let mut frame = FrameH::new("L-MIGRATE", 7, 0, GpsTime::new(900_000_000, 0), 1.0);
    frame.push_adc(FrAdcData::new("L1:MIGRATE", 32.0, vect));
    let mut event = FrEvent::new("burst-search", 900_000_000, 4.2e-21);
    event.params.push(EventParam {
        name: "snr".into(),
        value: 9.5,
    });
    frame.events.push(event);
    frame
}

fn write_at_version(path: &Path, version: u8) {
    let mut prefs = StreamPrefs::default();
    prefs.output_version = version;
    let mut out = OFrameStream::create(path, &prefs).unwrap();
    out.write_frame(&tree_with_adc_and_event()).unwrap();
    out.close().unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: A version-3 file reads back at the current version
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn version3_file_promotes_to_current() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v3.gwf");
    write_at_version(&path, gwframe::FRAME_SPEC_MIN);

    let mut input = IFrameStream::open(&path, &StreamPrefs::default()).unwrap();
    assert_eq!(input.version(), 3);

    let adc = input.read_adc(0, "L1:MIGRATE").unwrap();
    assert_eq!(adc.sample_rate, 32.0);
    let data = adc.data.expect("reference must resolve across promotion");
    assert_eq!(
        data.as_i32().unwrap(),
        (0..32).map(|i| i * 3 - 40).collect::<Vec<i32>>()
    );

    let event = input.read_event(0, "burst-search").unwrap();
    assert_eq!(event.amplitude, 4.2e-21);
    assert_eq!(event.params.len(), 1);
    assert_eq!(event.params[0].name, "snr");
    // Fields version 3 cannot express come back as their promotion
    // defaults.
    assert_eq!(event.time_before, 0.0);
    assert_eq!(event.time_after, 0.0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: Promotion fills the leap-second count a version-3 header lacks
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn promotion_fills_leap_seconds() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v3.gwf");
    write_at_version(&path, 3);

    let mut input = IFrameStream::open(&path, &StreamPrefs::default()).unwrap();
    let frame = input
        .read_frame_h(0, gwframe::objects::frameh::mask::NONE)
        .unwrap();
    assert_eq!(
        frame.uleap_s,
        gwframe::gpstime::leap_seconds_at(900_000_000)
    );
    assert_ne!(frame.uleap_s, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: Every supported version round-trips the same channel
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn all_versions_roundtrip_channel_payload() {
    let dir = TempDir::new().unwrap();
    for version in gwframe::FRAME_SPEC_VERSIONS {
        let path = dir.path().join(format!("v{}.gwf", version));
        write_at_version(&path, version);

        let mut input = IFrameStream::open(&path, &StreamPrefs::default()).unwrap();
        assert_eq!(input.version(), version);
        let adc = input.read_adc(0, "L1:MIGRATE").unwrap();
        assert_eq!(
            adc.data.unwrap().as_i32().unwrap(),
            (0..32).map(|i| i * 3 - 40).collect::<Vec<i32>>(),
            "payload mismatch at version {}",
            version
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: Older files carry no structure checksums, current ones do
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn structure_checksums_only_at_current_version() {
    let dir = TempDir::new().unwrap();
    let v7 = dir.path().join("v7.gwf");
    let v8 = dir.path().join("v8.gwf");
    write_at_version(&v7, 7);
    write_at_version(&v8, 8);

    // Same tree; the version-8 file is strictly larger because every
    // structure carries a trailing CRC.
    let len7 = std::fs::metadata(&v7).unwrap().len();
    let len8 = std::fs::metadata(&v8).unwrap().len();
    assert!(len8 > len7, "v8 {} must exceed v7 {}", len8, len7);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: Demotion below a vector's element type is refused
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn complex_payload_cannot_demote_below_version6() {
    use gwframe::{Dimension, ElementType, VectCompression};

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v4.gwf");
    let mut prefs = StreamPrefs::default();
    prefs.output_version = 4;
    let mut out = OFrameStream::create(&path, &prefs).unwrap();

    let complex = FrVect {
        name: "V1:COMPLEX".into(),
        compress: VectCompression::Raw,
        elem_type: ElementType::Complex8,
        n_data: 4,
        dims: vec![Dimension::new(4, 1.0)],
        unit_y: String::new(),
        data: vec![0u8; 32],
    };
    let mut frame = FrameH::new("V-DEMOTE", 1, 0, GpsTime::new(1_000_000_000, 0), 1.0);
    frame.push_adc(FrAdcData::new("V1:COMPLEX", 4.0, complex));

    let err = out.write_frame(&frame).unwrap_err();
    assert_eq!(err.error_name(), "ERROR_domain");
}
