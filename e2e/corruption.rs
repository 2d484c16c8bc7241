//! E2E Test Suite 04: Corruption handling
//!
//! Bit-flips and hand-patched reference ids: structure checksums must
//! localize the damage to the structure that carries it, whole-file
//! verification must catch any flip, and a reference whose target id does
//! not exist must surface as a dangling-reference error naming the ids.

use gwframe::{
    ChecksumPolicy, FrAdcData, FrVect, FrameH, GpsTime, IFrameStream, OFrameStream, StreamPrefs,
};
use std::path::Path;
use tempfile::TempDir;

const GOOD_SAMPLES: [i32; 8] = [
    0x0600_0001, 0x0600_0002, 0x0600_0003, 0x0600_0004, 0x0600_0005, 0x0600_0006, 0x0600_0007,
    0x0600_0008,
];
const BAD_SAMPLES: [i32; 8] = [
    0x0BAD_0001, 0x0BAD_0002, 0x0BAD_0003, 0x0BAD_0004, 0x0BAD_0005, 0x0BAD_0006, 0x0BAD_0007,
    0x0BAD_0008,
];

fn write_two_channel_file(path: &Path) {
    let prefs = StreamPrefs::default();
    let mut out = OFrameStream::create(path, &prefs).unwrap();
    let mut frame = FrameH::new("CORRUPT-TEST", 1, 0, GpsTime::new(1_000_000_000, 0), 1.0);
    frame.push_adc(FrAdcData::new(
        "H1:GOOD",
        8.0,
        FrVect::from_i32_samples("H1:GOOD", &GOOD_SAMPLES, 0.125),
    ));
    frame.push_adc(FrAdcData::new(
        "H1:BAD",
        8.0,
        FrVect::from_i32_samples("H1:BAD", &BAD_SAMPLES, 0.125),
    ));
    out.write_frame(&frame).unwrap();
    out.close().unwrap();
}

/// Byte offset of `samples`' raw image inside the file.  Payloads are
/// stored uncompressed in the writer's (host) byte order, so the native
/// byte pattern of the samples appears verbatim.
fn find_payload(bytes: &[u8], samples: &[i32]) -> usize {
    let needle: Vec<u8> = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
    bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("payload image must appear in the file")
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: A flipped payload byte fails only the channel that owns it
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn checksum_failure_is_localized_to_one_channel() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.gwf");
    write_two_channel_file(&path);

    let mut bytes = std::fs::read(&path).unwrap();
    let at = find_payload(&bytes, &BAD_SAMPLES) + 9;
    bytes[at] ^= 0x40;
    std::fs::write(&path, &bytes).unwrap();

    let mut input = IFrameStream::open(&path, &StreamPrefs::default()).unwrap();

    let good = input.read_adc(0, "H1:GOOD").unwrap();
    assert_eq!(good.data.unwrap().as_i32().unwrap(), GOOD_SAMPLES.to_vec());

    let err = input.read_adc(0, "H1:BAD").unwrap_err();
    assert_eq!(err.error_name(), "ERROR_checksum");

    // The failure taints that structure only; the stream keeps serving
    // other channels.
    let again = input.read_adc(0, "H1:GOOD").unwrap();
    assert_eq!(again.data.unwrap().as_i32().unwrap(), GOOD_SAMPLES.to_vec());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: The checksum policy can downgrade mismatches to warnings
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn warn_policy_reads_through_corruption() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.gwf");
    write_two_channel_file(&path);

    let mut bytes = std::fs::read(&path).unwrap();
    let at = find_payload(&bytes, &BAD_SAMPLES) + 2;
    bytes[at] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();

    let mut prefs = StreamPrefs::default();
    prefs.checksum_policy = ChecksumPolicy::Warn;
    let mut input = IFrameStream::open(&path, &prefs).unwrap();
    let adc = input.read_adc(0, "H1:BAD").unwrap();
    assert!(input.warnings() > 0);
    assert_ne!(adc.data.unwrap().as_i32().unwrap(), BAD_SAMPLES.to_vec());
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: Whole-file verification catches a payload flip
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn verify_detects_any_payload_flip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.gwf");
    write_two_channel_file(&path);

    let mut bytes = std::fs::read(&path).unwrap();
    let at = find_payload(&bytes, &GOOD_SAMPLES) + 17;
    bytes[at] ^= 0x80;
    std::fs::write(&path, &bytes).unwrap();

    let mut input = IFrameStream::open(&path, &StreamPrefs::default()).unwrap();
    let err = input.verify().unwrap_err();
    assert_eq!(err.error_name(), "ERROR_checksum");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: A reference to a nonexistent instance is reported with its ids
// ─────────────────────────────────────────────────────────────────────────────

/// Walks the structure sequence of a version-7 file (no structure CRCs to
/// re-patch) and rewrites the sample-vector reference of the first ADC
/// structure to a target id nothing in the file carries.
#[test]
fn dangling_reference_reports_class_and_instance() {
    const BOGUS_INSTANCE: u32 = 0x00BE_EF01;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dangling.gwf");
    {
        let mut prefs = StreamPrefs::default();
        prefs.output_version = 7;
        let mut out = OFrameStream::create(&path, &prefs).unwrap();
        let mut frame = FrameH::new("DANGLE", 1, 0, GpsTime::new(1_000_000_000, 0), 1.0);
        frame.push_adc(FrAdcData::new(
            "H1:DANGLE",
            8.0,
            FrVect::from_i32_samples("H1:DANGLE", &GOOD_SAMPLES, 0.125),
        ));
        out.write_frame(&frame).unwrap();
        out.close().unwrap();
    }

    let mut bytes = std::fs::read(&path).unwrap();

    // Skip the file header: fixed prefix, then the length-prefixed
    // originator string.
    let mut offset = gwframe::stream::header::fixed_prefix_len();
    let name_len = u16::from_ne_bytes([bytes[offset], bytes[offset + 1]]) as usize;
    offset += 2 + name_len + 1;

    // Walk structures until the first FrAdcData (class 4).
    let adc_class = 4i16;
    loop {
        let length =
            u64::from_ne_bytes(bytes[offset..offset + 8].try_into().unwrap()) as usize;
        let class = i16::from_ne_bytes(bytes[offset + 8..offset + 10].try_into().unwrap());
        if class == adc_class {
            // The body ends with three reference slots (data, aux, next),
            // six bytes each; the data reference's instance id is the last
            // four bytes of the first slot.
            let data_ref_instance = offset + length - 16;
            bytes[data_ref_instance..data_ref_instance + 4]
                .copy_from_slice(&BOGUS_INSTANCE.to_ne_bytes());
            break;
        }
        offset += length;
    }
    std::fs::write(&path, &bytes).unwrap();

    let mut input = IFrameStream::open(&path, &StreamPrefs::default()).unwrap();
    match input.read_adc(0, "H1:DANGLE").unwrap_err() {
        gwframe::FrameError::DanglingReference {
            class, instance, ..
        } => {
            assert_eq!(class, 20, "the dangling target is a vector reference");
            assert_eq!(instance, BOGUS_INSTANCE);
        }
        other => panic!("expected a dangling reference, got {}", other),
    }
}
