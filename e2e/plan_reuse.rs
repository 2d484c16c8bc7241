//! E2E Test Suite 02: Plan reuse
//!
//! Two files with the same channel list, frame count, and run number but
//! different payloads.  A plan extracted from the first must let the second
//! open without re-parsing its table of contents, and reads through the
//! reused plan must return the second file's payloads.

use gwframe::toc::toc_parse_count;
use gwframe::{FrAdcData, FrVect, FrameH, GpsTime, IFrameStream, OFrameStream, StreamPrefs};
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

// The TOC-parse counter is process-wide; hold this across each test so
// concurrent tests cannot perturb the deltas being asserted.
static COUNTER_LOCK: Mutex<()> = Mutex::new(());

const CHANNELS: [&str; 3] = ["X", "Y", "Z"];
const N_FRAMES: u32 = 8;
const RUN: i32 = 42;

/// Writes a file whose sample values are `base + frame * 100 + channel`.
fn write_file(path: &Path, base: i32) {
    let prefs = StreamPrefs::default();
    let mut out = OFrameStream::create(path, &prefs).unwrap();
    for f in 0..N_FRAMES {
        let mut frame = FrameH::new(
            "PLAN-TEST",
            RUN,
            f,
            GpsTime::new(1_000_000_000 + f, 0),
            1.0,
        );
        for (c, name) in CHANNELS.iter().enumerate() {
            let samples: Vec<i32> = (0..4).map(|i| base + f as i32 * 100 + c as i32 + i).collect();
            let vect = FrVect::from_i32_samples(name, &samples, 0.25);
            frame.push_adc(FrAdcData::new(name, 4.0, vect));
        }
        out.write_frame(&frame).unwrap();
    }
    out.close().unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: A compatible seed plan skips the TOC parse
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn compatible_plan_skips_toc_parse() {
    let _guard = COUNTER_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.gwf");
    let b = dir.path().join("b.gwf");
    write_file(&a, 0);
    write_file(&b, 50_000);
    let prefs = StreamPrefs::default();

    let stream_a = IFrameStream::open(&a, &prefs).unwrap();
    let plan = stream_a.extract_plan().unwrap();
    assert_eq!(plan.n_frames(), N_FRAMES as usize);
    assert_eq!(plan.runs(), vec![RUN; N_FRAMES as usize]);

    let parses_before = toc_parse_count();
    let mut stream_b = IFrameStream::open_with_plan(&b, &prefs, &plan).unwrap();
    assert_eq!(
        toc_parse_count(),
        parses_before,
        "a compatible seed must skip the TOC parse"
    );

    // Reads through the reused plan return B's payload, not A's.
    let adc = stream_b.read_adc(3, "Y").unwrap();
    let data = adc.data.unwrap().as_i32().unwrap();
    assert_eq!(data, vec![50_301, 50_302, 50_303, 50_304]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: Plan-seeded reads equal plain reads across every channel
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn seeded_reads_match_unseeded_reads() {
    let _guard = COUNTER_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.gwf");
    let b = dir.path().join("b.gwf");
    write_file(&a, 0);
    write_file(&b, 7_000);
    let prefs = StreamPrefs::default();

    let plan = IFrameStream::open(&a, &prefs)
        .unwrap()
        .extract_plan()
        .unwrap();
    let mut seeded = IFrameStream::open_with_plan(&b, &prefs, &plan).unwrap();
    let mut plain = IFrameStream::open(&b, &prefs).unwrap();

    for f in 0..N_FRAMES as usize {
        for name in CHANNELS {
            let x = seeded.read_adc(f, name).unwrap();
            let y = plain.read_adc(f, name).unwrap();
            assert_eq!(x, y, "channel {} frame {}", name, f);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: An incompatible seed falls back to a fresh TOC parse
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn incompatible_plan_falls_back() {
    let _guard = COUNTER_LOCK.lock().unwrap();
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.gwf");
    let c = dir.path().join("c.gwf");
    write_file(&a, 0);

    // A file with a different run number: the seed must be rejected.
    {
        let prefs = StreamPrefs::default();
        let mut out = OFrameStream::create(&c, &prefs).unwrap();
        for f in 0..N_FRAMES {
            let mut frame = FrameH::new(
                "PLAN-TEST",
                RUN + 1,
                f,
                GpsTime::new(1_000_000_000 + f, 0),
                1.0,
            );
            let vect = FrVect::from_i32_samples("X", &[1, 2, 3, 4], 0.25);
            frame.push_adc(FrAdcData::new("X", 4.0, vect));
            out.write_frame(&frame).unwrap();
        }
        out.close().unwrap();
    }

    let prefs = StreamPrefs::default();
    let plan = IFrameStream::open(&a, &prefs)
        .unwrap()
        .extract_plan()
        .unwrap();
    let parses_before = toc_parse_count();
    let mut stream_c = IFrameStream::open_with_plan(&c, &prefs, &plan).unwrap();
    assert_eq!(
        toc_parse_count(),
        parses_before + 1,
        "an incompatible seed must force a TOC parse"
    );
    let adc = stream_c.read_adc(0, "X").unwrap();
    assert_eq!(adc.data.unwrap().as_i32().unwrap(), vec![1, 2, 3, 4]);
}
