//! E2E Test Suite 06: TOC-driven queries
//!
//! A richer file — several payload kinds across several frames — read back
//! through every query path: by name, by channel index, by event type with
//! flat indexing, masked frame-header subsets, and sequential iteration.

use gwframe::objects::frameh::mask;
use gwframe::{
    ChannelKind, FrAdcData, FrDetector, FrEvent, FrHistory, FrProcData, FrSerData, FrSimData,
    FrSimEvent, FrStatData, FrVect, FrameH, GpsTime, IFrameStream, OFrameStream, StreamPrefs,
};
use std::path::Path;
use tempfile::TempDir;

const N_FRAMES: u32 = 4;

fn write_rich_file(path: &Path) {
    let prefs = StreamPrefs::default();
    let mut out = OFrameStream::create(path, &prefs).unwrap();
    for f in 0..N_FRAMES {
        let gps = 1_200_000_000 + f;
        let mut frame = FrameH::new("RICH", 9, f, GpsTime::new(gps, 0), 1.0);

        let mut detector = FrDetector::new("LIGO Hanford 4km", *b"H1");
        detector.latitude = 46.45;
        let mut stat = FrStatData::new("calibration", 1_200_000_000, 0, 2);
        stat.data = Some(Box::new(FrVect::from_f64_samples(
            "cal-curve",
            &[1.0, 0.99, 0.98],
            1.0,
        )));
        detector.stat_data.push(stat);
        frame.detect_proc = Some(Box::new(detector));

        frame.history.push(FrHistory::new("gwframe", gps, "written by the query suite"));

        let adc_samples: Vec<i16> = (0..8).map(|i| (f as i16 + 1) * 10 + i).collect();
        frame.push_adc(FrAdcData::new(
            "H1:ADC",
            8.0,
            FrVect::from_i16_samples("H1:ADC", &adc_samples, 0.125),
        ));
        frame.push_ser(FrSerData::new(
            "H1:PEM",
            gps,
            1.0,
            &format!("frame {} environment ok", f),
        ));
        frame.proc_data.push(FrProcData::new(
            "H1:PROC",
            1.0,
            FrVect::from_f64_samples("H1:PROC", &[f as f64; 4], 0.25),
        ));
        frame.sim_data.push(FrSimData::new(
            "H1:SIM",
            8.0,
            FrVect::from_f32_samples("H1:SIM", &[f as f32; 8], 0.125),
        ));

        // An event in every other frame, to exercise flat indexing.
        if f % 2 == 0 {
            frame
                .events
                .push(FrEvent::new("glitch", gps, 1.0e-21 * (f + 1) as f64));
        }
        frame
            .sim_events
            .push(FrSimEvent::new("injection", gps, 2.0e-22));

        out.write_frame(&frame).unwrap();
    }
    out.close().unwrap();
}

fn open_rich(dir: &TempDir) -> IFrameStream {
    let path = dir.path().join("rich.gwf");
    write_rich_file(&path);
    IFrameStream::open(&path, &StreamPrefs::default()).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 1: Every payload kind reads back by name, per frame
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn all_payload_kinds_by_name() {
    let dir = TempDir::new().unwrap();
    let mut input = open_rich(&dir);

    for f in 0..N_FRAMES as usize {
        let adc = input.read_adc(f, "H1:ADC").unwrap();
        let expect: Vec<i16> = (0..8).map(|i| (f as i16 + 1) * 10 + i).collect();
        assert_eq!(adc.data.unwrap().as_i16().unwrap(), expect);

        let ser = input.read_ser(f, "H1:PEM").unwrap();
        assert_eq!(ser.data, format!("frame {} environment ok", f));

        let proc = input.read_proc(f, "H1:PROC").unwrap();
        assert_eq!(proc.data.unwrap().as_f64().unwrap(), vec![f as f64; 4]);

        let sim = input.read_sim(f, "H1:SIM").unwrap();
        assert_eq!(sim.data.unwrap().as_f32().unwrap(), vec![f as f32; 8]);

        let sev = input.read_sim_event(f, "injection").unwrap();
        assert_eq!(sev.gtime_s, 1_200_000_000 + f as u32);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 2: TOC consistency — the name at a listed offset matches the query
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn toc_offsets_lead_to_matching_names() {
    let dir = TempDir::new().unwrap();
    let mut input = open_rich(&dir);

    let names: Vec<String> = input
        .toc()
        .unwrap()
        .channel_names(ChannelKind::Adc)
        .to_vec();
    assert_eq!(names, vec!["H1:ADC".to_string()]);
    for f in 0..N_FRAMES as usize {
        let adc = input.read_adc(f, "H1:ADC").unwrap();
        assert_eq!(adc.name, "H1:ADC");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 3: Indexed channel reads, ADC and proc only
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn indexed_reads_cover_adc_and_proc_only() {
    let dir = TempDir::new().unwrap();
    let mut input = open_rich(&dir);

    let by_index = input
        .read_channel_by_index(ChannelKind::Adc, 1, 0)
        .unwrap()
        .expect_adc()
        .unwrap();
    let by_name = input.read_adc(1, "H1:ADC").unwrap();
    assert_eq!(by_index, by_name);

    let err = input
        .read_channel_by_index(ChannelKind::Ser, 0, 0)
        .unwrap_err();
    assert_eq!(err.error_name(), "ERROR_domain");
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 4: Flat event indexing skips frames without the event type
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn event_by_type_uses_flat_indexing() {
    let dir = TempDir::new().unwrap();
    let mut input = open_rich(&dir);

    // Events exist in frames 0 and 2 only.
    let first = input.read_event_by_type("glitch", 0).unwrap();
    assert_eq!(first.gtime_s, 1_200_000_000);
    let second = input.read_event_by_type("glitch", 1).unwrap();
    assert_eq!(second.gtime_s, 1_200_000_002);
    assert!(input.read_event_by_type("glitch", 2).is_err());

    let injection = input.read_sim_event_by_type("injection", 3).unwrap();
    assert_eq!(injection.gtime_s, 1_200_000_003);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 5: Masked frame-header reads chase only the selected references
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn frame_header_masking() {
    let dir = TempDir::new().unwrap();
    let mut input = open_rich(&dir);

    let bare = input.read_frame_h(0, mask::NONE).unwrap();
    assert!(bare.detect_proc.is_none());
    assert!(bare.history.is_empty());
    assert!(bare.raw_data.is_none());

    let with_history = input.read_frame_h(1, mask::HISTORY).unwrap();
    assert_eq!(with_history.history.len(), 1);
    assert_eq!(with_history.history[0].name, "gwframe");
    assert!(with_history.detect_proc.is_none());

    let with_raw = input.read_frame_h(3, mask::RAW_DATA).unwrap();
    let raw = with_raw.raw_data.expect("raw data was selected");
    assert_eq!(raw.adc.len(), 1);
    assert_eq!(raw.adc[0].name, "H1:ADC");
    assert_eq!(raw.ser.len(), 1);

    let with_detector = input.read_frame_h(2, mask::DETECT_PROC).unwrap();
    let det = with_detector.detect_proc.expect("detector was selected");
    assert_eq!(det.prefix_str(), "H1");
    // Static data rides along with its detector, including version
    // selection by validity range.
    let stat = det.stat_data_at("calibration", 1_200_000_500).unwrap();
    assert_eq!(stat.version, 2);
    assert_eq!(
        stat.data.as_ref().unwrap().as_f64().unwrap(),
        vec![1.0, 0.99, 0.98]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 6: Sequential iteration visits every frame once
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn sequential_iteration() {
    let dir = TempDir::new().unwrap();
    let mut input = open_rich(&dir);

    let mut seen = Vec::new();
    while let Some(frame) = input.read_next_frame().unwrap() {
        seen.push(frame.frame);
    }
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Test 7: Detector lookup by name
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn detector_by_name() {
    let dir = TempDir::new().unwrap();
    let mut input = open_rich(&dir);

    let det = input.read_detector("LIGO Hanford 4km").unwrap();
    assert_eq!(det.latitude, 46.45);
    assert!(input.read_detector("nonexistent").is_err());
}
