//! Rule-based verification of frame objects.
//!
//! The verifier is a visitor: each class contributes a rule function (wired
//! into the version registry) that checks its own fields and recurses into
//! the objects its reference slots own.  Violations accumulate as readable
//! strings; nothing stops at the first failure, so one pass reports
//! everything wrong with a tree.

use std::collections::HashSet;

use crate::error::{FrameError, FrameResult};
use crate::objects::{
    ClassId, FrAdcData, FrDetector, FrEvent, FrProcData, FrSerData, FrStatData, FrTable, FrVect,
    FrObject, FrameH,
};

/// Collects rule violations across a verification walk.
#[derive(Debug, Default)]
pub struct Verifier {
    violations: Vec<String>,
    seen_channels: HashSet<(ClassId, String)>,
    /// (run, frame) of the previous frame header, for monotonicity.
    last_frame: Option<(i32, u32)>,
}

impl Verifier {
    pub fn new() -> Self {
        Verifier::default()
    }

    pub fn violation(&mut self, what: impl Into<String>) {
        self.violations.push(what.into());
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Run the registered rule for `obj` (which recurses into children).
    pub fn verify_object(&mut self, obj: &FrObject) {
        let registry = crate::spec::registry_for(crate::spec::FRAME_SPEC_CURRENT)
            .expect("current version is always registered");
        if let Some(rule) = registry.entry(obj.class_id() as i16).and_then(|e| e.verify) {
            rule(obj, self);
        }
    }

    /// Fold the collected violations into a result.
    pub fn into_result(self) -> FrameResult<()> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(FrameError::domain(format!(
                "verification found {} violation(s): {}",
                self.violations.len(),
                self.violations.join("; ")
            )))
        }
    }

    fn check_unique_channel(&mut self, class: ClassId, name: &str) {
        if !self.seen_channels.insert((class, name.to_string())) {
            self.violation(format!(
                "duplicate {} channel '{}'",
                class.struct_name(),
                name
            ));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-class rules
// ─────────────────────────────────────────────────────────────────────────────

fn vect_rules(vect: &FrVect, v: &mut Verifier) {
    if vect.dims.is_empty() {
        v.violation(format!("vector '{}' has no dimensions", vect.name));
        return;
    }
    let product = vect.dim_product();
    if product != vect.n_data {
        v.violation(format!(
            "vector '{}': dimension product {} disagrees with nData {}",
            vect.name, product, vect.n_data
        ));
    }
    if let Some(size) = vect.elem_type.byte_size() {
        let want = vect.n_data * size as u64;
        if vect.data.len() as u64 != want {
            v.violation(format!(
                "vector '{}': payload holds {} bytes, {} elements of {} bytes need {}",
                vect.name,
                vect.data.len(),
                vect.n_data,
                size,
                want
            ));
        }
    }
    for d in &vect.dims {
        if d.nx > 0 && d.dx < 0.0 {
            v.violation(format!(
                "vector '{}': negative sampling interval {}",
                vect.name, d.dx
            ));
        }
    }
}

pub(crate) fn verify_vect(obj: &FrObject, v: &mut Verifier) {
    let FrObject::Vect(vect) = obj else { return };
    vect_rules(vect, v);
}

fn adc_rules(adc: &FrAdcData, v: &mut Verifier) {
    if adc.name.is_empty() {
        v.violation("ADC channel with empty name");
    }
    v.check_unique_channel(ClassId::AdcData, &adc.name);
    if adc.sample_rate <= 0.0 {
        v.violation(format!(
            "ADC channel '{}': sample rate {} is not positive",
            adc.name, adc.sample_rate
        ));
    }
    if let Some(data) = &adc.data {
        vect_rules(data, v);
    }
    if let Some(aux) = &adc.aux {
        vect_rules(aux, v);
    }
}

pub(crate) fn verify_adc(obj: &FrObject, v: &mut Verifier) {
    let FrObject::AdcData(adc) = obj else { return };
    adc_rules(adc, v);
}

fn proc_rules(proc: &FrProcData, v: &mut Verifier) {
    if proc.name.is_empty() {
        v.violation("proc channel with empty name");
    }
    v.check_unique_channel(ClassId::ProcData, &proc.name);
    if proc.t_range < 0.0 {
        v.violation(format!(
            "proc channel '{}': negative time range {}",
            proc.name, proc.t_range
        ));
    }
    if let Some(data) = &proc.data {
        vect_rules(data, v);
    }
}

pub(crate) fn verify_proc(obj: &FrObject, v: &mut Verifier) {
    let FrObject::ProcData(proc) = obj else { return };
    proc_rules(proc, v);
}

fn ser_rules(ser: &FrSerData, v: &mut Verifier) {
    if ser.name.is_empty() {
        v.violation("serial record with empty name");
    }
    if ser.sample_rate < 0.0 {
        v.violation(format!(
            "serial record '{}': negative sample rate",
            ser.name
        ));
    }
    if let Some(serial) = &ser.serial {
        vect_rules(serial, v);
    }
}

pub(crate) fn verify_ser(obj: &FrObject, v: &mut Verifier) {
    let FrObject::SerData(ser) = obj else { return };
    ser_rules(ser, v);
}

fn event_rules(event: &FrEvent, v: &mut Verifier) {
    if event.name.is_empty() {
        v.violation("event with empty type name");
    }
    if !event.amplitude.is_finite() {
        v.violation(format!("event '{}': non-finite amplitude", event.name));
    }
    if event.time_before < 0.0 || event.time_after < 0.0 {
        v.violation(format!("event '{}': negative time window", event.name));
    }
    if let Some(data) = &event.data {
        vect_rules(data, v);
    }
}

pub(crate) fn verify_event(obj: &FrObject, v: &mut Verifier) {
    let FrObject::Event(event) = obj else { return };
    event_rules(event, v);
}

fn detector_rules(det: &FrDetector, v: &mut Verifier) {
    if det.name.is_empty() {
        v.violation("detector with empty name");
    }
    if !det.prefix.iter().all(|b| b.is_ascii_graphic()) {
        v.violation(format!(
            "detector '{}': prefix bytes {:?} are not printable",
            det.name, det.prefix
        ));
    }
    for s in &det.stat_data {
        stat_rules(s, v);
    }
    for t in &det.tables {
        table_rules(t, v);
    }
}

pub(crate) fn verify_detector(obj: &FrObject, v: &mut Verifier) {
    let FrObject::Detector(det) = obj else { return };
    detector_rules(det, v);
}

fn stat_rules(stat: &FrStatData, v: &mut Verifier) {
    if stat.name.is_empty() {
        v.violation("static data with empty name");
    }
    if stat.time_end != 0 && stat.time_end < stat.time_start {
        v.violation(format!(
            "static data '{}': validity range [{}, {}] is inverted",
            stat.name, stat.time_start, stat.time_end
        ));
    }
    if let Some(data) = &stat.data {
        vect_rules(data, v);
    }
}

pub(crate) fn verify_stat_data(obj: &FrObject, v: &mut Verifier) {
    let FrObject::StatData(stat) = obj else { return };
    stat_rules(stat, v);
}

fn table_rules(table: &FrTable, v: &mut Verifier) {
    if table.n_column as usize != table.columns.len() {
        v.violation(format!(
            "table '{}': declares {} columns, holds {}",
            table.name,
            table.n_column,
            table.columns.len()
        ));
    }
    for c in &table.columns {
        if c.n_data != table.n_row as u64 {
            v.violation(format!(
                "table '{}': column '{}' has {} rows, table declares {}",
                table.name, c.name, c.n_data, table.n_row
            ));
        }
        vect_rules(c, v);
    }
}

pub(crate) fn verify_table(obj: &FrObject, v: &mut Verifier) {
    let FrObject::Table(table) = obj else { return };
    table_rules(table, v);
}

fn frame_h_rules(h: &FrameH, v: &mut Verifier) {
    if h.name.is_empty() {
        v.violation("frame header with empty name");
    }
    if h.dt <= 0.0 {
        v.violation(format!(
            "frame {}: duration {} is not positive",
            h.frame, h.dt
        ));
    }
    // Frame numbers strictly increase within a run; a new run resets them.
    if let Some((run, frame)) = v.last_frame {
        if h.run == run && h.frame <= frame {
            v.violation(format!(
                "frame numbering not monotone: frame {} follows frame {} in run {}",
                h.frame, frame, run
            ));
        }
    }
    v.last_frame = Some((h.run, h.frame));

    if let Some(raw) = &h.raw_data {
        for adc in &raw.adc {
            adc_rules(adc, v);
        }
        for ser in &raw.ser {
            ser_rules(ser, v);
        }
    }
    for p in &h.proc_data {
        proc_rules(p, v);
    }
    for e in &h.events {
        event_rules(e, v);
    }
    for d in [&h.detect_sim, &h.detect_proc].into_iter().flatten() {
        detector_rules(d, v);
    }
}

pub(crate) fn verify_frame_h(obj: &FrObject, v: &mut Verifier) {
    let FrObject::FrameH(h) = obj else { return };
    frame_h_rules(h, v);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpstime::GpsTime;
    use crate::objects::{Dimension, ElementType, VectCompression};

    fn vect_with(n_data: u64, nx: u64, payload: usize) -> FrVect {
        FrVect {
            name: "v".into(),
            compress: VectCompression::Raw,
            elem_type: ElementType::Int16,
            n_data,
            dims: vec![Dimension::new(nx, 1.0)],
            unit_y: String::new(),
            data: vec![0u8; payload],
        }
    }

    #[test]
    fn consistent_vector_passes() {
        let mut v = Verifier::new();
        vect_rules(&vect_with(4, 4, 8), &mut v);
        assert!(v.is_clean(), "{:?}", v.violations());
    }

    #[test]
    fn dimension_mismatch_is_flagged() {
        let mut v = Verifier::new();
        vect_rules(&vect_with(4, 3, 8), &mut v);
        assert!(!v.is_clean());
    }

    #[test]
    fn payload_size_mismatch_is_flagged() {
        let mut v = Verifier::new();
        vect_rules(&vect_with(4, 4, 6), &mut v);
        assert!(!v.is_clean());
    }

    #[test]
    fn duplicate_channels_are_flagged() {
        let mut v = Verifier::new();
        let adc = FrAdcData::new("H1:X", 1.0, vect_with(4, 4, 8));
        adc_rules(&adc, &mut v);
        adc_rules(&adc, &mut v);
        assert_eq!(
            v.violations()
                .iter()
                .filter(|m| m.contains("duplicate"))
                .count(),
            1
        );
    }

    #[test]
    fn frame_numbering_must_increase_within_a_run() {
        let mut v = Verifier::new();
        let mut h1 = FrameH::new("f", 1, 5, GpsTime::new(100, 0), 1.0);
        let h2 = FrameH::new("f", 1, 5, GpsTime::new(101, 0), 1.0);
        frame_h_rules(&h1, &mut v);
        frame_h_rules(&h2, &mut v);
        assert!(!v.is_clean());

        // A new run resets the numbering.
        let mut v = Verifier::new();
        h1.run = 1;
        let mut h3 = FrameH::new("f", 2, 0, GpsTime::new(102, 0), 1.0);
        h3.run = 2;
        frame_h_rules(&h1, &mut v);
        frame_h_rules(&h3, &mut v);
        assert!(v.is_clean(), "{:?}", v.violations());
    }

    #[test]
    fn into_result_reports_counts() {
        let mut v = Verifier::new();
        v.violation("first");
        v.violation("second");
        let err = v.into_result().unwrap_err();
        assert!(err.to_string().contains("2 violation(s)"));
    }

    #[test]
    fn inverted_stat_range_is_flagged() {
        let mut v = Verifier::new();
        stat_rules(&FrStatData::new("cal", 200, 100, 1), &mut v);
        assert!(!v.is_clean());
        let mut v = Verifier::new();
        stat_rules(&FrStatData::new("cal", 200, 0, 1), &mut v);
        assert!(v.is_clean());
    }
}
