//! The frame-specification registry: which data-format versions exist,
//! which classes each version knows, and how an object migrates between
//! adjacent versions.
//!
//! Every version owns a dispatch table mapping class-id to codec entry
//! points.  [`initialize`] populates all tables deterministically; nothing
//! here registers itself from static constructors.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{FrameError, FrameResult};
use crate::objects::{self, ClassId, FrObject};
use crate::stream::codec::{PendingSlot, SlotRefs, StructReader, StructWriter};
use crate::verify::Verifier;

// ─────────────────────────────────────────────────────────────────────────────
// Version constants
// ─────────────────────────────────────────────────────────────────────────────

/// Earliest supported data-format version.
pub const FRAME_SPEC_MIN: u8 = 3;
/// Version used for in-memory objects and, by default, for output streams.
pub const FRAME_SPEC_CURRENT: u8 = 8;
/// Latest supported data-format version.
pub const FRAME_SPEC_MAX: u8 = 8;

/// Every supported version, ascending.  Version 5 was never deployed.
pub const FRAME_SPEC_VERSIONS: [u8; 5] = [3, 4, 6, 7, 8];

pub fn is_supported(version: u8) -> bool {
    FRAME_SPEC_VERSIONS.contains(&version)
}

/// The version after `version` in the supported chain.
pub fn next_version(version: u8) -> Option<u8> {
    let i = FRAME_SPEC_VERSIONS.iter().position(|&v| v == version)?;
    FRAME_SPEC_VERSIONS.get(i + 1).copied()
}

/// The version before `version` in the supported chain.
pub fn prev_version(version: u8) -> Option<u8> {
    let i = FRAME_SPEC_VERSIONS.iter().position(|&v| v == version)?;
    i.checked_sub(1).map(|j| FRAME_SPEC_VERSIONS[j])
}

/// Whether structures carry a trailing CRC at this version.
pub fn has_struct_checksum(version: u8) -> bool {
    version >= 8
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch table
// ─────────────────────────────────────────────────────────────────────────────

pub type DecodeFn = fn(&mut StructReader, u8) -> FrameResult<(FrObject, Vec<PendingSlot>)>;
pub type EncodeFn = fn(&FrObject, &mut StructWriter, u8, &SlotRefs) -> FrameResult<()>;
/// One adjacent-version migration step applied to a single node; the tree
/// walk in [`promote`]/[`demote`] handles recursion into references.
pub type StepFn = fn(FrObject, u8) -> FrameResult<FrObject>;
pub type VerifyFn = fn(&FrObject, &mut Verifier);

/// Codec entry points for one class at one version.
pub struct ClassEntry {
    pub class: ClassId,
    pub decode: DecodeFn,
    pub encode: EncodeFn,
    pub promote_from_previous: Option<StepFn>,
    pub demote_to_previous: Option<StepFn>,
    pub verify: Option<VerifyFn>,
}

/// The dispatch table of one data-format version.
pub struct VersionRegistry {
    pub version: u8,
    entries: HashMap<i16, ClassEntry>,
}

impl VersionRegistry {
    pub fn entry(&self, class: i16) -> Option<&ClassEntry> {
        self.entries.get(&class)
    }

    pub fn classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.entries.values().map(|e| e.class)
    }
}

fn build_registry(version: u8) -> VersionRegistry {
    use crate::toc;
    use objects::{channel, eof, event, frameh, meta, schema, vect};

    let mut entries: HashMap<i16, ClassEntry> = HashMap::new();
    let mut add = |class: ClassId,
                   decode: DecodeFn,
                   encode: EncodeFn,
                   promote: Option<StepFn>,
                   demote: Option<StepFn>,
                   verify: Option<VerifyFn>| {
        entries.insert(
            class as i16,
            ClassEntry {
                class,
                decode,
                encode,
                promote_from_previous: promote,
                demote_to_previous: demote,
                verify,
            },
        );
    };

    add(ClassId::Sh, schema::decode_sh, schema::encode_sh, None, None, None);
    add(ClassId::Se, schema::decode_se, schema::encode_se, None, None, None);
    add(
        ClassId::FrameH,
        frameh::decode,
        frameh::encode,
        Some(frameh::promote_step),
        None,
        Some(crate::verify::verify_frame_h),
    );
    add(
        ClassId::AdcData,
        channel::decode_adc,
        channel::encode_adc,
        None,
        None,
        Some(crate::verify::verify_adc),
    );
    add(
        ClassId::Detector,
        meta::decode_detector,
        meta::encode_detector,
        None,
        None,
        Some(crate::verify::verify_detector),
    );
    add(
        ClassId::EndOfFile,
        eof::decode_end_of_file,
        eof::encode_end_of_file,
        None,
        None,
        None,
    );
    add(
        ClassId::EndOfFrame,
        eof::decode_end_of_frame,
        eof::encode_end_of_frame,
        None,
        None,
        None,
    );
    add(
        ClassId::Event,
        event::decode_event,
        event::encode_event,
        None,
        None,
        Some(crate::verify::verify_event),
    );
    add(
        ClassId::History,
        meta::decode_history,
        meta::encode_history,
        None,
        None,
        None,
    );
    add(ClassId::Msg, meta::decode_msg, meta::encode_msg, None, None, None);
    add(
        ClassId::ProcData,
        channel::decode_proc,
        channel::encode_proc,
        None,
        None,
        Some(crate::verify::verify_proc),
    );
    add(
        ClassId::RawData,
        meta::decode_raw_data,
        meta::encode_raw_data,
        None,
        None,
        None,
    );
    add(
        ClassId::SerData,
        channel::decode_ser,
        channel::encode_ser,
        None,
        None,
        Some(crate::verify::verify_ser),
    );
    add(
        ClassId::SimData,
        channel::decode_sim,
        channel::encode_sim,
        None,
        None,
        None,
    );
    add(
        ClassId::SimEvent,
        event::decode_sim_event,
        event::encode_sim_event,
        None,
        None,
        None,
    );
    add(
        ClassId::StatData,
        meta::decode_stat_data,
        meta::encode_stat_data,
        None,
        None,
        Some(crate::verify::verify_stat_data),
    );
    add(
        ClassId::Summary,
        meta::decode_summary,
        meta::encode_summary,
        None,
        None,
        None,
    );
    add(
        ClassId::Table,
        meta::decode_table,
        meta::encode_table,
        None,
        None,
        Some(crate::verify::verify_table),
    );
    add(ClassId::Toc, toc::decode, toc::encode, None, None, None);
    add(
        ClassId::Vect,
        vect::decode,
        vect::encode,
        None,
        Some(vect::demote_step),
        Some(crate::verify::verify_vect),
    );

    VersionRegistry { version, entries }
}

fn registries() -> &'static HashMap<u8, VersionRegistry> {
    static REGISTRIES: OnceLock<HashMap<u8, VersionRegistry>> = OnceLock::new();
    REGISTRIES.get_or_init(|| {
        FRAME_SPEC_VERSIONS
            .iter()
            .map(|&v| (v, build_registry(v)))
            .collect()
    })
}

/// The dispatch table for `version`, if supported.
pub fn registry_for(version: u8) -> Option<&'static VersionRegistry> {
    registries().get(&version)
}

/// Populate every process-wide table: the per-version registries, the
/// schema description cache, and the detector-prefix table.  Idempotent;
/// call once before opening any file.
pub fn initialize() {
    let _ = registries();
    objects::schema::populate();
    crate::detectors::populate();
}

// ─────────────────────────────────────────────────────────────────────────────
// Promotion and demotion
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

fn check_supported(version: u8) -> FrameResult<()> {
    if is_supported(version) {
        Ok(())
    } else {
        Err(FrameError::Unimplemented {
            version,
            what: "data-format version",
        })
    }
}

/// Promote `obj` from version `from` up to version `to`, stepping through
/// every intermediate version.  `from >= to` returns the object unchanged
/// (promotion never decreases the version).
pub fn promote(obj: FrObject, from: u8, to: u8) -> FrameResult<FrObject> {
    check_supported(from)?;
    check_supported(to)?;
    if from >= to {
        return Ok(obj);
    }
    let mut version = from;
    let mut obj = obj;
    while version < to {
        let next = next_version(version).expect("supported chain is contiguous");
        obj = step_tree(obj, next, Direction::Up)?;
        version = next;
    }
    Ok(obj)
}

/// Demote `obj` from version `from` down to version `to`.  `from <= to`
/// returns the object unchanged.
pub fn demote(obj: FrObject, from: u8, to: u8) -> FrameResult<FrObject> {
    check_supported(from)?;
    check_supported(to)?;
    if from <= to {
        return Ok(obj);
    }
    let mut version = from;
    let mut obj = obj;
    while version > to {
        let prev = prev_version(version).expect("supported chain is contiguous");
        obj = step_tree(obj, prev, Direction::Down)?;
        version = prev;
    }
    Ok(obj)
}

/// Apply one adjacent-version step to a node and, recursively, to every
/// object its reference slots own.
fn step_tree(obj: FrObject, target: u8, dir: Direction) -> FrameResult<FrObject> {
    let registry = registry_for(target).expect("step target is validated");
    let class = obj.class_id() as i16;
    let obj = match registry.entry(class).and_then(|e| match dir {
        Direction::Up => e.promote_from_previous,
        Direction::Down => e.demote_to_previous,
    }) {
        Some(step) => step(obj, target)?,
        None => obj,
    };
    map_children(obj, target, dir)
}

macro_rules! migrate_helpers {
    ($box_fn:ident, $vec_fn:ident, $variant:ident, $ty:ty, $expect:ident) => {
        fn $box_fn(
            child: Option<Box<$ty>>,
            target: u8,
            dir: Direction,
        ) -> FrameResult<Option<Box<$ty>>> {
            match child {
                Some(c) => Ok(Some(Box::new(
                    step_tree(FrObject::$variant(*c), target, dir)?.$expect()?,
                ))),
                None => Ok(None),
            }
        }

        fn $vec_fn(children: Vec<$ty>, target: u8, dir: Direction) -> FrameResult<Vec<$ty>> {
            children
                .into_iter()
                .map(|c| step_tree(FrObject::$variant(c), target, dir)?.$expect())
                .collect()
        }
    };
}

migrate_helpers!(vect_box, vect_vec, Vect, objects::FrVect, expect_vect);
migrate_helpers!(detector_box, _detector_vec, Detector, objects::FrDetector, expect_detector);
migrate_helpers!(table_box, table_vec, Table, objects::FrTable, expect_table);
migrate_helpers!(raw_box, _raw_vec, RawData, objects::FrRawData, expect_raw_data);
migrate_helpers!(_adc_box, adc_vec, AdcData, objects::FrAdcData, expect_adc);
migrate_helpers!(_proc_box, proc_vec, ProcData, objects::FrProcData, expect_proc);
migrate_helpers!(_ser_box, ser_vec, SerData, objects::FrSerData, expect_ser);
migrate_helpers!(_sim_box, sim_vec, SimData, objects::FrSimData, expect_sim);
migrate_helpers!(_event_box, event_vec, Event, objects::FrEvent, expect_event);
migrate_helpers!(_sev_box, sim_event_vec, SimEvent, objects::FrSimEvent, expect_sim_event);
migrate_helpers!(_stat_box, stat_vec, StatData, objects::FrStatData, expect_stat_data);
migrate_helpers!(_sum_box, summary_vec, Summary, objects::FrSummary, expect_summary);

fn map_children(obj: FrObject, target: u8, dir: Direction) -> FrameResult<FrObject> {
    Ok(match obj {
        FrObject::FrameH(mut h) => {
            h.type_ = vect_box(h.type_, target, dir)?;
            h.user = vect_box(h.user, target, dir)?;
            h.detect_sim = detector_box(h.detect_sim, target, dir)?;
            h.detect_proc = detector_box(h.detect_proc, target, dir)?;
            h.raw_data = raw_box(h.raw_data, target, dir)?;
            h.proc_data = proc_vec(h.proc_data, target, dir)?;
            h.sim_data = sim_vec(h.sim_data, target, dir)?;
            h.events = event_vec(h.events, target, dir)?;
            h.sim_events = sim_event_vec(h.sim_events, target, dir)?;
            h.summaries = summary_vec(h.summaries, target, dir)?;
            h.aux_data = vect_box(h.aux_data, target, dir)?;
            h.aux_table = table_box(h.aux_table, target, dir)?;
            FrObject::FrameH(h)
        }
        FrObject::AdcData(mut a) => {
            a.data = vect_box(a.data, target, dir)?;
            a.aux = vect_box(a.aux, target, dir)?;
            FrObject::AdcData(a)
        }
        FrObject::ProcData(mut p) => {
            p.data = vect_box(p.data, target, dir)?;
            p.aux = vect_box(p.aux, target, dir)?;
            FrObject::ProcData(p)
        }
        FrObject::SerData(mut s) => {
            s.serial = vect_box(s.serial, target, dir)?;
            FrObject::SerData(s)
        }
        FrObject::SimData(mut s) => {
            s.data = vect_box(s.data, target, dir)?;
            s.input = vect_box(s.input, target, dir)?;
            FrObject::SimData(s)
        }
        FrObject::Event(mut e) => {
            e.data = vect_box(e.data, target, dir)?;
            FrObject::Event(e)
        }
        FrObject::SimEvent(mut e) => {
            e.data = vect_box(e.data, target, dir)?;
            FrObject::SimEvent(e)
        }
        FrObject::RawData(mut r) => {
            r.ser = ser_vec(r.ser, target, dir)?;
            r.adc = adc_vec(r.adc, target, dir)?;
            r.more = vect_vec(r.more, target, dir)?;
            FrObject::RawData(r)
        }
        FrObject::Detector(mut d) => {
            d.aux = vect_vec(d.aux, target, dir)?;
            d.tables = table_vec(d.tables, target, dir)?;
            d.stat_data = stat_vec(d.stat_data, target, dir)?;
            FrObject::Detector(d)
        }
        FrObject::StatData(mut s) => {
            s.data = vect_box(s.data, target, dir)?;
            s.table = table_box(s.table, target, dir)?;
            FrObject::StatData(s)
        }
        FrObject::Summary(mut s) => {
            s.moments = vect_vec(s.moments, target, dir)?;
            s.tables = table_vec(s.tables, target, dir)?;
            FrObject::Summary(s)
        }
        FrObject::Table(mut t) => {
            t.columns = vect_vec(t.columns, target, dir)?;
            FrObject::Table(t)
        }
        leaf => leaf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpstime::GpsTime;
    use crate::objects::{Dimension, ElementType, FrAdcData, FrVect, FrameH, VectCompression};

    fn frame_with_complex_aux() -> FrameH {
        let mut h = FrameH::new("test", 1, 0, GpsTime::new(1_000_000_000, 0), 1.0);
        h.push_adc(FrAdcData::new(
            "H1:C",
            16.0,
            FrVect {
                name: "H1:C".into(),
                compress: VectCompression::Raw,
                elem_type: ElementType::Complex8,
                n_data: 2,
                dims: vec![Dimension::new(2, 1.0)],
                unit_y: String::new(),
                data: vec![0u8; 16],
            },
        ));
        h
    }

    #[test]
    fn every_version_has_a_registry_with_all_classes() {
        initialize();
        for v in FRAME_SPEC_VERSIONS {
            let reg = registry_for(v).unwrap();
            assert_eq!(reg.version, v);
            for class in 1..=20i16 {
                assert!(
                    reg.entry(class).is_some(),
                    "version {} is missing class {}",
                    v,
                    class
                );
            }
        }
        assert!(registry_for(5).is_none());
    }

    #[test]
    fn promote_is_identity_at_equal_versions() {
        let h = FrameH::new("x", 1, 0, GpsTime::new(100, 0), 1.0);
        let obj = FrObject::FrameH(h.clone());
        let out = promote(obj, 8, 8).unwrap();
        assert_eq!(out.expect_frame_h().unwrap(), h);
    }

    #[test]
    fn promotion_is_idempotent_over_intermediate_stops() {
        // promote(promote(o, mid), max) == promote(o, max)
        let mut h = FrameH::new("x", 1, 0, GpsTime::new(1_000_000_000, 0), 1.0);
        h.uleap_s = 0;
        for mid in [3u8, 4, 6, 7, 8] {
            let direct = promote(FrObject::FrameH(h.clone()), 3, 8).unwrap();
            let stepped = promote(
                promote(FrObject::FrameH(h.clone()), 3, mid).unwrap(),
                mid,
                8,
            )
            .unwrap();
            assert_eq!(direct, stepped, "intermediate stop at {}", mid);
        }
    }

    #[test]
    fn promote_fills_leap_seconds_from_version3() {
        let mut h = FrameH::new("x", 1, 0, GpsTime::new(1_000_000_000, 0), 1.0);
        h.uleap_s = 0;
        let out = promote(FrObject::FrameH(h), 3, 8).unwrap();
        assert_ne!(out.expect_frame_h().unwrap().uleap_s, 0);
    }

    #[test]
    fn demote_then_promote_restores_a_promoted_object() {
        // An object that arrived by promotion from version 3 survives a
        // round trip back down and up unchanged.
        let mut h = FrameH::new("x", 1, 0, GpsTime::new(1_000_000_000, 0), 1.0);
        h.uleap_s = 0;
        let promoted = promote(FrObject::FrameH(h), 3, 8).unwrap();
        let down = demote(promoted.clone(), 8, 3).unwrap();
        let back = promote(down, 3, 8).unwrap();
        assert_eq!(back, promoted);
    }

    #[test]
    fn demote_recurses_to_vector_leaves() {
        // A complex vector hides three references deep; demotion below
        // version 6 must still find and refuse it.
        let h = frame_with_complex_aux();
        let err = demote(FrObject::FrameH(h), 8, 4).unwrap_err();
        assert_eq!(err.error_name(), "ERROR_domain");
    }

    #[test]
    fn demote_to_version6_keeps_complex_data() {
        let h = frame_with_complex_aux();
        assert!(demote(FrObject::FrameH(h), 8, 6).is_ok());
    }

    #[test]
    fn unsupported_versions_are_refused() {
        let h = FrameH::new("x", 1, 0, GpsTime::new(100, 0), 1.0);
        assert!(promote(FrObject::FrameH(h.clone()), 5, 8).is_err());
        assert!(demote(FrObject::FrameH(h), 8, 2).is_err());
    }

    #[test]
    fn struct_checksums_start_at_version8() {
        assert!(!has_struct_checksum(7));
        assert!(has_struct_checksum(8));
    }

    #[test]
    fn version_chain_navigation() {
        assert_eq!(next_version(4), Some(6));
        assert_eq!(prev_version(6), Some(4));
        assert_eq!(next_version(8), None);
        assert_eq!(prev_version(3), None);
    }
}
