//! The frame-object data model.
//!
//! Every on-disk structure decodes to one variant of [`FrObject`], a tagged
//! union whose discriminant is the class-id enumeration.  Reference slots
//! are owned fields on the concrete structs (`Option<Box<_>>` for single
//! references, `Vec<_>` for chained containers); the stream fills them in
//! during its resolution pass, so by the time a caller sees an object the
//! tree below it is fully owned and plain `==` compares it transitively.

pub mod channel;
pub mod eof;
pub mod event;
pub mod frameh;
pub mod meta;
pub mod schema;
pub mod vect;

pub use channel::{FrAdcData, FrProcData, FrSerData, FrSimData};
pub use eof::{FrEndOfFile, FrEndOfFrame};
pub use event::{EventParam, FrEvent, FrSimEvent};
pub use frameh::FrameH;
pub use meta::{FrDetector, FrHistory, FrMsg, FrRawData, FrStatData, FrSummary, FrTable};
pub use schema::{FrSe, FrSh};
pub use vect::{Dimension, ElementType, FrVect, VectCompression};

use crate::error::{FrameError, FrameResult};
use crate::toc::FrToc;

// ─────────────────────────────────────────────────────────────────────────────
// Class identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// On-disk class identifiers.  Stable across every supported data-format
/// version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i16)]
pub enum ClassId {
    Sh = 1,
    Se = 2,
    FrameH = 3,
    AdcData = 4,
    Detector = 5,
    EndOfFile = 6,
    EndOfFrame = 7,
    Event = 8,
    History = 9,
    Msg = 10,
    ProcData = 11,
    RawData = 12,
    SerData = 13,
    SimData = 14,
    SimEvent = 15,
    StatData = 16,
    Summary = 17,
    Table = 18,
    Toc = 19,
    Vect = 20,
}

impl ClassId {
    pub fn from_i16(v: i16) -> Option<ClassId> {
        use ClassId::*;
        Some(match v {
            1 => Sh,
            2 => Se,
            3 => FrameH,
            4 => AdcData,
            5 => Detector,
            6 => EndOfFile,
            7 => EndOfFrame,
            8 => Event,
            9 => History,
            10 => Msg,
            11 => ProcData,
            12 => RawData,
            13 => SerData,
            14 => SimData,
            15 => SimEvent,
            16 => StatData,
            17 => Summary,
            18 => Table,
            19 => Toc,
            20 => Vect,
            _ => return None,
        })
    }

    /// Structure name as it appears in FrSH records.
    pub fn struct_name(&self) -> &'static str {
        use ClassId::*;
        match self {
            Sh => "FrSH",
            Se => "FrSE",
            FrameH => "FrameH",
            AdcData => "FrAdcData",
            Detector => "FrDetector",
            EndOfFile => "FrEndOfFile",
            EndOfFrame => "FrEndOfFrame",
            Event => "FrEvent",
            History => "FrHistory",
            Msg => "FrMsg",
            ProcData => "FrProcData",
            RawData => "FrRawData",
            SerData => "FrSerData",
            SimData => "FrSimData",
            SimEvent => "FrSimEvent",
            StatData => "FrStatData",
            Summary => "FrSummary",
            Table => "FrTable",
            Toc => "FrTOC",
            Vect => "FrVect",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// The tagged variant
// ─────────────────────────────────────────────────────────────────────────────

/// Any frame object.
#[derive(Debug, Clone, PartialEq)]
pub enum FrObject {
    Sh(FrSh),
    Se(FrSe),
    FrameH(FrameH),
    AdcData(FrAdcData),
    Detector(FrDetector),
    EndOfFile(FrEndOfFile),
    EndOfFrame(FrEndOfFrame),
    Event(FrEvent),
    History(FrHistory),
    Msg(FrMsg),
    ProcData(FrProcData),
    RawData(FrRawData),
    SerData(FrSerData),
    SimData(FrSimData),
    SimEvent(FrSimEvent),
    StatData(FrStatData),
    Summary(FrSummary),
    Table(FrTable),
    Toc(FrToc),
    Vect(FrVect),
}

impl FrObject {
    pub fn class_id(&self) -> ClassId {
        match self {
            FrObject::Sh(_) => ClassId::Sh,
            FrObject::Se(_) => ClassId::Se,
            FrObject::FrameH(_) => ClassId::FrameH,
            FrObject::AdcData(_) => ClassId::AdcData,
            FrObject::Detector(_) => ClassId::Detector,
            FrObject::EndOfFile(_) => ClassId::EndOfFile,
            FrObject::EndOfFrame(_) => ClassId::EndOfFrame,
            FrObject::Event(_) => ClassId::Event,
            FrObject::History(_) => ClassId::History,
            FrObject::Msg(_) => ClassId::Msg,
            FrObject::ProcData(_) => ClassId::ProcData,
            FrObject::RawData(_) => ClassId::RawData,
            FrObject::SerData(_) => ClassId::SerData,
            FrObject::SimData(_) => ClassId::SimData,
            FrObject::SimEvent(_) => ClassId::SimEvent,
            FrObject::StatData(_) => ClassId::StatData,
            FrObject::Summary(_) => ClassId::Summary,
            FrObject::Table(_) => ClassId::Table,
            FrObject::Toc(_) => ClassId::Toc,
            FrObject::Vect(_) => ClassId::Vect,
        }
    }

    /// Channel/record name, for classes that carry one.
    pub fn name(&self) -> Option<&str> {
        match self {
            FrObject::Sh(o) => Some(&o.name),
            FrObject::Se(o) => Some(&o.name),
            FrObject::FrameH(o) => Some(&o.name),
            FrObject::AdcData(o) => Some(&o.name),
            FrObject::Detector(o) => Some(&o.name),
            FrObject::Event(o) => Some(&o.name),
            FrObject::History(o) => Some(&o.name),
            FrObject::ProcData(o) => Some(&o.name),
            FrObject::RawData(o) => Some(&o.name),
            FrObject::SerData(o) => Some(&o.name),
            FrObject::SimData(o) => Some(&o.name),
            FrObject::SimEvent(o) => Some(&o.name),
            FrObject::StatData(o) => Some(&o.name),
            FrObject::Summary(o) => Some(&o.name),
            FrObject::Table(o) => Some(&o.name),
            FrObject::Vect(o) => Some(&o.name),
            FrObject::EndOfFile(_)
            | FrObject::EndOfFrame(_)
            | FrObject::Msg(_)
            | FrObject::Toc(_) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Downcasts
// ─────────────────────────────────────────────────────────────────────────────

fn wrong_class(expected: ClassId, got: ClassId) -> FrameError {
    FrameError::Schema {
        version: 0,
        class: got as i16,
        offset: 0,
        what: format!(
            "expected a {} reference target, found {}",
            expected.struct_name(),
            got.struct_name()
        ),
    }
}

macro_rules! downcast {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(self) -> FrameResult<$ty> {
            match self {
                FrObject::$variant(o) => Ok(o),
                other => Err(wrong_class(ClassId::$variant, other.class_id())),
            }
        }
    };
}

impl FrObject {
    downcast!(expect_vect, Vect, FrVect);
    downcast!(expect_adc, AdcData, FrAdcData);
    downcast!(expect_proc, ProcData, FrProcData);
    downcast!(expect_ser, SerData, FrSerData);
    downcast!(expect_sim, SimData, FrSimData);
    downcast!(expect_event, Event, FrEvent);
    downcast!(expect_sim_event, SimEvent, FrSimEvent);
    downcast!(expect_detector, Detector, FrDetector);
    downcast!(expect_raw_data, RawData, FrRawData);
    downcast!(expect_history, History, FrHistory);
    downcast!(expect_msg, Msg, FrMsg);
    downcast!(expect_stat_data, StatData, FrStatData);
    downcast!(expect_summary, Summary, FrSummary);
    downcast!(expect_table, Table, FrTable);
    downcast!(expect_frame_h, FrameH, FrameH);
    downcast!(expect_end_of_file, EndOfFile, FrEndOfFile);
}

// ─────────────────────────────────────────────────────────────────────────────
// Reference attachment
// ─────────────────────────────────────────────────────────────────────────────

/// Fill reference slot `slot` of `holder` with a resolved child.
///
/// For single-reference slots this sets the owned box; for chained
/// containers the resolver calls it once per chain element in file order
/// and each call appends.  A child of the wrong class for the slot is a
/// schema violation.
pub fn attach_child(holder: &mut FrObject, slot: u8, child: FrObject) -> FrameResult<()> {
    match holder {
        FrObject::FrameH(h) => frameh::attach(h, slot, child),
        FrObject::AdcData(a) => channel::attach_adc(a, slot, child),
        FrObject::ProcData(p) => channel::attach_proc(p, slot, child),
        FrObject::SerData(s) => channel::attach_ser(s, slot, child),
        FrObject::SimData(s) => channel::attach_sim(s, slot, child),
        FrObject::Event(e) => event::attach_event(e, slot, child),
        FrObject::SimEvent(e) => event::attach_sim_event(e, slot, child),
        FrObject::RawData(r) => meta::attach_raw_data(r, slot, child),
        FrObject::Detector(d) => meta::attach_detector(d, slot, child),
        FrObject::StatData(s) => meta::attach_stat_data(s, slot, child),
        FrObject::Summary(s) => meta::attach_summary(s, slot, child),
        FrObject::Table(t) => meta::attach_table(t, slot, child),
        other => Err(FrameError::format(
            0,
            format!(
                "{} carries no reference slot {}",
                other.class_id().struct_name(),
                slot
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_ids_match_disk_values() {
        assert_eq!(ClassId::Sh as i16, 1);
        assert_eq!(ClassId::Se as i16, 2);
        assert_eq!(ClassId::FrameH as i16, 3);
        assert_eq!(ClassId::Vect as i16, 20);
        for v in 1..=20i16 {
            let c = ClassId::from_i16(v).unwrap();
            assert_eq!(c as i16, v);
        }
        assert!(ClassId::from_i16(0).is_none());
        assert!(ClassId::from_i16(21).is_none());
    }

    #[test]
    fn downcast_reports_both_classes() {
        let obj = FrObject::History(FrHistory {
            name: "h".into(),
            time: 0,
            comment: String::new(),
        });
        let err = obj.expect_vect().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("FrVect"));
        assert!(msg.contains("FrHistory"));
    }
}
