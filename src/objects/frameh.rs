//! FrameH — the top-of-frame container.

use crate::error::{FrameError, FrameResult};
use crate::gpstime::{leap_seconds_at, GpsTime};
use crate::objects::{
    FrDetector, FrEvent, FrHistory, FrObject, FrProcData, FrRawData, FrSimData, FrSimEvent,
    FrSummary, FrTable, FrVect,
};
use crate::stream::codec::{PendingSlot, SlotRefs, StructReader, StructWriter, SLOT_NEXT};

/// Reference slot numbers of a frame header.
pub mod slot {
    pub const TYPE: u8 = 0;
    pub const USER: u8 = 1;
    pub const DETECT_SIM: u8 = 2;
    pub const DETECT_PROC: u8 = 3;
    pub const HISTORY: u8 = 4;
    pub const RAW_DATA: u8 = 5;
    pub const PROC_DATA: u8 = 6;
    pub const SIM_DATA: u8 = 7;
    pub const EVENT: u8 = 8;
    pub const SIM_EVENT: u8 = 9;
    pub const SUMMARY: u8 = 10;
    pub const AUX_DATA: u8 = 11;
    pub const AUX_TABLE: u8 = 12;
}

/// Element mask for subset reads of a frame header.
///
/// A set bit means the corresponding optional sub-reference is chased and
/// attached; a clear bit means its resolver entry is discarded and the
/// field stays empty.  Channel payloads (ADC, proc, ser, sim, events,
/// summaries) are indexed by the table of contents and are never pulled in
/// by a header read, whatever the mask.
pub mod mask {
    pub const TYPE: u32 = 1 << 0;
    pub const USER: u32 = 1 << 1;
    pub const DETECT_SIM: u32 = 1 << 2;
    pub const DETECT_PROC: u32 = 1 << 3;
    pub const HISTORY: u32 = 1 << 4;
    pub const RAW_DATA: u32 = 1 << 5;
    pub const AUX_DATA: u32 = 1 << 6;
    pub const AUX_TABLE: u32 = 1 << 7;
    pub const ALL: u32 = 0xFF;
    pub const NONE: u32 = 0;

    /// Whether `mask` selects the frame-header slot `slot`.  Slots without
    /// a mask bit (the channel containers) are never selected.
    pub fn selects(mask: u32, slot: u8) -> bool {
        use super::slot;
        let bit = match slot {
            slot::TYPE => TYPE,
            slot::USER => USER,
            slot::DETECT_SIM => DETECT_SIM,
            slot::DETECT_PROC => DETECT_PROC,
            slot::HISTORY => HISTORY,
            slot::RAW_DATA => RAW_DATA,
            slot::AUX_DATA => AUX_DATA,
            slot::AUX_TABLE => AUX_TABLE,
            _ => return false,
        };
        mask & bit != 0
    }
}

/// The frame header: identity, timing, and the references that root one
/// frame's object tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameH {
    pub name: String,
    pub run: i32,
    pub frame: u32,
    pub data_quality: u32,
    pub gtime: GpsTime,
    pub uleap_s: u16,
    pub dt: f64,
    pub type_: Option<Box<FrVect>>,
    pub user: Option<Box<FrVect>>,
    pub detect_sim: Option<Box<FrDetector>>,
    pub detect_proc: Option<Box<FrDetector>>,
    pub history: Vec<FrHistory>,
    pub raw_data: Option<Box<FrRawData>>,
    pub proc_data: Vec<FrProcData>,
    pub sim_data: Vec<FrSimData>,
    pub events: Vec<FrEvent>,
    pub sim_events: Vec<FrSimEvent>,
    pub summaries: Vec<FrSummary>,
    pub aux_data: Option<Box<FrVect>>,
    pub aux_table: Option<Box<FrTable>>,
}

impl FrameH {
    /// A frame with the given identity and timing and no payloads.
    pub fn new(name: &str, run: i32, frame: u32, gtime: GpsTime, dt: f64) -> Self {
        FrameH {
            name: name.to_string(),
            run,
            frame,
            gtime,
            uleap_s: leap_seconds_at(gtime.seconds),
            dt,
            ..FrameH::default()
        }
    }

    /// Append an ADC channel, creating the raw-data bundle on first use.
    pub fn push_adc(&mut self, adc: crate::objects::FrAdcData) {
        self.raw_data
            .get_or_insert_with(|| Box::new(FrRawData::new("rawdata")))
            .adc
            .push(adc);
    }

    /// Append a serial record, creating the raw-data bundle on first use.
    pub fn push_ser(&mut self, ser: crate::objects::FrSerData) {
        self.raw_data
            .get_or_insert_with(|| Box::new(FrRawData::new("rawdata")))
            .ser
            .push(ser);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn decode(
    r: &mut StructReader,
    version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let name = r.read_string()?;
    let run = r.read_i32()?;
    let frame = r.read_u32()?;
    let data_quality = if version >= 4 { r.read_u32()? } else { 0 };
    let gtime_s = r.read_u32()?;
    let gtime_n = r.read_u32()?;
    let uleap_s = if version >= 4 { r.read_u16()? } else { 0 };
    let dt = r.read_f64()?;
    let mut pending = Vec::new();
    for s in [
        slot::TYPE,
        slot::USER,
        slot::DETECT_SIM,
        slot::DETECT_PROC,
        slot::HISTORY,
        slot::RAW_DATA,
        slot::PROC_DATA,
        slot::SIM_DATA,
        slot::EVENT,
        slot::SIM_EVENT,
        slot::SUMMARY,
        slot::AUX_DATA,
        slot::AUX_TABLE,
        SLOT_NEXT,
    ] {
        r.read_ref_into(s, &mut pending)?;
    }
    Ok((
        FrObject::FrameH(FrameH {
            name,
            run,
            frame,
            data_quality,
            gtime: GpsTime::new(gtime_s, gtime_n),
            uleap_s,
            dt,
            ..FrameH::default()
        }),
        pending,
    ))
}

pub(crate) fn encode(
    obj: &FrObject,
    w: &mut StructWriter,
    version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::FrameH(h) = obj else {
        unreachable!()
    };
    w.write_string(&h.name)?;
    w.write_i32(h.run);
    w.write_u32(h.frame);
    if version >= 4 {
        w.write_u32(h.data_quality);
    }
    w.write_u32(h.gtime.seconds);
    w.write_u32(h.gtime.nanoseconds);
    if version >= 4 {
        w.write_u16(h.uleap_s);
    }
    w.write_f64(h.dt);
    for s in [
        slot::TYPE,
        slot::USER,
        slot::DETECT_SIM,
        slot::DETECT_PROC,
        slot::HISTORY,
        slot::RAW_DATA,
        slot::PROC_DATA,
        slot::SIM_DATA,
        slot::EVENT,
        slot::SIM_EVENT,
        slot::SUMMARY,
        slot::AUX_DATA,
        slot::AUX_TABLE,
        SLOT_NEXT,
    ] {
        w.write_ref(refs.get(s));
    }
    Ok(())
}

pub(crate) fn attach(h: &mut FrameH, s: u8, child: FrObject) -> FrameResult<()> {
    match s {
        slot::TYPE => h.type_ = Some(Box::new(child.expect_vect()?)),
        slot::USER => h.user = Some(Box::new(child.expect_vect()?)),
        slot::DETECT_SIM => h.detect_sim = Some(Box::new(child.expect_detector()?)),
        slot::DETECT_PROC => h.detect_proc = Some(Box::new(child.expect_detector()?)),
        slot::HISTORY => h.history.push(child.expect_history()?),
        slot::RAW_DATA => h.raw_data = Some(Box::new(child.expect_raw_data()?)),
        slot::PROC_DATA => h.proc_data.push(child.expect_proc()?),
        slot::SIM_DATA => h.sim_data.push(child.expect_sim()?),
        slot::EVENT => h.events.push(child.expect_event()?),
        slot::SIM_EVENT => h.sim_events.push(child.expect_sim_event()?),
        slot::SUMMARY => h.summaries.push(child.expect_summary()?),
        slot::AUX_DATA => h.aux_data = Some(Box::new(child.expect_vect()?)),
        slot::AUX_TABLE => h.aux_table = Some(Box::new(child.expect_table()?)),
        _ => return Err(FrameError::format(0, format!("FrameH has no slot {}", s))),
    }
    Ok(())
}

/// Promotion into version 4: the leap-second count first appears there, so
/// fill it from the compiled-in table when the source version had none.
pub(crate) fn promote_step(obj: FrObject, target: u8) -> FrameResult<FrObject> {
    let FrObject::FrameH(mut h) = obj else {
        unreachable!()
    };
    if target == 4 && h.uleap_s == 0 {
        h.uleap_s = leap_seconds_at(h.gtime.seconds);
    }
    Ok(FrObject::FrameH(h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::codec::ByteOrder;

    fn sample_header() -> FrameH {
        FrameH {
            data_quality: 0b1011,
            ..FrameH::new("LHO", 42, 3, GpsTime::new(1_000_000_000, 0), 1.0)
        }
    }

    #[test]
    fn roundtrip_version8() {
        let h = sample_header();
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        encode(&FrObject::FrameH(h.clone()), &mut w, 8, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let (obj, pending) = decode(&mut r, 8).unwrap();
        assert_eq!(r.remaining(), 0);
        assert!(pending.is_empty());
        assert_eq!(obj.expect_frame_h().unwrap(), h);
    }

    #[test]
    fn version3_drops_quality_and_leap_fields() {
        let h = sample_header();
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        encode(&FrObject::FrameH(h.clone()), &mut w, 3, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let (obj, _) = decode(&mut r, 3).unwrap();
        assert_eq!(r.remaining(), 0);
        let back = obj.expect_frame_h().unwrap();
        assert_eq!(back.data_quality, 0);
        assert_eq!(back.uleap_s, 0);
        assert_eq!(back.gtime, h.gtime);
    }

    #[test]
    fn promote_into_version4_fills_leap_count() {
        let mut h = sample_header();
        h.uleap_s = 0;
        let promoted = promote_step(FrObject::FrameH(h), 4).unwrap();
        let back = promoted.expect_frame_h().unwrap();
        assert_eq!(back.uleap_s, leap_seconds_at(1_000_000_000));
        assert_ne!(back.uleap_s, 0);
    }

    #[test]
    fn mask_selects_only_optional_slots() {
        assert!(mask::selects(mask::ALL, slot::HISTORY));
        assert!(mask::selects(mask::RAW_DATA, slot::RAW_DATA));
        assert!(!mask::selects(mask::NONE, slot::RAW_DATA));
        // Channel containers are never selected, even by ALL.
        assert!(!mask::selects(mask::ALL, slot::PROC_DATA));
        assert!(!mask::selects(mask::ALL, slot::EVENT));
    }

    #[test]
    fn push_adc_creates_raw_data_bundle() {
        let mut h = sample_header();
        assert!(h.raw_data.is_none());
        h.push_adc(crate::objects::FrAdcData::new(
            "H1:TEST",
            16.0,
            FrVect::from_i32_samples("H1:TEST", &[1, 2], 1.0 / 16.0),
        ));
        assert_eq!(h.raw_data.as_ref().unwrap().adc.len(), 1);
    }
}
