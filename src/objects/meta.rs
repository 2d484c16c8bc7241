//! Raw-data bundles, detector geometry, static data, history, log messages,
//! summary blocks, and tables.

use crate::error::{FrameError, FrameResult};
use crate::objects::{FrObject, FrVect};
use crate::stream::codec::{PendingSlot, SlotRefs, StructReader, StructWriter, SLOT_NEXT};

// ─────────────────────────────────────────────────────────────────────────────
// FrRawData
// ─────────────────────────────────────────────────────────────────────────────

pub mod raw_slot {
    pub const SER: u8 = 0;
    pub const ADC: u8 = 1;
    pub const MSG: u8 = 2;
    pub const MORE: u8 = 3;
}

/// The raw-data bundle hanging off a frame header: ADC channels, serial
/// records, log messages, and any further vectors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrRawData {
    pub name: String,
    pub ser: Vec<super::FrSerData>,
    pub adc: Vec<super::FrAdcData>,
    pub msgs: Vec<FrMsg>,
    pub more: Vec<FrVect>,
}

impl FrRawData {
    pub fn new(name: &str) -> Self {
        FrRawData {
            name: name.to_string(),
            ..FrRawData::default()
        }
    }

    /// Look up an ADC channel by name.
    pub fn adc_by_name(&self, name: &str) -> Option<&super::FrAdcData> {
        self.adc.iter().find(|a| a.name == name)
    }
}

pub(crate) fn decode_raw_data(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let name = r.read_string()?;
    let mut pending = Vec::new();
    r.read_ref_into(raw_slot::SER, &mut pending)?;
    r.read_ref_into(raw_slot::ADC, &mut pending)?;
    r.read_ref_into(raw_slot::MSG, &mut pending)?;
    r.read_ref_into(raw_slot::MORE, &mut pending)?;
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((
        FrObject::RawData(FrRawData {
            name,
            ..FrRawData::default()
        }),
        pending,
    ))
}

pub(crate) fn encode_raw_data(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::RawData(raw) = obj else {
        unreachable!()
    };
    w.write_string(&raw.name)?;
    w.write_ref(refs.get(raw_slot::SER));
    w.write_ref(refs.get(raw_slot::ADC));
    w.write_ref(refs.get(raw_slot::MSG));
    w.write_ref(refs.get(raw_slot::MORE));
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

pub(crate) fn attach_raw_data(raw: &mut FrRawData, slot: u8, child: FrObject) -> FrameResult<()> {
    match slot {
        raw_slot::SER => raw.ser.push(child.expect_ser()?),
        raw_slot::ADC => raw.adc.push(child.expect_adc()?),
        raw_slot::MSG => raw.msgs.push(child.expect_msg()?),
        raw_slot::MORE => raw.more.push(child.expect_vect()?),
        _ => {
            return Err(FrameError::format(
                0,
                format!("FrRawData has no slot {}", slot),
            ))
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// FrDetector
// ─────────────────────────────────────────────────────────────────────────────

pub mod detector_slot {
    pub const AUX: u8 = 0;
    pub const TABLE: u8 = 1;
    pub const STAT: u8 = 2;
}

/// Detector geometry and the static data attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrDetector {
    pub name: String,
    pub prefix: [u8; 2],
    pub longitude: f64,
    pub latitude: f64,
    pub elevation: f32,
    pub arm_x_azimuth: f32,
    pub arm_y_azimuth: f32,
    pub arm_x_altitude: f32,
    pub arm_y_altitude: f32,
    pub arm_x_midpoint: f32,
    pub arm_y_midpoint: f32,
    pub local_time: i32,
    pub aux: Vec<FrVect>,
    pub tables: Vec<FrTable>,
    pub stat_data: Vec<FrStatData>,
}

impl FrDetector {
    pub fn new(name: &str, prefix: [u8; 2]) -> Self {
        FrDetector {
            name: name.to_string(),
            prefix,
            longitude: 0.0,
            latitude: 0.0,
            elevation: 0.0,
            arm_x_azimuth: 0.0,
            arm_y_azimuth: 0.0,
            arm_x_altitude: 0.0,
            arm_y_altitude: 0.0,
            arm_x_midpoint: 0.0,
            arm_y_midpoint: 0.0,
            local_time: 0,
            aux: Vec::new(),
            tables: Vec::new(),
            stat_data: Vec::new(),
        }
    }

    pub fn prefix_str(&self) -> &str {
        core::str::from_utf8(&self.prefix).unwrap_or("??")
    }

    /// Select the static-data record named `name` whose validity range
    /// covers GPS second `time`, preferring the highest version.  An end
    /// time of zero means "open-ended".
    pub fn stat_data_at(&self, name: &str, time: u32) -> Option<&FrStatData> {
        self.stat_data
            .iter()
            .filter(|s| {
                s.name == name && s.time_start <= time && (s.time_end == 0 || time <= s.time_end)
            })
            .max_by_key(|s| s.version)
    }
}

pub(crate) fn decode_detector(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let name = r.read_string()?;
    let prefix_bytes = r.read_bytes(2)?;
    let prefix = [prefix_bytes[0], prefix_bytes[1]];
    let detector = FrDetector {
        longitude: r.read_f64()?,
        latitude: r.read_f64()?,
        elevation: r.read_f32()?,
        arm_x_azimuth: r.read_f32()?,
        arm_y_azimuth: r.read_f32()?,
        arm_x_altitude: r.read_f32()?,
        arm_y_altitude: r.read_f32()?,
        arm_x_midpoint: r.read_f32()?,
        arm_y_midpoint: r.read_f32()?,
        local_time: r.read_i32()?,
        ..FrDetector::new(&name, prefix)
    };
    let mut pending = Vec::new();
    r.read_ref_into(detector_slot::AUX, &mut pending)?;
    r.read_ref_into(detector_slot::TABLE, &mut pending)?;
    r.read_ref_into(detector_slot::STAT, &mut pending)?;
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((FrObject::Detector(detector), pending))
}

pub(crate) fn encode_detector(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::Detector(d) = obj else {
        unreachable!()
    };
    w.write_string(&d.name)?;
    w.write_bytes(&d.prefix);
    w.write_f64(d.longitude);
    w.write_f64(d.latitude);
    w.write_f32(d.elevation);
    w.write_f32(d.arm_x_azimuth);
    w.write_f32(d.arm_y_azimuth);
    w.write_f32(d.arm_x_altitude);
    w.write_f32(d.arm_y_altitude);
    w.write_f32(d.arm_x_midpoint);
    w.write_f32(d.arm_y_midpoint);
    w.write_i32(d.local_time);
    w.write_ref(refs.get(detector_slot::AUX));
    w.write_ref(refs.get(detector_slot::TABLE));
    w.write_ref(refs.get(detector_slot::STAT));
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

pub(crate) fn attach_detector(d: &mut FrDetector, slot: u8, child: FrObject) -> FrameResult<()> {
    match slot {
        detector_slot::AUX => d.aux.push(child.expect_vect()?),
        detector_slot::TABLE => d.tables.push(child.expect_table()?),
        detector_slot::STAT => d.stat_data.push(child.expect_stat_data()?),
        _ => {
            return Err(FrameError::format(
                0,
                format!("FrDetector has no slot {}", slot),
            ))
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// FrStatData
// ─────────────────────────────────────────────────────────────────────────────

pub mod stat_slot {
    pub const DATA: u8 = 0;
    pub const TABLE: u8 = 1;
}

/// Static (slowly varying) data with a validity range and a version number.
#[derive(Debug, Clone, PartialEq)]
pub struct FrStatData {
    pub name: String,
    pub comment: String,
    pub representation: String,
    pub time_start: u32,
    /// Zero means open-ended.
    pub time_end: u32,
    pub version: u32,
    pub data: Option<Box<FrVect>>,
    pub table: Option<Box<FrTable>>,
}

impl FrStatData {
    pub fn new(name: &str, time_start: u32, time_end: u32, version: u32) -> Self {
        FrStatData {
            name: name.to_string(),
            comment: String::new(),
            representation: String::new(),
            time_start,
            time_end,
            version,
            data: None,
            table: None,
        }
    }
}

pub(crate) fn decode_stat_data(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let stat = FrStatData {
        name: r.read_string()?,
        comment: r.read_string()?,
        representation: r.read_string()?,
        time_start: r.read_u32()?,
        time_end: r.read_u32()?,
        version: r.read_u32()?,
        data: None,
        table: None,
    };
    let mut pending = Vec::new();
    r.read_ref_into(stat_slot::DATA, &mut pending)?;
    r.read_ref_into(stat_slot::TABLE, &mut pending)?;
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((FrObject::StatData(stat), pending))
}

pub(crate) fn encode_stat_data(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::StatData(s) = obj else {
        unreachable!()
    };
    w.write_string(&s.name)?;
    w.write_string(&s.comment)?;
    w.write_string(&s.representation)?;
    w.write_u32(s.time_start);
    w.write_u32(s.time_end);
    w.write_u32(s.version);
    w.write_ref(refs.get(stat_slot::DATA));
    w.write_ref(refs.get(stat_slot::TABLE));
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

pub(crate) fn attach_stat_data(s: &mut FrStatData, slot: u8, child: FrObject) -> FrameResult<()> {
    match slot {
        stat_slot::DATA => s.data = Some(Box::new(child.expect_vect()?)),
        stat_slot::TABLE => s.table = Some(Box::new(child.expect_table()?)),
        _ => {
            return Err(FrameError::format(
                0,
                format!("FrStatData has no slot {}", slot),
            ))
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// FrHistory
// ─────────────────────────────────────────────────────────────────────────────

/// One provenance entry: who touched the data and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrHistory {
    pub name: String,
    pub time: u32,
    pub comment: String,
}

impl FrHistory {
    pub fn new(name: &str, time: u32, comment: &str) -> Self {
        FrHistory {
            name: name.to_string(),
            time,
            comment: comment.to_string(),
        }
    }
}

pub(crate) fn decode_history(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let h = FrHistory {
        name: r.read_string()?,
        time: r.read_u32()?,
        comment: r.read_string()?,
    };
    let mut pending = Vec::new();
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((FrObject::History(h), pending))
}

pub(crate) fn encode_history(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::History(h) = obj else {
        unreachable!()
    };
    w.write_string(&h.name)?;
    w.write_u32(h.time);
    w.write_string(&h.comment)?;
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// FrMsg
// ─────────────────────────────────────────────────────────────────────────────

/// A log message attached to the raw-data bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrMsg {
    pub alarm: String,
    pub message: String,
    pub severity: u32,
    pub gtime_s: u32,
    pub gtime_n: u32,
}

pub(crate) fn decode_msg(
    r: &mut StructReader,
    version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let alarm = r.read_string()?;
    let message = r.read_string()?;
    let severity = r.read_u32()?;
    let (gtime_s, gtime_n) = if version >= 8 {
        (r.read_u32()?, r.read_u32()?)
    } else {
        (0, 0)
    };
    let mut pending = Vec::new();
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((
        FrObject::Msg(FrMsg {
            alarm,
            message,
            severity,
            gtime_s,
            gtime_n,
        }),
        pending,
    ))
}

pub(crate) fn encode_msg(
    obj: &FrObject,
    w: &mut StructWriter,
    version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::Msg(m) = obj else { unreachable!() };
    w.write_string(&m.alarm)?;
    w.write_string(&m.message)?;
    w.write_u32(m.severity);
    if version >= 8 {
        w.write_u32(m.gtime_s);
        w.write_u32(m.gtime_n);
    }
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// FrSummary
// ─────────────────────────────────────────────────────────────────────────────

pub mod summary_slot {
    pub const MOMENTS: u8 = 0;
    pub const TABLE: u8 = 1;
}

/// Statistical summary of a frame: moments plus an optional table.
#[derive(Debug, Clone, PartialEq)]
pub struct FrSummary {
    pub name: String,
    pub comment: String,
    pub test: String,
    pub gtime_s: u32,
    pub gtime_n: u32,
    pub moments: Vec<FrVect>,
    pub tables: Vec<FrTable>,
}

impl FrSummary {
    pub fn new(name: &str, gtime_s: u32) -> Self {
        FrSummary {
            name: name.to_string(),
            comment: String::new(),
            test: String::new(),
            gtime_s,
            gtime_n: 0,
            moments: Vec::new(),
            tables: Vec::new(),
        }
    }
}

pub(crate) fn decode_summary(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let s = FrSummary {
        name: r.read_string()?,
        comment: r.read_string()?,
        test: r.read_string()?,
        gtime_s: r.read_u32()?,
        gtime_n: r.read_u32()?,
        moments: Vec::new(),
        tables: Vec::new(),
    };
    let mut pending = Vec::new();
    r.read_ref_into(summary_slot::MOMENTS, &mut pending)?;
    r.read_ref_into(summary_slot::TABLE, &mut pending)?;
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((FrObject::Summary(s), pending))
}

pub(crate) fn encode_summary(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::Summary(s) = obj else {
        unreachable!()
    };
    w.write_string(&s.name)?;
    w.write_string(&s.comment)?;
    w.write_string(&s.test)?;
    w.write_u32(s.gtime_s);
    w.write_u32(s.gtime_n);
    w.write_ref(refs.get(summary_slot::MOMENTS));
    w.write_ref(refs.get(summary_slot::TABLE));
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

pub(crate) fn attach_summary(s: &mut FrSummary, slot: u8, child: FrObject) -> FrameResult<()> {
    match slot {
        summary_slot::MOMENTS => s.moments.push(child.expect_vect()?),
        summary_slot::TABLE => s.tables.push(child.expect_table()?),
        _ => {
            return Err(FrameError::format(
                0,
                format!("FrSummary has no slot {}", slot),
            ))
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// FrTable
// ─────────────────────────────────────────────────────────────────────────────

pub mod table_slot {
    pub const COLUMN: u8 = 0;
}

/// A table of named columns, each column a vector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrTable {
    pub name: String,
    pub comment: String,
    pub n_column: u16,
    pub n_row: u32,
    pub columns: Vec<FrVect>,
}

impl FrTable {
    pub fn new(name: &str, columns: Vec<FrVect>) -> FrameResult<Self> {
        if columns.len() > u16::MAX as usize {
            return Err(FrameError::domain(format!(
                "{} table columns exceed the on-disk count field",
                columns.len()
            )));
        }
        let n_row = columns.first().map(|c| c.n_data as u32).unwrap_or(0);
        Ok(FrTable {
            name: name.to_string(),
            comment: String::new(),
            n_column: columns.len() as u16,
            n_row,
            columns,
        })
    }
}

pub(crate) fn decode_table(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let t = FrTable {
        name: r.read_string()?,
        comment: r.read_string()?,
        n_column: r.read_u16()?,
        n_row: r.read_u32()?,
        columns: Vec::new(),
    };
    let mut pending = Vec::new();
    r.read_ref_into(table_slot::COLUMN, &mut pending)?;
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((FrObject::Table(t), pending))
}

pub(crate) fn encode_table(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::Table(t) = obj else {
        unreachable!()
    };
    w.write_string(&t.name)?;
    w.write_string(&t.comment)?;
    w.write_u16(t.n_column);
    w.write_u32(t.n_row);
    w.write_ref(refs.get(table_slot::COLUMN));
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

pub(crate) fn attach_table(t: &mut FrTable, slot: u8, child: FrObject) -> FrameResult<()> {
    match slot {
        table_slot::COLUMN => t.columns.push(child.expect_vect()?),
        _ => return Err(FrameError::format(0, format!("FrTable has no slot {}", slot))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::codec::ByteOrder;

    #[test]
    fn detector_roundtrip() {
        let d = FrDetector {
            longitude: -119.4,
            latitude: 46.45,
            elevation: 142.5,
            arm_x_azimuth: 5.65,
            local_time: -8 * 3600,
            ..FrDetector::new("LIGO Hanford 4km", *b"H1")
        };
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        encode_detector(&FrObject::Detector(d.clone()), &mut w, 8, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let (obj, _) = decode_detector(&mut r, 8).unwrap();
        assert_eq!(r.remaining(), 0);
        assert_eq!(obj.expect_detector().unwrap(), d);
    }

    #[test]
    fn stat_data_query_picks_highest_covering_version() {
        let mut d = FrDetector::new("Virgo", *b"V1");
        d.stat_data.push(FrStatData::new("calibration", 100, 200, 1));
        d.stat_data.push(FrStatData::new("calibration", 100, 200, 3));
        d.stat_data.push(FrStatData::new("calibration", 201, 0, 2));
        d.stat_data.push(FrStatData::new("alignment", 0, 0, 9));

        assert_eq!(d.stat_data_at("calibration", 150).unwrap().version, 3);
        assert_eq!(d.stat_data_at("calibration", 500).unwrap().version, 2);
        assert!(d.stat_data_at("calibration", 50).is_none());
        assert_eq!(d.stat_data_at("alignment", 1).unwrap().version, 9);
    }

    #[test]
    fn msg_time_fields_arrive_at_version8() {
        let m = FrMsg {
            alarm: "overheat".into(),
            message: "rack 3 above threshold".into(),
            severity: 2,
            gtime_s: 123,
            gtime_n: 456,
        };
        for (version, expect_s) in [(7u8, 0u32), (8, 123)] {
            let mut w = StructWriter::new(ByteOrder::LittleEndian);
            encode_msg(&FrObject::Msg(m.clone()), &mut w, version, &SlotRefs::new()).unwrap();
            let bytes = w.into_bytes();
            let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
            let (obj, _) = decode_msg(&mut r, version).unwrap();
            assert_eq!(r.remaining(), 0);
            assert_eq!(obj.expect_msg().unwrap().gtime_s, expect_s);
        }
    }

    #[test]
    fn history_roundtrip() {
        let h = FrHistory::new("gwframe", 1_100_000_000, "calibrated with v2 filters");
        let mut w = StructWriter::new(ByteOrder::BigEndian);
        encode_history(&FrObject::History(h.clone()), &mut w, 8, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::BigEndian, 0);
        let (obj, _) = decode_history(&mut r, 8).unwrap();
        assert_eq!(obj.expect_history().unwrap(), h);
    }

    #[test]
    fn table_counts_come_from_columns() {
        let t = FrTable::new(
            "params",
            vec![
                FrVect::from_f64_samples("mass1", &[1.4, 2.8], 0.0),
                FrVect::from_f64_samples("mass2", &[1.2, 2.1], 0.0),
            ],
        )
        .unwrap();
        assert_eq!(t.n_column, 2);
        assert_eq!(t.n_row, 2);
    }

    #[test]
    fn raw_data_attach_rejects_wrong_class() {
        let mut raw = FrRawData::new("rawdata");
        let err = attach_raw_data(
            &mut raw,
            raw_slot::ADC,
            FrObject::History(FrHistory::new("h", 0, "")),
        )
        .unwrap_err();
        assert_eq!(err.error_name(), "ERROR_schema");
    }
}
