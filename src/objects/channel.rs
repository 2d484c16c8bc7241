//! Per-channel payload records: ADC, processed, serial, and simulated data.

use crate::error::{FrameError, FrameResult};
use crate::objects::{FrObject, FrVect};
use crate::stream::codec::{PendingSlot, SlotRefs, StructReader, StructWriter, SLOT_NEXT};

// ─────────────────────────────────────────────────────────────────────────────
// FrAdcData
// ─────────────────────────────────────────────────────────────────────────────

pub mod adc_slot {
    pub const DATA: u8 = 0;
    pub const AUX: u8 = 1;
}

/// One raw ADC channel: calibration, timing, and the sample vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FrAdcData {
    pub name: String,
    pub comment: String,
    pub channel_group: u32,
    pub channel_number: u32,
    pub n_bits: u32,
    pub bias: f32,
    pub slope: f32,
    pub units: String,
    pub sample_rate: f64,
    pub time_offset: f64,
    pub f_shift: f64,
    pub phase: f32,
    pub data_valid: u16,
    pub data: Option<Box<FrVect>>,
    pub aux: Option<Box<FrVect>>,
}

impl FrAdcData {
    /// A channel with calibration defaults and the given sample vector.
    pub fn new(name: &str, sample_rate: f64, data: FrVect) -> Self {
        FrAdcData {
            name: name.to_string(),
            comment: String::new(),
            channel_group: 0,
            channel_number: 0,
            n_bits: 8 * data.elem_type.byte_size().unwrap_or(1) as u32,
            bias: 0.0,
            slope: 1.0,
            units: String::new(),
            sample_rate,
            time_offset: 0.0,
            f_shift: 0.0,
            phase: 0.0,
            data_valid: 0,
            data: Some(Box::new(data)),
            aux: None,
        }
    }
}

pub(crate) fn decode_adc(
    r: &mut StructReader,
    version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let name = r.read_string()?;
    let comment = r.read_string()?;
    let channel_group = r.read_u32()?;
    let channel_number = r.read_u32()?;
    let n_bits = r.read_u32()?;
    let bias = r.read_f32()?;
    let slope = r.read_f32()?;
    let units = r.read_string()?;
    let sample_rate = r.read_f64()?;
    let time_offset = r.read_f64()?;
    let f_shift = r.read_f64()?;
    let phase = if version >= 4 { r.read_f32()? } else { 0.0 };
    let data_valid = r.read_u16()?;
    let mut pending = Vec::new();
    r.read_ref_into(adc_slot::DATA, &mut pending)?;
    r.read_ref_into(adc_slot::AUX, &mut pending)?;
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((
        FrObject::AdcData(FrAdcData {
            name,
            comment,
            channel_group,
            channel_number,
            n_bits,
            bias,
            slope,
            units,
            sample_rate,
            time_offset,
            f_shift,
            phase,
            data_valid,
            data: None,
            aux: None,
        }),
        pending,
    ))
}

pub(crate) fn encode_adc(
    obj: &FrObject,
    w: &mut StructWriter,
    version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::AdcData(a) = obj else {
        unreachable!()
    };
    w.write_string(&a.name)?;
    w.write_string(&a.comment)?;
    w.write_u32(a.channel_group);
    w.write_u32(a.channel_number);
    w.write_u32(a.n_bits);
    w.write_f32(a.bias);
    w.write_f32(a.slope);
    w.write_string(&a.units)?;
    w.write_f64(a.sample_rate);
    w.write_f64(a.time_offset);
    w.write_f64(a.f_shift);
    if version >= 4 {
        w.write_f32(a.phase);
    }
    w.write_u16(a.data_valid);
    w.write_ref(refs.get(adc_slot::DATA));
    w.write_ref(refs.get(adc_slot::AUX));
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

pub(crate) fn attach_adc(a: &mut FrAdcData, slot: u8, child: FrObject) -> FrameResult<()> {
    match slot {
        adc_slot::DATA => a.data = Some(Box::new(child.expect_vect()?)),
        adc_slot::AUX => a.aux = Some(Box::new(child.expect_vect()?)),
        _ => return Err(FrameError::format(0, format!("FrAdcData has no slot {}", slot))),
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// FrProcData
// ─────────────────────────────────────────────────────────────────────────────

pub mod proc_slot {
    pub const DATA: u8 = 0;
    pub const AUX: u8 = 1;
}

/// A post-processed (derived) channel.
#[derive(Debug, Clone, PartialEq)]
pub struct FrProcData {
    pub name: String,
    pub comment: String,
    pub kind: u16,
    pub sub_type: u16,
    pub time_offset: f64,
    pub t_range: f64,
    pub f_shift: f64,
    pub phase: f32,
    pub f_range: f64,
    pub bw: f64,
    pub data: Option<Box<FrVect>>,
    pub aux: Option<Box<FrVect>>,
}

impl FrProcData {
    pub fn new(name: &str, t_range: f64, data: FrVect) -> Self {
        FrProcData {
            name: name.to_string(),
            comment: String::new(),
            kind: 1, // time series
            sub_type: 0,
            time_offset: 0.0,
            t_range,
            f_shift: 0.0,
            phase: 0.0,
            f_range: 0.0,
            bw: 0.0,
            data: Some(Box::new(data)),
            aux: None,
        }
    }
}

pub(crate) fn decode_proc(
    r: &mut StructReader,
    version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let name = r.read_string()?;
    let comment = r.read_string()?;
    let kind = r.read_u16()?;
    let sub_type = if version >= 6 { r.read_u16()? } else { 0 };
    let time_offset = r.read_f64()?;
    let t_range = r.read_f64()?;
    let f_shift = r.read_f64()?;
    let phase = r.read_f32()?;
    let (f_range, bw) = if version >= 6 {
        (r.read_f64()?, r.read_f64()?)
    } else {
        (0.0, 0.0)
    };
    let mut pending = Vec::new();
    r.read_ref_into(proc_slot::DATA, &mut pending)?;
    r.read_ref_into(proc_slot::AUX, &mut pending)?;
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((
        FrObject::ProcData(FrProcData {
            name,
            comment,
            kind,
            sub_type,
            time_offset,
            t_range,
            f_shift,
            phase,
            f_range,
            bw,
            data: None,
            aux: None,
        }),
        pending,
    ))
}

pub(crate) fn encode_proc(
    obj: &FrObject,
    w: &mut StructWriter,
    version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::ProcData(p) = obj else {
        unreachable!()
    };
    w.write_string(&p.name)?;
    w.write_string(&p.comment)?;
    w.write_u16(p.kind);
    if version >= 6 {
        w.write_u16(p.sub_type);
    }
    w.write_f64(p.time_offset);
    w.write_f64(p.t_range);
    w.write_f64(p.f_shift);
    w.write_f32(p.phase);
    if version >= 6 {
        w.write_f64(p.f_range);
        w.write_f64(p.bw);
    }
    w.write_ref(refs.get(proc_slot::DATA));
    w.write_ref(refs.get(proc_slot::AUX));
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

pub(crate) fn attach_proc(p: &mut FrProcData, slot: u8, child: FrObject) -> FrameResult<()> {
    match slot {
        proc_slot::DATA => p.data = Some(Box::new(child.expect_vect()?)),
        proc_slot::AUX => p.aux = Some(Box::new(child.expect_vect()?)),
        _ => {
            return Err(FrameError::format(
                0,
                format!("FrProcData has no slot {}", slot),
            ))
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// FrSerData
// ─────────────────────────────────────────────────────────────────────────────

pub mod ser_slot {
    pub const SERIAL: u8 = 0;
}

/// Slow serial (environment/monitor) data: a timestamped text record with an
/// optional sample vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FrSerData {
    pub name: String,
    pub time_sec: u32,
    pub time_nsec: u32,
    pub sample_rate: f64,
    pub data: String,
    pub serial: Option<Box<FrVect>>,
}

impl FrSerData {
    pub fn new(name: &str, time_sec: u32, sample_rate: f64, data: &str) -> Self {
        FrSerData {
            name: name.to_string(),
            time_sec,
            time_nsec: 0,
            sample_rate,
            data: data.to_string(),
            serial: None,
        }
    }

    /// Merge two records of the same serial channel, appending samples in
    /// timestamp order.  Equal timestamps are overlapping and refused.
    pub fn merge(self, other: FrSerData) -> FrameResult<FrSerData> {
        if self.name != other.name {
            return Err(FrameError::domain(format!(
                "cannot merge serial records '{}' and '{}'",
                self.name, other.name
            )));
        }
        if self.sample_rate != other.sample_rate {
            return Err(FrameError::domain(format!(
                "serial record '{}': sample rates {} and {} are incompatible",
                self.name, self.sample_rate, other.sample_rate
            )));
        }
        let (a, b) = match (self.time_sec, self.time_nsec).cmp(&(other.time_sec, other.time_nsec))
        {
            std::cmp::Ordering::Less => (self, other),
            std::cmp::Ordering::Greater => (other, self),
            std::cmp::Ordering::Equal => {
                return Err(FrameError::domain(format!(
                    "serial record '{}': overlapping timestamps at {}.{:09}",
                    self.name, self.time_sec, self.time_nsec
                )))
            }
        };
        let data = if a.data.is_empty() {
            b.data
        } else if b.data.is_empty() {
            a.data
        } else {
            format!("{}\n{}", a.data, b.data)
        };
        let serial = match (a.serial, b.serial) {
            (Some(mut first), Some(second)) => {
                first.data.extend_from_slice(&second.data);
                first.n_data += second.n_data;
                if let (Some(d0), Some(d1)) = (first.dims.first_mut(), second.dims.first()) {
                    d0.nx += d1.nx;
                }
                Some(first)
            }
            (Some(one), None) | (None, Some(one)) => Some(one),
            (None, None) => None,
        };
        Ok(FrSerData {
            name: a.name,
            time_sec: a.time_sec,
            time_nsec: a.time_nsec,
            sample_rate: a.sample_rate,
            data,
            serial,
        })
    }
}

pub(crate) fn decode_ser(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let name = r.read_string()?;
    let time_sec = r.read_u32()?;
    let time_nsec = r.read_u32()?;
    let sample_rate = r.read_f64()?;
    let data = r.read_string()?;
    let mut pending = Vec::new();
    r.read_ref_into(ser_slot::SERIAL, &mut pending)?;
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((
        FrObject::SerData(FrSerData {
            name,
            time_sec,
            time_nsec,
            sample_rate,
            data,
            serial: None,
        }),
        pending,
    ))
}

pub(crate) fn encode_ser(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::SerData(s) = obj else {
        unreachable!()
    };
    w.write_string(&s.name)?;
    w.write_u32(s.time_sec);
    w.write_u32(s.time_nsec);
    w.write_f64(s.sample_rate);
    w.write_string(&s.data)?;
    w.write_ref(refs.get(ser_slot::SERIAL));
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

pub(crate) fn attach_ser(s: &mut FrSerData, slot: u8, child: FrObject) -> FrameResult<()> {
    match slot {
        ser_slot::SERIAL => s.serial = Some(Box::new(child.expect_vect()?)),
        _ => {
            return Err(FrameError::format(
                0,
                format!("FrSerData has no slot {}", slot),
            ))
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// FrSimData
// ─────────────────────────────────────────────────────────────────────────────

pub mod sim_slot {
    pub const DATA: u8 = 0;
    pub const INPUT: u8 = 1;
}

/// A simulated channel.
#[derive(Debug, Clone, PartialEq)]
pub struct FrSimData {
    pub name: String,
    pub comment: String,
    pub sample_rate: f64,
    pub time_offset: f64,
    pub f_shift: f64,
    pub phase: f32,
    pub data: Option<Box<FrVect>>,
    pub input: Option<Box<FrVect>>,
}

impl FrSimData {
    pub fn new(name: &str, sample_rate: f64, data: FrVect) -> Self {
        FrSimData {
            name: name.to_string(),
            comment: String::new(),
            sample_rate,
            time_offset: 0.0,
            f_shift: 0.0,
            phase: 0.0,
            data: Some(Box::new(data)),
            input: None,
        }
    }
}

pub(crate) fn decode_sim(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let name = r.read_string()?;
    let comment = r.read_string()?;
    let sample_rate = r.read_f64()?;
    let time_offset = r.read_f64()?;
    let f_shift = r.read_f64()?;
    let phase = r.read_f32()?;
    let mut pending = Vec::new();
    r.read_ref_into(sim_slot::DATA, &mut pending)?;
    r.read_ref_into(sim_slot::INPUT, &mut pending)?;
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((
        FrObject::SimData(FrSimData {
            name,
            comment,
            sample_rate,
            time_offset,
            f_shift,
            phase,
            data: None,
            input: None,
        }),
        pending,
    ))
}

pub(crate) fn encode_sim(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::SimData(s) = obj else {
        unreachable!()
    };
    w.write_string(&s.name)?;
    w.write_string(&s.comment)?;
    w.write_f64(s.sample_rate);
    w.write_f64(s.time_offset);
    w.write_f64(s.f_shift);
    w.write_f32(s.phase);
    w.write_ref(refs.get(sim_slot::DATA));
    w.write_ref(refs.get(sim_slot::INPUT));
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

pub(crate) fn attach_sim(s: &mut FrSimData, slot: u8, child: FrObject) -> FrameResult<()> {
    match slot {
        sim_slot::DATA => s.data = Some(Box::new(child.expect_vect()?)),
        sim_slot::INPUT => s.input = Some(Box::new(child.expect_vect()?)),
        _ => {
            return Err(FrameError::format(
                0,
                format!("FrSimData has no slot {}", slot),
            ))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::codec::ByteOrder;

    #[test]
    fn adc_field_roundtrip() {
        let adc = FrAdcData {
            comment: "test channel".into(),
            channel_group: 3,
            channel_number: 14,
            bias: -0.5,
            slope: 1.5e-3,
            units: "counts".into(),
            data_valid: 0xBEEF,
            data: None,
            ..FrAdcData::new("H1:TEST", 16384.0, FrVect::from_i32_samples("x", &[1], 1.0))
        };
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        encode_adc(&FrObject::AdcData(adc.clone()), &mut w, 8, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let (obj, pending) = decode_adc(&mut r, 8).unwrap();
        assert_eq!(r.remaining(), 0);
        assert!(pending.is_empty());
        let back = obj.expect_adc().unwrap();
        assert_eq!(back, adc);
    }

    #[test]
    fn adc_version3_omits_phase() {
        let adc = FrAdcData::new("L1:V3", 256.0, FrVect::from_i16_samples("x", &[0], 1.0));
        let mut w3 = StructWriter::new(ByteOrder::LittleEndian);
        encode_adc(&FrObject::AdcData(adc.clone()), &mut w3, 3, &SlotRefs::new()).unwrap();
        let mut w4 = StructWriter::new(ByteOrder::LittleEndian);
        encode_adc(&FrObject::AdcData(adc.clone()), &mut w4, 4, &SlotRefs::new()).unwrap();
        assert_eq!(w4.len() - w3.len(), 4);
        let bytes = w3.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let (obj, _) = decode_adc(&mut r, 3).unwrap();
        assert_eq!(r.remaining(), 0);
        assert_eq!(obj.expect_adc().unwrap().phase, 0.0);
    }

    #[test]
    fn proc_version4_omits_subtype_and_ranges() {
        let proc = FrProcData {
            sub_type: 2,
            f_range: 512.0,
            bw: 0.25,
            data: None,
            ..FrProcData::new("H1:DERIVED", 1.0, FrVect::from_f64_samples("x", &[0.0], 1.0))
        };
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        encode_proc(&FrObject::ProcData(proc.clone()), &mut w, 4, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let (obj, _) = decode_proc(&mut r, 4).unwrap();
        assert_eq!(r.remaining(), 0);
        let back = obj.expect_proc().unwrap();
        // The version-6 fields do not survive a version-4 encoding.
        assert_eq!(back.sub_type, 0);
        assert_eq!(back.f_range, 0.0);
        assert_eq!(back.bw, 0.0);
        assert_eq!(back.name, proc.name);
        assert_eq!(back.t_range, proc.t_range);
    }

    #[test]
    fn ser_merge_orders_by_timestamp() {
        let early = FrSerData::new("V1:PEM", 1_000_000_000, 1.0, "t=0 v=3.2");
        let late = FrSerData::new("V1:PEM", 1_000_000_001, 1.0, "t=1 v=3.3");
        // Merge in reverse order; timestamps decide.
        let merged = late.merge(early).unwrap();
        assert_eq!(merged.time_sec, 1_000_000_000);
        assert_eq!(merged.data, "t=0 v=3.2\nt=1 v=3.3");
    }

    #[test]
    fn ser_merge_refuses_overlap() {
        let a = FrSerData::new("V1:PEM", 5, 1.0, "a");
        let b = FrSerData::new("V1:PEM", 5, 1.0, "b");
        assert_eq!(a.merge(b).unwrap_err().error_name(), "ERROR_domain");
    }

    #[test]
    fn ser_merge_refuses_name_mismatch() {
        let a = FrSerData::new("V1:PEM", 1, 1.0, "a");
        let b = FrSerData::new("V1:OTHER", 2, 1.0, "b");
        assert!(a.merge(b).is_err());
    }

    #[test]
    fn ser_merge_concatenates_sample_vectors() {
        let mut a = FrSerData::new("H1:MON", 10, 2.0, "");
        a.serial = Some(Box::new(FrVect::from_f32_samples("s", &[1.0, 2.0], 0.5)));
        let mut b = FrSerData::new("H1:MON", 11, 2.0, "");
        b.serial = Some(Box::new(FrVect::from_f32_samples("s", &[3.0], 0.5)));
        let merged = a.merge(b).unwrap();
        let v = merged.serial.unwrap();
        assert_eq!(v.n_data, 3);
        assert_eq!(v.dims[0].nx, 3);
        assert_eq!(v.as_f32().unwrap(), vec![1.0, 2.0, 3.0]);
    }
}
