//! Event and simulated-event records.

use crate::error::{FrameError, FrameResult};
use crate::objects::{FrObject, FrVect};
use crate::stream::codec::{PendingSlot, SlotRefs, StructReader, StructWriter, SLOT_NEXT};

/// One named event parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct EventParam {
    pub name: String,
    pub value: f64,
}

pub mod event_slot {
    pub const DATA: u8 = 0;
}

// ─────────────────────────────────────────────────────────────────────────────
// FrEvent
// ─────────────────────────────────────────────────────────────────────────────

/// A trigger/event record produced by an online or offline search.
#[derive(Debug, Clone, PartialEq)]
pub struct FrEvent {
    /// Event type, e.g. the name of the search that produced it.
    pub name: String,
    pub comment: String,
    /// Input channels the search consumed.
    pub inputs: String,
    pub gtime_s: u32,
    pub gtime_n: u32,
    pub time_before: f64,
    pub time_after: f64,
    pub event_status: u32,
    pub amplitude: f64,
    pub probability: f64,
    pub statistics: String,
    pub params: Vec<EventParam>,
    pub data: Option<Box<FrVect>>,
}

impl FrEvent {
    pub fn new(name: &str, gtime_s: u32, amplitude: f64) -> Self {
        FrEvent {
            name: name.to_string(),
            comment: String::new(),
            inputs: String::new(),
            gtime_s,
            gtime_n: 0,
            time_before: 0.0,
            time_after: 0.0,
            event_status: 0,
            amplitude,
            probability: -1.0,
            statistics: String::new(),
            params: Vec::new(),
            data: None,
        }
    }
}

fn read_params(r: &mut StructReader) -> FrameResult<Vec<EventParam>> {
    let n = r.read_u16()? as usize;
    let mut values = Vec::with_capacity(n.min(256));
    for _ in 0..n {
        values.push(r.read_f64()?);
    }
    let mut params = Vec::with_capacity(n.min(256));
    for value in values {
        params.push(EventParam {
            name: r.read_string()?,
            value,
        });
    }
    Ok(params)
}

fn write_params(w: &mut StructWriter, params: &[EventParam]) -> FrameResult<()> {
    if params.len() > u16::MAX as usize {
        return Err(FrameError::domain(format!(
            "{} event parameters exceed the on-disk count field",
            params.len()
        )));
    }
    w.write_u16(params.len() as u16);
    for p in params {
        w.write_f64(p.value);
    }
    for p in params {
        w.write_string(&p.name)?;
    }
    Ok(())
}

pub(crate) fn decode_event(
    r: &mut StructReader,
    version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let name = r.read_string()?;
    let comment = r.read_string()?;
    let inputs = r.read_string()?;
    let gtime_s = r.read_u32()?;
    let gtime_n = r.read_u32()?;
    let (time_before, time_after) = if version >= 6 {
        (r.read_f64()?, r.read_f64()?)
    } else {
        (0.0, 0.0)
    };
    let event_status = r.read_u32()?;
    let amplitude = r.read_f64()?;
    let probability = r.read_f64()?;
    let statistics = r.read_string()?;
    let params = read_params(r)?;
    let mut pending = Vec::new();
    r.read_ref_into(event_slot::DATA, &mut pending)?;
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((
        FrObject::Event(FrEvent {
            name,
            comment,
            inputs,
            gtime_s,
            gtime_n,
            time_before,
            time_after,
            event_status,
            amplitude,
            probability,
            statistics,
            params,
            data: None,
        }),
        pending,
    ))
}

pub(crate) fn encode_event(
    obj: &FrObject,
    w: &mut StructWriter,
    version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::Event(e) = obj else {
        unreachable!()
    };
    w.write_string(&e.name)?;
    w.write_string(&e.comment)?;
    w.write_string(&e.inputs)?;
    w.write_u32(e.gtime_s);
    w.write_u32(e.gtime_n);
    if version >= 6 {
        w.write_f64(e.time_before);
        w.write_f64(e.time_after);
    }
    w.write_u32(e.event_status);
    w.write_f64(e.amplitude);
    w.write_f64(e.probability);
    w.write_string(&e.statistics)?;
    write_params(w, &e.params)?;
    w.write_ref(refs.get(event_slot::DATA));
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

pub(crate) fn attach_event(e: &mut FrEvent, slot: u8, child: FrObject) -> FrameResult<()> {
    match slot {
        event_slot::DATA => e.data = Some(Box::new(child.expect_vect()?)),
        _ => return Err(FrameError::format(0, format!("FrEvent has no slot {}", slot))),
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// FrSimEvent
// ─────────────────────────────────────────────────────────────────────────────

/// A simulated-event (injection) record.
#[derive(Debug, Clone, PartialEq)]
pub struct FrSimEvent {
    pub name: String,
    pub comment: String,
    pub inputs: String,
    pub gtime_s: u32,
    pub gtime_n: u32,
    pub time_before: f64,
    pub time_after: f64,
    pub amplitude: f64,
    pub params: Vec<EventParam>,
    pub data: Option<Box<FrVect>>,
}

impl FrSimEvent {
    pub fn new(name: &str, gtime_s: u32, amplitude: f64) -> Self {
        FrSimEvent {
            name: name.to_string(),
            comment: String::new(),
            inputs: String::new(),
            gtime_s,
            gtime_n: 0,
            time_before: 0.0,
            time_after: 0.0,
            amplitude,
            params: Vec::new(),
            data: None,
        }
    }
}

pub(crate) fn decode_sim_event(
    r: &mut StructReader,
    version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let name = r.read_string()?;
    let comment = r.read_string()?;
    let inputs = r.read_string()?;
    let gtime_s = r.read_u32()?;
    let gtime_n = r.read_u32()?;
    let (time_before, time_after) = if version >= 7 {
        (r.read_f64()?, r.read_f64()?)
    } else {
        (0.0, 0.0)
    };
    let amplitude = r.read_f64()?;
    let params = read_params(r)?;
    let mut pending = Vec::new();
    r.read_ref_into(event_slot::DATA, &mut pending)?;
    r.read_ref_into(SLOT_NEXT, &mut pending)?;
    Ok((
        FrObject::SimEvent(FrSimEvent {
            name,
            comment,
            inputs,
            gtime_s,
            gtime_n,
            time_before,
            time_after,
            amplitude,
            params,
            data: None,
        }),
        pending,
    ))
}

pub(crate) fn encode_sim_event(
    obj: &FrObject,
    w: &mut StructWriter,
    version: u8,
    refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::SimEvent(e) = obj else {
        unreachable!()
    };
    w.write_string(&e.name)?;
    w.write_string(&e.comment)?;
    w.write_string(&e.inputs)?;
    w.write_u32(e.gtime_s);
    w.write_u32(e.gtime_n);
    if version >= 7 {
        w.write_f64(e.time_before);
        w.write_f64(e.time_after);
    }
    w.write_f64(e.amplitude);
    write_params(w, &e.params)?;
    w.write_ref(refs.get(event_slot::DATA));
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

pub(crate) fn attach_sim_event(e: &mut FrSimEvent, slot: u8, child: FrObject) -> FrameResult<()> {
    match slot {
        event_slot::DATA => e.data = Some(Box::new(child.expect_vect()?)),
        _ => {
            return Err(FrameError::format(
                0,
                format!("FrSimEvent has no slot {}", slot),
            ))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::codec::ByteOrder;

    fn sample_event() -> FrEvent {
        FrEvent {
            comment: "loudest in segment".into(),
            inputs: "H1:LSC-STRAIN".into(),
            gtime_n: 250_000_000,
            time_before: 0.5,
            time_after: 1.5,
            event_status: 1,
            probability: 0.999,
            statistics: "snr".into(),
            params: vec![
                EventParam {
                    name: "snr".into(),
                    value: 11.25,
                },
                EventParam {
                    name: "chisq".into(),
                    value: 0.8,
                },
            ],
            ..FrEvent::new("cbc-inspiral", 1_000_000_123, 3.5e-21)
        }
    }

    #[test]
    fn event_roundtrip_version8() {
        let e = sample_event();
        let mut w = StructWriter::new(ByteOrder::BigEndian);
        encode_event(&FrObject::Event(e.clone()), &mut w, 8, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::BigEndian, 0);
        let (obj, _) = decode_event(&mut r, 8).unwrap();
        assert_eq!(r.remaining(), 0);
        assert_eq!(obj.expect_event().unwrap(), e);
    }

    #[test]
    fn event_version4_drops_windows() {
        let e = sample_event();
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        encode_event(&FrObject::Event(e.clone()), &mut w, 4, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let (obj, _) = decode_event(&mut r, 4).unwrap();
        assert_eq!(r.remaining(), 0);
        let back = obj.expect_event().unwrap();
        assert_eq!(back.time_before, 0.0);
        assert_eq!(back.time_after, 0.0);
        assert_eq!(back.params, e.params);
        assert_eq!(back.amplitude, e.amplitude);
    }

    #[test]
    fn sim_event_window_fields_arrive_at_version7() {
        let mut e = FrSimEvent::new("injection", 900_000_000, 1e-22);
        e.time_before = 2.0;
        e.time_after = 2.0;
        for (version, expect) in [(6u8, 0.0f64), (7, 2.0), (8, 2.0)] {
            let mut w = StructWriter::new(ByteOrder::LittleEndian);
            encode_sim_event(&FrObject::SimEvent(e.clone()), &mut w, version, &SlotRefs::new())
                .unwrap();
            let bytes = w.into_bytes();
            let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
            let (obj, _) = decode_sim_event(&mut r, version).unwrap();
            assert_eq!(r.remaining(), 0);
            match obj {
                FrObject::SimEvent(back) => assert_eq!(back.time_before, expect),
                other => panic!("wrong variant {:?}", other),
            }
        }
    }

    #[test]
    fn empty_param_list_roundtrip() {
        let e = FrEvent::new("glitch", 7, 0.0);
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        encode_event(&FrObject::Event(e.clone()), &mut w, 8, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let (obj, _) = decode_event(&mut r, 8).unwrap();
        assert_eq!(obj.expect_event().unwrap(), e);
    }
}
