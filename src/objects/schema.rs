//! FrSH / FrSE — the self-describing schema records.
//!
//! A file carries one FrSH per structure class it uses, plus one FrSE per
//! field of that class, so a reader built against an unknown version can at
//! least recover the field layout.  The writable descriptions are computed
//! once per process and shared across streams.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::FrameResult;
use crate::objects::{ClassId, FrObject};
use crate::stream::codec::{PendingSlot, SlotRefs, StructReader, StructWriter};

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// Structure header: declares a class name and its class-id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrSh {
    pub name: String,
    pub class: i16,
    pub comment: String,
}

/// Structure element: declares one field (name, type, comment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrSe {
    pub name: String,
    pub class_type: String,
    pub comment: String,
}

/// The writable schema description of one class: one FrSH plus one FrSE per
/// field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub sh: FrSh,
    pub elements: Vec<FrSe>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn decode_sh(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    Ok((
        FrObject::Sh(FrSh {
            name: r.read_string()?,
            class: r.read_i16()?,
            comment: r.read_string()?,
        }),
        Vec::new(),
    ))
}

pub(crate) fn encode_sh(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    _refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::Sh(sh) = obj else { unreachable!() };
    w.write_string(&sh.name)?;
    w.write_i16(sh.class);
    w.write_string(&sh.comment)?;
    Ok(())
}

pub(crate) fn decode_se(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    Ok((
        FrObject::Se(FrSe {
            name: r.read_string()?,
            class_type: r.read_string()?,
            comment: r.read_string()?,
        }),
        Vec::new(),
    ))
}

pub(crate) fn encode_se(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    _refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::Se(se) = obj else { unreachable!() };
    w.write_string(&se.name)?;
    w.write_string(&se.class_type)?;
    w.write_string(&se.comment)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Description cache
// ─────────────────────────────────────────────────────────────────────────────

/// Field tables for the description cache.  One row per class: the FrSE
/// names and type strings emitted for it.
const FIELD_TABLES: &[(ClassId, &[(&str, &str)])] = &[
    (
        ClassId::FrameH,
        &[
            ("name", "STRING"),
            ("run", "INT_4S"),
            ("frame", "INT_4U"),
            ("dataQuality", "INT_4U"),
            ("GTimeS", "INT_4U"),
            ("GTimeN", "INT_4U"),
            ("ULeapS", "INT_2U"),
            ("dt", "REAL_8"),
        ],
    ),
    (
        ClassId::AdcData,
        &[
            ("name", "STRING"),
            ("comment", "STRING"),
            ("channelGroup", "INT_4U"),
            ("channelNumber", "INT_4U"),
            ("nBits", "INT_4U"),
            ("bias", "REAL_4"),
            ("slope", "REAL_4"),
            ("units", "STRING"),
            ("sampleRate", "REAL_8"),
            ("timeOffset", "REAL_8"),
            ("fShift", "REAL_8"),
            ("phase", "REAL_4"),
            ("dataValid", "INT_2U"),
        ],
    ),
    (
        ClassId::ProcData,
        &[
            ("name", "STRING"),
            ("comment", "STRING"),
            ("type", "INT_2U"),
            ("subType", "INT_2U"),
            ("timeOffset", "REAL_8"),
            ("tRange", "REAL_8"),
            ("fShift", "REAL_8"),
            ("phase", "REAL_4"),
            ("fRange", "REAL_8"),
            ("BW", "REAL_8"),
        ],
    ),
    (
        ClassId::SerData,
        &[
            ("name", "STRING"),
            ("timeSec", "INT_4U"),
            ("timeNsec", "INT_4U"),
            ("sampleRate", "REAL_8"),
            ("data", "STRING"),
        ],
    ),
    (
        ClassId::SimData,
        &[
            ("name", "STRING"),
            ("comment", "STRING"),
            ("sampleRate", "REAL_8"),
            ("timeOffset", "REAL_8"),
            ("fShift", "REAL_8"),
            ("phase", "REAL_4"),
        ],
    ),
    (
        ClassId::Event,
        &[
            ("name", "STRING"),
            ("comment", "STRING"),
            ("inputs", "STRING"),
            ("GTimeS", "INT_4U"),
            ("GTimeN", "INT_4U"),
            ("timeBefore", "REAL_8"),
            ("timeAfter", "REAL_8"),
            ("eventStatus", "INT_4U"),
            ("amplitude", "REAL_8"),
            ("probability", "REAL_8"),
            ("statistics", "STRING"),
            ("nParam", "INT_2U"),
            ("parameters", "REAL_8[nParam]"),
            ("parameterNames", "STRING[nParam]"),
        ],
    ),
    (
        ClassId::SimEvent,
        &[
            ("name", "STRING"),
            ("comment", "STRING"),
            ("inputs", "STRING"),
            ("GTimeS", "INT_4U"),
            ("GTimeN", "INT_4U"),
            ("timeBefore", "REAL_8"),
            ("timeAfter", "REAL_8"),
            ("amplitude", "REAL_8"),
            ("nParam", "INT_2U"),
            ("parameters", "REAL_8[nParam]"),
            ("parameterNames", "STRING[nParam]"),
        ],
    ),
    (ClassId::RawData, &[("name", "STRING")]),
    (
        ClassId::Detector,
        &[
            ("name", "STRING"),
            ("prefix", "CHAR[2]"),
            ("longitude", "REAL_8"),
            ("latitude", "REAL_8"),
            ("elevation", "REAL_4"),
            ("armXazimuth", "REAL_4"),
            ("armYazimuth", "REAL_4"),
            ("armXaltitude", "REAL_4"),
            ("armYaltitude", "REAL_4"),
            ("armXmidpoint", "REAL_4"),
            ("armYmidpoint", "REAL_4"),
            ("localTime", "INT_4S"),
        ],
    ),
    (
        ClassId::StatData,
        &[
            ("name", "STRING"),
            ("comment", "STRING"),
            ("representation", "STRING"),
            ("timeStart", "INT_4U"),
            ("timeEnd", "INT_4U"),
            ("version", "INT_4U"),
        ],
    ),
    (
        ClassId::History,
        &[("name", "STRING"), ("time", "INT_4U"), ("comment", "STRING")],
    ),
    (
        ClassId::Msg,
        &[
            ("alarm", "STRING"),
            ("message", "STRING"),
            ("severity", "INT_4U"),
            ("GTimeS", "INT_4U"),
            ("GTimeN", "INT_4U"),
        ],
    ),
    (
        ClassId::Summary,
        &[
            ("name", "STRING"),
            ("comment", "STRING"),
            ("test", "STRING"),
            ("GTimeS", "INT_4U"),
            ("GTimeN", "INT_4U"),
        ],
    ),
    (
        ClassId::Table,
        &[
            ("name", "STRING"),
            ("comment", "STRING"),
            ("nColumn", "INT_2U"),
            ("nRow", "INT_4U"),
        ],
    ),
    (
        ClassId::Vect,
        &[
            ("name", "STRING"),
            ("compress", "INT_2U"),
            ("type", "INT_2U"),
            ("nData", "INT_8U"),
            ("nBytes", "INT_8U"),
            ("data", "CHAR[nBytes]"),
            ("nDim", "INT_4U"),
            ("nx", "INT_8U[nDim]"),
            ("dx", "REAL_8[nDim]"),
            ("startX", "REAL_8[nDim]"),
            ("unitX", "STRING[nDim]"),
            ("unitY", "STRING"),
        ],
    ),
    (
        ClassId::EndOfFrame,
        &[
            ("run", "INT_4S"),
            ("frame", "INT_4U"),
            ("GTimeS", "INT_4U"),
            ("GTimeN", "INT_4U"),
        ],
    ),
    (
        ClassId::EndOfFile,
        &[
            ("nFrames", "INT_4U"),
            ("nBytes", "INT_8U"),
            ("seekTOC", "INT_8U"),
            ("chkSum", "INT_4U"),
        ],
    ),
];

fn cache() -> &'static HashMap<i16, Description> {
    static CACHE: OnceLock<HashMap<i16, Description>> = OnceLock::new();
    CACHE.get_or_init(|| {
        FIELD_TABLES
            .iter()
            .map(|(class, fields)| {
                let desc = Description {
                    sh: FrSh {
                        name: class.struct_name().to_string(),
                        class: *class as i16,
                        comment: String::new(),
                    },
                    elements: fields
                        .iter()
                        .map(|(name, ty)| FrSe {
                            name: (*name).to_string(),
                            class_type: (*ty).to_string(),
                            comment: String::new(),
                        })
                        .collect(),
                };
                (*class as i16, desc)
            })
            .collect()
    })
}

/// Force the cache into existence.  Called by [`crate::initialize`].
pub(crate) fn populate() {
    let _ = cache();
}

/// The process-wide description of a class, if it has one.  (FrSH, FrSE and
/// FrTOC describe themselves and carry no cached description.)
pub fn description_of(class: ClassId) -> Option<&'static Description> {
    cache().get(&(class as i16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::codec::ByteOrder;

    #[test]
    fn sh_se_roundtrip() {
        let sh = FrSh {
            name: "FrAdcData".into(),
            class: ClassId::AdcData as i16,
            comment: "ADC channel".into(),
        };
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        encode_sh(&FrObject::Sh(sh.clone()), &mut w, 8, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let (obj, _) = decode_sh(&mut r, 8).unwrap();
        assert_eq!(obj, FrObject::Sh(sh));
    }

    #[test]
    fn description_cache_is_consistent() {
        let desc = description_of(ClassId::AdcData).unwrap();
        assert_eq!(desc.sh.name, "FrAdcData");
        assert_eq!(desc.sh.class, ClassId::AdcData as i16);
        assert!(desc.elements.iter().any(|e| e.name == "sampleRate"));
        // Same allocation on every call.
        let again = description_of(ClassId::AdcData).unwrap();
        assert!(std::ptr::eq(desc, again));
    }

    #[test]
    fn meta_classes_have_no_description() {
        assert!(description_of(ClassId::Sh).is_none());
        assert!(description_of(ClassId::Toc).is_none());
    }
}
