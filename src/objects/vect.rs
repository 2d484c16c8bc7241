//! FrVect — the typed multi-dimensional array carried by most payloads.
//!
//! In memory the payload is held uncompressed, in host byte order.  The
//! codec performs the byte-order swap and the compression transform at the
//! stream boundary, so `==` on two vectors compares logical content no
//! matter what order or scheme their source files used.

use std::io::Write as _;

use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;

use crate::error::{FrameError, FrameResult};
use crate::objects::FrObject;
use crate::stream::codec::{ByteOrder, PendingSlot, SlotRefs, StructReader, StructWriter, SLOT_NEXT};

// ─────────────────────────────────────────────────────────────────────────────
// Element types
// ─────────────────────────────────────────────────────────────────────────────

/// Closed enumeration of vector element types, by on-disk tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ElementType {
    Int8 = 0,
    Int16 = 1,
    Float64 = 2,
    Float32 = 3,
    Int32 = 4,
    Int64 = 5,
    UInt8 = 6,
    UInt16 = 7,
    UInt32 = 8,
    UInt64 = 9,
    /// NUL-terminated byte strings, packed back to back.
    StringArray = 10,
    /// Pairs of f32 (real, imaginary).
    Complex8 = 11,
    /// Pairs of f64 (real, imaginary).
    Complex16 = 12,
}

impl ElementType {
    pub fn from_u16(tag: u16) -> Option<ElementType> {
        use ElementType::*;
        Some(match tag {
            0 => Int8,
            1 => Int16,
            2 => Float64,
            3 => Float32,
            4 => Int32,
            5 => Int64,
            6 => UInt8,
            7 => UInt16,
            8 => UInt32,
            9 => UInt64,
            10 => StringArray,
            11 => Complex8,
            12 => Complex16,
            _ => return None,
        })
    }

    /// Bytes per element; `None` for string arrays (variable).
    pub fn byte_size(&self) -> Option<usize> {
        use ElementType::*;
        Some(match self {
            Int8 | UInt8 => 1,
            Int16 | UInt16 => 2,
            Float32 | Int32 | UInt32 => 4,
            Float64 | Int64 | UInt64 | Complex8 => 8,
            Complex16 => 16,
            StringArray => return None,
        })
    }

    /// Width of the byte-order swap unit.  Complex elements swap their f32
    /// or f64 components independently; byte-wide and string data never
    /// swap.
    pub fn swap_width(&self) -> usize {
        use ElementType::*;
        match self {
            Int8 | UInt8 | StringArray => 1,
            Int16 | UInt16 => 2,
            Float32 | Int32 | UInt32 | Complex8 => 4,
            Float64 | Int64 | UInt64 | Complex16 => 8,
        }
    }

    /// Earliest data-format version able to express this element type.
    pub fn min_version(&self) -> u8 {
        match self {
            ElementType::Complex8 | ElementType::Complex16 => 6,
            _ => 3,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Compression schemes
// ─────────────────────────────────────────────────────────────────────────────

/// Payload compression scheme, by on-disk tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum VectCompression {
    #[default]
    Raw = 0,
    Zlib = 1,
}

impl VectCompression {
    pub fn from_u16(tag: u16, version: u8) -> FrameResult<VectCompression> {
        match tag {
            0 => Ok(VectCompression::Raw),
            1 => Ok(VectCompression::Zlib),
            _ => Err(FrameError::Unimplemented {
                version,
                what: "vector compression scheme",
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dimensions
// ─────────────────────────────────────────────────────────────────────────────

/// One axis of a vector: length, sampling interval, origin, unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    pub nx: u64,
    pub dx: f64,
    pub start_x: f64,
    pub unit_x: String,
}

impl Dimension {
    pub fn new(nx: u64, dx: f64) -> Self {
        Dimension {
            nx,
            dx,
            start_x: 0.0,
            unit_x: String::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FrVect
// ─────────────────────────────────────────────────────────────────────────────

/// Slot numbers for FrVect references.
pub mod slot {
    pub use crate::stream::codec::SLOT_NEXT as NEXT;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrVect {
    pub name: String,
    pub compress: VectCompression,
    pub elem_type: ElementType,
    pub n_data: u64,
    pub dims: Vec<Dimension>,
    pub unit_y: String,
    /// Uncompressed payload in host byte order.
    pub data: Vec<u8>,
}

macro_rules! typed_ctor {
    ($ctor:ident, $getter:ident, $ty:ty, $variant:ident) => {
        /// Build a one-dimensional vector from typed samples.
        pub fn $ctor(name: &str, samples: &[$ty], dx: f64) -> FrVect {
            let mut data = Vec::with_capacity(samples.len() * core::mem::size_of::<$ty>());
            for s in samples {
                data.extend_from_slice(&s.to_ne_bytes());
            }
            FrVect {
                name: name.to_string(),
                compress: VectCompression::Raw,
                elem_type: ElementType::$variant,
                n_data: samples.len() as u64,
                dims: vec![Dimension::new(samples.len() as u64, dx)],
                unit_y: String::new(),
                data,
            }
        }

        /// Payload as typed samples, if the element type matches.
        pub fn $getter(&self) -> Option<Vec<$ty>> {
            if self.elem_type != ElementType::$variant {
                return None;
            }
            Some(
                self.data
                    .chunks_exact(core::mem::size_of::<$ty>())
                    .map(|c| <$ty>::from_ne_bytes(c.try_into().unwrap()))
                    .collect(),
            )
        }
    };
}

impl FrVect {
    typed_ctor!(from_i16_samples, as_i16, i16, Int16);
    typed_ctor!(from_i32_samples, as_i32, i32, Int32);
    typed_ctor!(from_f32_samples, as_f32, f32, Float32);
    typed_ctor!(from_f64_samples, as_f64, f64, Float64);

    /// Request a compression scheme for the next write of this vector.
    pub fn with_compression(mut self, compress: VectCompression) -> Self {
        self.compress = compress;
        self
    }

    /// Product of all axis lengths.
    pub fn dim_product(&self) -> u64 {
        self.dims.iter().map(|d| d.nx).product()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload transforms
// ─────────────────────────────────────────────────────────────────────────────

/// Reverse each `width`-byte group in place.  No-op for `width` ≤ 1.
pub(crate) fn swap_order(bytes: &mut [u8], width: usize) {
    if width <= 1 {
        return;
    }
    for chunk in bytes.chunks_exact_mut(width) {
        chunk.reverse();
    }
}

fn deflate(bytes: &[u8]) -> FrameResult<Vec<u8>> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes)?;
    Ok(enc.finish()?)
}

fn inflate(bytes: &[u8], offset: u64) -> FrameResult<Vec<u8>> {
    let mut dec = ZlibDecoder::new(Vec::new());
    dec.write_all(bytes)
        .and_then(|_| dec.finish())
        .map_err(|e| FrameError::format(offset, format!("corrupt zlib payload: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn decode(
    r: &mut StructReader,
    version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    let name = r.read_string()?;
    let compress_tag = r.read_u16()?;
    let type_tag = r.read_u16()?;
    let (n_data, n_bytes) = if version < 6 {
        (r.read_u32()? as u64, r.read_u32()? as u64)
    } else {
        (r.read_u64()?, r.read_u64()?)
    };
    let payload_offset = r.offset();
    let stored = r.read_bytes(n_bytes as usize)?.to_vec();
    let n_dim = r.read_u32()?;
    let mut dims = Vec::with_capacity(n_dim.min(64) as usize);
    for _ in 0..n_dim {
        dims.push(Dimension {
            nx: r.read_u64()?,
            dx: r.read_f64()?,
            start_x: r.read_f64()?,
            unit_x: r.read_string()?,
        });
    }
    let unit_y = r.read_string()?;
    let mut pending = Vec::new();
    r.read_ref_into(SLOT_NEXT, &mut pending)?;

    let elem_type = ElementType::from_u16(type_tag).ok_or(FrameError::Schema {
        version,
        class: super::ClassId::Vect as i16,
        offset: payload_offset,
        what: format!("unknown vector element type {}", type_tag),
    })?;
    let compress = VectCompression::from_u16(compress_tag, version)?;
    let mut data = match compress {
        VectCompression::Raw => stored,
        VectCompression::Zlib => inflate(&stored, payload_offset)?,
    };
    if r.order() != ByteOrder::host() {
        swap_order(&mut data, elem_type.swap_width());
    }

    Ok((
        FrObject::Vect(FrVect {
            name,
            compress,
            elem_type,
            n_data,
            dims,
            unit_y,
            data,
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
    let FrObject::Vect(v) = obj else {
        unreachable!("vect codec dispatched for {:?}", obj.class_id())
    };
    w.write_string(&v.name)?;
    w.write_u16(v.compress as u16);
    w.write_u16(v.elem_type as u16);

    let mut payload = v.data.clone();
    if w.order() != ByteOrder::host() {
        swap_order(&mut payload, v.elem_type.swap_width());
    }
    let stored = match v.compress {
        VectCompression::Raw => payload,
        VectCompression::Zlib => deflate(&payload)?,
    };

    if version < 6 {
        if v.n_data > u32::MAX as u64 || stored.len() as u64 > u32::MAX as u64 {
            return Err(FrameError::domain(format!(
                "vector '{}' is too large for data-format version {}",
                v.name, version
            )));
        }
        w.write_u32(v.n_data as u32);
        w.write_u32(stored.len() as u32);
    } else {
        w.write_u64(v.n_data);
        w.write_u64(stored.len() as u64);
    }
    w.write_bytes(&stored);
    w.write_u32(v.dims.len() as u32);
    for d in &v.dims {
        w.write_u64(d.nx);
        w.write_f64(d.dx);
        w.write_f64(d.start_x);
        w.write_string(&d.unit_x)?;
    }
    w.write_string(&v.unit_y)?;
    w.write_ref(refs.get(SLOT_NEXT));
    Ok(())
}

/// Demotion guard: a vector whose element type postdates the target version
/// cannot be expressed there.
pub(crate) fn demote_step(obj: FrObject, target: u8) -> FrameResult<FrObject> {
    let FrObject::Vect(ref v) = obj else {
        unreachable!()
    };
    if v.elem_type.min_version() > target {
        return Err(FrameError::domain(format!(
            "vector '{}' holds {:?} data, which data-format version {} cannot express",
            v.name, v.elem_type, target
        )));
    }
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec_roundtrip(v: &FrVect, order: ByteOrder, version: u8) -> FrVect {
        let mut w = StructWriter::new(order);
        encode(&FrObject::Vect(v.clone()), &mut w, version, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, order, 0);
        let (obj, pending) = decode(&mut r, version).unwrap();
        assert_eq!(r.remaining(), 0, "codec must consume the whole body");
        assert!(pending.is_empty());
        obj.expect_vect().unwrap()
    }

    #[test]
    fn roundtrip_i32_both_orders() {
        let samples: Vec<i32> = (0..16).collect();
        let v = FrVect::from_i32_samples("H1:TEST", &samples, 1.0 / 16.0);
        for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            let back = codec_roundtrip(&v, order, 8);
            assert_eq!(back, v);
            assert_eq!(back.as_i32().unwrap(), samples);
        }
    }

    #[test]
    fn roundtrip_f64_compressed() {
        let samples: Vec<f64> = (0..4096).map(|i| (i as f64).sin()).collect();
        let v = FrVect::from_f64_samples("V1:STRAIN", &samples, 1.0 / 4096.0)
            .with_compression(VectCompression::Zlib);
        for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            let back = codec_roundtrip(&v, order, 8);
            assert_eq!(back.as_f64().unwrap(), samples);
            assert_eq!(back.compress, VectCompression::Zlib);
        }
    }

    #[test]
    fn narrow_widths_below_version_6() {
        let v = FrVect::from_i16_samples("L1:AUX", &[1, -2, 3], 1.0);
        let back = codec_roundtrip(&v, ByteOrder::LittleEndian, 4);
        assert_eq!(back, v);
    }

    #[test]
    fn version4_encoding_is_narrower_than_version8() {
        let v = FrVect::from_i16_samples("L1:AUX", &[1, 2, 3], 1.0);
        let mut w4 = StructWriter::new(ByteOrder::LittleEndian);
        encode(&FrObject::Vect(v.clone()), &mut w4, 4, &SlotRefs::new()).unwrap();
        let mut w8 = StructWriter::new(ByteOrder::LittleEndian);
        encode(&FrObject::Vect(v.clone()), &mut w8, 8, &SlotRefs::new()).unwrap();
        // nData + nBytes shrink from 8 bytes each to 4.
        assert_eq!(w8.len() - w4.len(), 8);
    }

    #[test]
    fn complex_demotes_only_to_version_6_or_later() {
        let v = FrVect {
            name: "c".into(),
            compress: VectCompression::Raw,
            elem_type: ElementType::Complex8,
            n_data: 1,
            dims: vec![Dimension::new(1, 1.0)],
            unit_y: String::new(),
            data: vec![0u8; 8],
        };
        assert!(demote_step(FrObject::Vect(v.clone()), 6).is_ok());
        let err = demote_step(FrObject::Vect(v), 4).unwrap_err();
        assert_eq!(err.error_name(), "ERROR_domain");
    }

    #[test]
    fn unknown_compression_tag_is_unimplemented() {
        let err = VectCompression::from_u16(5, 8).unwrap_err();
        assert_eq!(err.error_name(), "ERROR_unimplemented");
    }

    #[test]
    fn corrupt_zlib_payload_is_format_error() {
        let v = FrVect::from_i32_samples("x", &[1, 2], 1.0).with_compression(VectCompression::Zlib);
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        encode(&FrObject::Vect(v.clone()), &mut w, 8, &SlotRefs::new()).unwrap();
        let mut bytes = w.into_bytes();
        // Corrupt a byte in the middle of the buffer, inside the stored
        // zlib stream.
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        // Either the zlib stream fails to parse or a string after it does;
        // in both cases the decode must not succeed silently with wrong
        // payload bytes.
        match decode(&mut r, 8) {
            Err(_) => {}
            Ok((obj, _)) => {
                let back = obj.expect_vect().unwrap();
                assert_ne!(back.as_i32().unwrap(), vec![1, 2]);
            }
        }
    }

    #[test]
    fn dim_product() {
        let v = FrVect {
            name: "m".into(),
            compress: VectCompression::Raw,
            elem_type: ElementType::UInt8,
            n_data: 12,
            dims: vec![Dimension::new(3, 1.0), Dimension::new(4, 1.0)],
            unit_y: String::new(),
            data: vec![0; 12],
        };
        assert_eq!(v.dim_product(), 12);
    }
}
