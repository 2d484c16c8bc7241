//! Primitive codecs: byte order, word sizes, bounded structure readers and
//! writers, and on-disk reference slots.
//!
//! Every integer and float inside a frame file uses the byte order and word
//! sizes declared in the file header.  The reader and writer below are the
//! only places in the crate that touch raw multi-byte encodings; everything
//! above them speaks `u32`/`f64`/`String`.

use crate::error::{FrameError, FrameResult};

// ─────────────────────────────────────────────────────────────────────────────
// Byte order
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// The byte order of the host this library was compiled for.
    pub fn host() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Word sizes
// ─────────────────────────────────────────────────────────────────────────────

/// Integer and float word sizes declared in a file header.
///
/// The format admits only the standard widths; anything else is rejected at
/// the header handshake.  The struct is kept (rather than assumed) so the
/// declared values remain inspectable by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordSizes {
    pub int_2: u8,
    pub int_4: u8,
    pub int_8: u8,
    pub real_4: u8,
    pub real_8: u8,
}

impl WordSizes {
    pub const STANDARD: WordSizes = WordSizes {
        int_2: 2,
        int_4: 4,
        int_8: 8,
        real_4: 4,
        real_8: 8,
    };

    pub fn is_standard(&self) -> bool {
        *self == Self::STANDARD
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// On-disk references
// ─────────────────────────────────────────────────────────────────────────────

/// On-disk reference: a (class-id, instance-id) pair.  All-zero is the
/// designated null reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawRef {
    pub class: i16,
    pub instance: u32,
}

impl RawRef {
    pub const NULL: RawRef = RawRef {
        class: 0,
        instance: 0,
    };

    pub fn new(class: i16, instance: u32) -> Self {
        RawRef { class, instance }
    }

    pub fn is_null(&self) -> bool {
        self.class == 0 && self.instance == 0
    }
}

/// An unresolved outgoing reference recorded during decode: which slot of
/// the holder it fills, and the target it awaits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSlot {
    pub slot: u8,
    pub target: RawRef,
}

/// Slot number reserved for the trailing "next structure of the same class"
/// reference every chainable structure carries.
pub const SLOT_NEXT: u8 = 255;

/// Reference values for each slot of one object, prepared by the writer
/// before encoding.  Slots not present encode as the null reference.
#[derive(Debug, Default, Clone)]
pub struct SlotRefs {
    refs: Vec<(u8, RawRef)>,
}

impl SlotRefs {
    pub fn new() -> Self {
        SlotRefs::default()
    }

    pub fn set(&mut self, slot: u8, target: RawRef) {
        self.refs.push((slot, target));
    }

    pub fn get(&self, slot: u8) -> RawRef {
        self.refs
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, r)| *r)
            .unwrap_or(RawRef::NULL)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bounded structure reader
// ─────────────────────────────────────────────────────────────────────────────

/// Reads primitives out of one structure's body.
///
/// Valid only until the stream advances to the next structure.  Tracks the
/// remaining byte count so a read that would cross the declared structure
/// length fails with an Overrun error instead of bleeding into the next
/// structure.
pub struct StructReader<'a> {
    buf: &'a [u8],
    pos: usize,
    order: ByteOrder,
    /// Absolute file offset of `buf[0]`, for error reporting.
    base_offset: u64,
    /// Total size of the containing file, when the caller knows it.  The
    /// TOC codec uses it to record positions-array locations relative to
    /// end-of-file.
    file_size: Option<u64>,
}

macro_rules! read_prim {
    ($name:ident, $ty:ty, $n:expr) => {
        pub fn $name(&mut self) -> FrameResult<$ty> {
            let bytes: [u8; $n] = self.take($n)?.try_into().unwrap();
            Ok(match self.order {
                ByteOrder::LittleEndian => <$ty>::from_le_bytes(bytes),
                ByteOrder::BigEndian => <$ty>::from_be_bytes(bytes),
            })
        }
    };
}

impl<'a> StructReader<'a> {
    pub fn new(buf: &'a [u8], order: ByteOrder, base_offset: u64) -> Self {
        StructReader {
            buf,
            pos: 0,
            order,
            base_offset,
            file_size: None,
        }
    }

    pub fn with_file_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Absolute file offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.base_offset + self.pos as u64
    }

    fn take(&mut self, n: usize) -> FrameResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(FrameError::Overrun {
                offset: self.offset(),
                requested: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> FrameResult<u8> {
        Ok(self.take(1)?[0])
    }

    read_prim!(read_u16, u16, 2);
    read_prim!(read_u32, u32, 4);
    read_prim!(read_u64, u64, 8);
    read_prim!(read_i16, i16, 2);
    read_prim!(read_i32, i32, 4);
    read_prim!(read_f32, f32, 4);
    read_prim!(read_f64, f64, 8);

    pub fn read_bytes(&mut self, n: usize) -> FrameResult<&'a [u8]> {
        self.take(n)
    }

    /// A frame string: `u16` content length, content bytes, trailing NUL.
    pub fn read_string(&mut self) -> FrameResult<String> {
        let start = self.offset();
        let n = self.read_u16()? as usize;
        let content = self.take(n)?.to_vec();
        let nul = self.read_u8()?;
        if nul != 0 {
            return Err(FrameError::format(
                start,
                "frame string missing trailing NUL",
            ));
        }
        String::from_utf8(content)
            .map_err(|_| FrameError::format(start, "frame string is not valid UTF-8"))
    }

    /// A reference slot: `i16` class + `u32` instance; all-zero is null.
    pub fn read_ref(&mut self) -> FrameResult<RawRef> {
        let class = self.read_i16()?;
        let instance = self.read_u32()?;
        Ok(RawRef { class, instance })
    }

    /// Read a reference slot, recording it in `pending` unless null.
    pub fn read_ref_into(&mut self, slot: u8, pending: &mut Vec<PendingSlot>) -> FrameResult<()> {
        let r = self.read_ref()?;
        if !r.is_null() {
            pending.push(PendingSlot { slot, target: r });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Structure writer
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates one structure's body in the stream's byte order.
pub struct StructWriter {
    buf: Vec<u8>,
    order: ByteOrder,
}

macro_rules! write_prim {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self, value: $ty) {
            match self.order {
                ByteOrder::LittleEndian => self.buf.extend_from_slice(&value.to_le_bytes()),
                ByteOrder::BigEndian => self.buf.extend_from_slice(&value.to_be_bytes()),
            }
        }
    };
}

impl StructWriter {
    pub fn new(order: ByteOrder) -> Self {
        StructWriter {
            buf: Vec::new(),
            order,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    write_prim!(write_u16, u16);
    write_prim!(write_u32, u32);
    write_prim!(write_u64, u64);
    write_prim!(write_i16, i16);
    write_prim!(write_i32, i32);
    write_prim!(write_f32, f32);
    write_prim!(write_f64, f64);

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// A frame string.  Content longer than `u16::MAX` is a Domain error.
    pub fn write_string(&mut self, s: &str) -> FrameResult<()> {
        if s.len() > u16::MAX as usize {
            return Err(FrameError::domain(format!(
                "string of {} bytes exceeds the on-disk limit",
                s.len()
            )));
        }
        self.write_u16(s.len() as u16);
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    pub fn write_ref(&mut self, r: RawRef) {
        self.write_i16(r.class);
        self.write_u32(r.instance);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// On-disk size of a frame string.
pub fn string_bytes(s: &str) -> u64 {
    2 + s.len() as u64 + 1
}

/// On-disk size of a reference slot.
pub const REF_BYTES: u64 = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_roundtrip_both_orders() {
        for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            let mut w = StructWriter::new(order);
            w.write_u16(0x1234);
            w.write_u32(0xDEAD_BEEF);
            w.write_u64(0x0102_0304_0506_0708);
            w.write_i16(-2);
            w.write_i32(-70_000);
            w.write_f32(2.5);
            w.write_f64(-1.0 / 3.0);
            let bytes = w.into_bytes();
            let mut r = StructReader::new(&bytes, order, 0);
            assert_eq!(r.read_u16().unwrap(), 0x1234);
            assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
            assert_eq!(r.read_u64().unwrap(), 0x0102_0304_0506_0708);
            assert_eq!(r.read_i16().unwrap(), -2);
            assert_eq!(r.read_i32().unwrap(), -70_000);
            assert_eq!(r.read_f32().unwrap(), 2.5);
            assert_eq!(r.read_f64().unwrap(), -1.0 / 3.0);
            assert_eq!(r.remaining(), 0);
        }
    }

    #[test]
    fn byte_order_actually_differs() {
        let mut le = StructWriter::new(ByteOrder::LittleEndian);
        le.write_u16(0x1234);
        let mut be = StructWriter::new(ByteOrder::BigEndian);
        be.write_u16(0x1234);
        assert_eq!(le.as_bytes(), &[0x34, 0x12]);
        assert_eq!(be.as_bytes(), &[0x12, 0x34]);
    }

    #[test]
    fn string_layout() {
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        w.write_string("Hi").unwrap();
        // length(2) + content + NUL
        assert_eq!(w.as_bytes(), &[0x02, 0x00, b'H', b'i', 0x00]);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len() as u64, string_bytes("Hi"));
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        assert_eq!(r.read_string().unwrap(), "Hi");
    }

    #[test]
    fn string_missing_nul_is_format_error() {
        let bytes = [0x01, 0x00, b'x', 0x07];
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        assert_eq!(r.read_string().unwrap_err().error_name(), "ERROR_format");
    }

    #[test]
    fn overrun_is_reported_with_counts() {
        let bytes = [0u8; 3];
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 100);
        match r.read_u32().unwrap_err() {
            FrameError::Overrun {
                offset,
                requested,
                remaining,
            } => {
                assert_eq!(offset, 100);
                assert_eq!(requested, 4);
                assert_eq!(remaining, 3);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn null_ref_is_all_zero() {
        let mut w = StructWriter::new(ByteOrder::BigEndian);
        w.write_ref(RawRef::NULL);
        assert_eq!(w.as_bytes(), &[0, 0, 0, 0, 0, 0]);
        assert_eq!(w.as_bytes().len() as u64, REF_BYTES);
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::BigEndian, 0);
        assert!(r.read_ref().unwrap().is_null());
    }

    #[test]
    fn pending_slots_skip_null_refs() {
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        w.write_ref(RawRef::new(20, 7));
        w.write_ref(RawRef::NULL);
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let mut pending = Vec::new();
        r.read_ref_into(0, &mut pending).unwrap();
        r.read_ref_into(1, &mut pending).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].slot, 0);
        assert_eq!(pending[0].target, RawRef::new(20, 7));
    }
}
