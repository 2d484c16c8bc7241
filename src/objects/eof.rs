//! End-of-frame and end-of-file records.

use crate::error::FrameResult;
use crate::objects::FrObject;
use crate::stream::codec::{PendingSlot, SlotRefs, StructReader, StructWriter};

// ─────────────────────────────────────────────────────────────────────────────
// FrEndOfFrame
// ─────────────────────────────────────────────────────────────────────────────

/// Marks the end of one frame's structures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrEndOfFrame {
    pub run: i32,
    pub frame: u32,
    pub gtime_s: u32,
    pub gtime_n: u32,
}

pub(crate) fn decode_end_of_frame(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    Ok((
        FrObject::EndOfFrame(FrEndOfFrame {
            run: r.read_i32()?,
            frame: r.read_u32()?,
            gtime_s: r.read_u32()?,
            gtime_n: r.read_u32()?,
        }),
        Vec::new(),
    ))
}

pub(crate) fn encode_end_of_frame(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    _refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::EndOfFrame(e) = obj else {
        unreachable!()
    };
    w.write_i32(e.run);
    w.write_u32(e.frame);
    w.write_u32(e.gtime_s);
    w.write_u32(e.gtime_n);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// FrEndOfFile
// ─────────────────────────────────────────────────────────────────────────────

/// The terminal record of a frame file: frame count, byte count, the seek
/// offset of the table of contents, and the whole-file checksum.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrEndOfFile {
    pub n_frames: u32,
    pub n_bytes: u64,
    pub seek_toc: u64,
    pub chk_sum: u32,
}

/// Offset of the checksum field within the end-of-file structure body.
/// The whole-file CRC covers everything before this field.
pub const CHKSUM_FIELD_BODY_OFFSET: u64 = 4 + 8 + 8;

pub(crate) fn decode_end_of_file(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    Ok((
        FrObject::EndOfFile(FrEndOfFile {
            n_frames: r.read_u32()?,
            n_bytes: r.read_u64()?,
            seek_toc: r.read_u64()?,
            chk_sum: r.read_u32()?,
        }),
        Vec::new(),
    ))
}

pub(crate) fn encode_end_of_file(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    _refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::EndOfFile(e) = obj else {
        unreachable!()
    };
    w.write_u32(e.n_frames);
    w.write_u64(e.n_bytes);
    w.write_u64(e.seek_toc);
    w.write_u32(e.chk_sum);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::codec::ByteOrder;

    #[test]
    fn end_of_file_roundtrip() {
        let e = FrEndOfFile {
            n_frames: 8,
            n_bytes: 123_456,
            seek_toc: 120_000,
            chk_sum: 0xCAFE_BABE,
        };
        let mut w = StructWriter::new(ByteOrder::BigEndian);
        encode_end_of_file(&FrObject::EndOfFile(e.clone()), &mut w, 8, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 24);
        let mut r = StructReader::new(&bytes, ByteOrder::BigEndian, 0);
        let (obj, _) = decode_end_of_file(&mut r, 8).unwrap();
        assert_eq!(obj.expect_end_of_file().unwrap(), e);
    }

    #[test]
    fn chksum_field_sits_after_the_other_fields() {
        assert_eq!(CHKSUM_FIELD_BODY_OFFSET, 20);
    }

    #[test]
    fn end_of_frame_roundtrip() {
        let e = FrEndOfFrame {
            run: -3,
            frame: 7,
            gtime_s: 1_000_000_000,
            gtime_n: 500,
        };
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        encode_end_of_frame(&FrObject::EndOfFrame(e.clone()), &mut w, 8, &SlotRefs::new())
            .unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let (obj, pending) = decode_end_of_frame(&mut r, 8).unwrap();
        assert!(pending.is_empty());
        match obj {
            FrObject::EndOfFrame(back) => assert_eq!(back, e),
            other => panic!("wrong variant {:?}", other),
        }
    }
}
