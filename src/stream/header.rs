//! The fixed file header and the byte-order handshake.
//!
//! Layout (spec'd byte for byte):
//!
//! ```text
//! "IGWD\0"                      5 bytes   magic
//! 0x1234                        2 bytes   byte-order probe, declared order
//! data-format version           1 byte
//! library minor version         1 byte
//! sizeof 2-byte int  (= 2)      1 byte
//! sizeof 4-byte int  (= 4)      1 byte
//! sizeof 8-byte int  (= 8)      1 byte
//! sizeof 4-byte float(= 4)      1 byte
//! sizeof 8-byte float(= 8)      1 byte
//! 0x1234                        2 bytes   integer order probe
//! 0x12345678                    4 bytes   integer order probe
//! 0x123456789ABCDEF0            8 bytes   integer order probe
//! π as f32                      4 bytes   float order probe
//! π as f64                      8 bytes   float order probe
//! originating library name      frame string, content ≤ 160 bytes
//! ```
//!
//! The reader determines the file's byte order by comparing the first
//! 2-byte probe against 0x1234 in each orientation; the remaining probes and
//! the declared word sizes are then validated against it.

use crate::error::{FrameError, FrameResult};
use crate::stream::codec::{ByteOrder, StructReader, StructWriter, WordSizes};

pub const MAGIC: &[u8; 5] = b"IGWD\0";
pub const SENTINEL_U16: u16 = 0x1234;
pub const SENTINEL_U32: u32 = 0x1234_5678;
pub const SENTINEL_U64: u64 = 0x1234_5678_9ABC_DEF0;

/// Upper bound on the originating-library name.
pub const MAX_LIBRARY_NAME: usize = 160;

/// Decoded file header.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub order: ByteOrder,
    pub version: u8,
    pub library_minor: u8,
    pub word_sizes: WordSizes,
    pub library_name: String,
}

impl FileHeader {
    pub fn new(version: u8, library_name: &str, order: ByteOrder) -> Self {
        FileHeader {
            order,
            version,
            library_minor: crate::LIBRARY_MINOR,
            word_sizes: WordSizes::STANDARD,
            library_name: library_name.to_string(),
        }
    }

    /// Serialize the header in its declared byte order.
    pub fn encode(&self) -> FrameResult<Vec<u8>> {
        if self.library_name.len() > MAX_LIBRARY_NAME {
            return Err(FrameError::domain(format!(
                "library name of {} bytes exceeds the {}-byte header field",
                self.library_name.len(),
                MAX_LIBRARY_NAME
            )));
        }
        let mut w = StructWriter::new(self.order);
        w.write_bytes(MAGIC);
        w.write_u16(SENTINEL_U16);
        w.write_u8(self.version);
        w.write_u8(self.library_minor);
        w.write_u8(self.word_sizes.int_2);
        w.write_u8(self.word_sizes.int_4);
        w.write_u8(self.word_sizes.int_8);
        w.write_u8(self.word_sizes.real_4);
        w.write_u8(self.word_sizes.real_8);
        w.write_u16(SENTINEL_U16);
        w.write_u32(SENTINEL_U32);
        w.write_u64(SENTINEL_U64);
        w.write_f32(std::f32::consts::PI);
        w.write_f64(std::f64::consts::PI);
        w.write_string(&self.library_name)?;
        Ok(w.into_bytes())
    }

    /// Parse the fixed-size prefix of the header from `bytes`, which must
    /// hold at least [`fixed_prefix_len`] bytes starting at file offset 0.
    /// Returns the header with `library_name` still empty plus the number of
    /// bytes consumed; the caller then reads the name string with the
    /// detected byte order.
    pub fn decode_fixed_prefix(bytes: &[u8]) -> FrameResult<(FileHeader, usize)> {
        if bytes.len() < fixed_prefix_len() {
            return Err(FrameError::format(0, "file shorter than the fixed header"));
        }
        if &bytes[..5] != MAGIC {
            return Err(FrameError::format(0, "bad magic (not an IGWD frame file)"));
        }
        // Byte-order handshake on the 2-byte probe.
        let probe = [bytes[5], bytes[6]];
        let order = if u16::from_le_bytes(probe) == SENTINEL_U16 {
            ByteOrder::LittleEndian
        } else if u16::from_be_bytes(probe) == SENTINEL_U16 {
            ByteOrder::BigEndian
        } else {
            return Err(FrameError::format(
                5,
                format!(
                    "byte-order probe {:#06x}/{:#06x} matches neither orientation",
                    u16::from_le_bytes(probe),
                    u16::from_be_bytes(probe)
                ),
            ));
        };

        let mut r = StructReader::new(&bytes[7..], order, 7);
        let version = r.read_u8()?;
        let library_minor = r.read_u8()?;
        let word_sizes = WordSizes {
            int_2: r.read_u8()?,
            int_4: r.read_u8()?,
            int_8: r.read_u8()?,
            real_4: r.read_u8()?,
            real_8: r.read_u8()?,
        };
        if !word_sizes.is_standard() {
            return Err(FrameError::format(
                9,
                format!("unsupported word sizes {:?}", word_sizes),
            ));
        }

        // Remaining probes confirm the detected order holds at every width.
        let p16 = r.read_u16()?;
        let p32 = r.read_u32()?;
        let p64 = r.read_u64()?;
        if p16 != SENTINEL_U16 || p32 != SENTINEL_U32 || p64 != SENTINEL_U64 {
            return Err(FrameError::format(
                14,
                "integer order probes disagree with the 2-byte handshake",
            ));
        }
        let f32_probe = r.read_f32()?;
        let f64_probe = r.read_f64()?;
        if f32_probe != std::f32::consts::PI || f64_probe != std::f64::consts::PI {
            return Err(FrameError::format(
                26,
                "float order probes disagree with the 2-byte handshake",
            ));
        }

        Ok((
            FileHeader {
                order,
                version,
                library_minor,
                word_sizes,
                library_name: String::new(),
            },
            fixed_prefix_len(),
        ))
    }
}

/// Bytes in the header before the variable-length library-name string.
pub const fn fixed_prefix_len() -> usize {
    5 + 2 + 1 + 1 + 5 + 2 + 4 + 8 + 4 + 8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(order: ByteOrder) {
        let header = FileHeader::new(8, "gwframe-2.9.0", order);
        let bytes = header.encode().unwrap();
        let (mut decoded, consumed) = FileHeader::decode_fixed_prefix(&bytes).unwrap();
        assert_eq!(consumed, fixed_prefix_len());
        let mut r = StructReader::new(&bytes[consumed..], decoded.order, consumed as u64);
        decoded.library_name = r.read_string().unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn roundtrip_little_endian() {
        roundtrip(ByteOrder::LittleEndian);
    }

    #[test]
    fn roundtrip_big_endian() {
        roundtrip(ByteOrder::BigEndian);
    }

    #[test]
    fn endianness_is_detected_from_probe() {
        let le = FileHeader::new(8, "x", ByteOrder::LittleEndian)
            .encode()
            .unwrap();
        let be = FileHeader::new(8, "x", ByteOrder::BigEndian).encode().unwrap();
        assert_ne!(le, be);
        assert_eq!(
            FileHeader::decode_fixed_prefix(&le).unwrap().0.order,
            ByteOrder::LittleEndian
        );
        assert_eq!(
            FileHeader::decode_fixed_prefix(&be).unwrap().0.order,
            ByteOrder::BigEndian
        );
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = FileHeader::new(8, "x", ByteOrder::LittleEndian)
            .encode()
            .unwrap();
        bytes[0] = b'X';
        assert_eq!(
            FileHeader::decode_fixed_prefix(&bytes)
                .unwrap_err()
                .error_name(),
            "ERROR_format"
        );
    }

    #[test]
    fn garbage_probe_rejected() {
        let mut bytes = FileHeader::new(8, "x", ByteOrder::LittleEndian)
            .encode()
            .unwrap();
        bytes[5] = 0xFF;
        bytes[6] = 0xFF;
        assert!(FileHeader::decode_fixed_prefix(&bytes).is_err());
    }

    #[test]
    fn nonstandard_word_size_rejected() {
        let mut bytes = FileHeader::new(8, "x", ByteOrder::LittleEndian)
            .encode()
            .unwrap();
        bytes[9] = 3; // claimed sizeof(2-byte int) = 3
        assert!(FileHeader::decode_fixed_prefix(&bytes).is_err());
    }

    #[test]
    fn oversized_library_name_refused() {
        let name = "n".repeat(MAX_LIBRARY_NAME + 1);
        let header = FileHeader::new(8, &name, ByteOrder::LittleEndian);
        assert_eq!(header.encode().unwrap_err().error_name(), "ERROR_domain");
    }
}
