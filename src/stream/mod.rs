//! The stream engine: framed byte I/O over a [`crate::buffer::FrameBuffer`].
//!
//! [`input::IFrameStream`] reads a file: header handshake, structure
//! framing, reference resolution, TOC-driven queries, and promotion of
//! decoded objects to the library's current version.
//! [`output::OFrameStream`] writes one: instance-id assignment, demotion to
//! the requested output version, TOC accumulation, and the end-of-file
//! record with the whole-file checksum.

pub mod codec;
pub mod header;
pub mod input;
pub mod output;

pub use input::IFrameStream;
pub use output::OFrameStream;

/// Bytes of a structure head: length (8) + class (2) + instance (4).
pub(crate) const STRUCT_HEAD_BYTES: u64 = 14;

/// Total on-disk size of the end-of-file structure at `version`.
pub(crate) fn end_of_file_struct_len(version: u8) -> u64 {
    let body = 4 + 8 + 8 + 4;
    let crc = if crate::spec::has_struct_checksum(version) {
        4
    } else {
        0
    };
    STRUCT_HEAD_BYTES + body + crc
}
