//! CRC-32 checksums.
//!
//! Two checksums protect a frame file: a per-structure CRC covering the
//! structure image from its length field through the last body byte, and a
//! whole-file CRC accumulated over every byte except the checksum slot in
//! the end-of-file record.  The file CRC is fed by a [`Crc32Filter`]
//! installed on the stream, so no separate pass over the file is needed;
//! the structure CRC is computed over the structure image the engine
//! already holds.

use std::cell::RefCell;
use std::rc::Rc;

use crate::filter::StreamFilter;

/// One-shot CRC-32 of a byte slice.
#[inline]
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

// ─────────────────────────────────────────────────────────────────────────────
// File-checksum filter
// ─────────────────────────────────────────────────────────────────────────────

/// Filter name under which the whole-file CRC tap is installed.
pub const FILE_CRC_FILTER: &str = "file-crc32";

/// Streaming CRC-32 tap.  Install on a stream to accumulate a checksum over
/// every byte that crosses the buffer boundary; read the running value at
/// any time through the [`Crc32Handle`] returned at construction.
pub struct Crc32Filter {
    name: &'static str,
    state: Rc<RefCell<crc32fast::Hasher>>,
    offset: u64,
}

/// Shared view of a [`Crc32Filter`]'s accumulator.
#[derive(Clone)]
pub struct Crc32Handle {
    state: Rc<RefCell<crc32fast::Hasher>>,
}

impl Crc32Filter {
    pub fn new(name: &'static str) -> (Self, Crc32Handle) {
        let state = Rc::new(RefCell::new(crc32fast::Hasher::new()));
        (
            Crc32Filter {
                name,
                state: state.clone(),
                offset: 0,
            },
            Crc32Handle { state },
        )
    }
}

impl Crc32Handle {
    /// CRC of everything delivered so far.  Snapshot; accumulation
    /// continues.
    pub fn value(&self) -> u32 {
        self.state.borrow().clone().finalize()
    }
}

impl StreamFilter for Crc32Filter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn begin_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    fn pubfilter(&mut self, begin: u64, window: &[u8]) {
        debug_assert_eq!(begin, self.offset);
        self.state.borrow_mut().update(window);
        self.offset = begin + window.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterChain;

    #[test]
    fn oneshot_matches_known_vector() {
        // CRC-32 of "123456789" is the classic check value.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn filter_accumulates_across_windows() {
        let (filter, handle) = Crc32Filter::new(FILE_CRC_FILTER);
        let mut chain = FilterChain::new();
        chain.add(Box::new(filter), 0);
        chain.run(0, b"12345");
        chain.run(5, b"6789");
        assert_eq!(handle.value(), crc32(b"123456789"));
    }

    #[test]
    fn handle_value_is_a_snapshot() {
        let (filter, handle) = Crc32Filter::new(FILE_CRC_FILTER);
        let mut chain = FilterChain::new();
        chain.add(Box::new(filter), 0);
        chain.run(0, b"abc");
        let first = handle.value();
        chain.run(3, b"def");
        assert_ne!(first, handle.value());
        assert_eq!(handle.value(), crc32(b"abcdef"));
    }
}
