// prefs.rs — stream preferences and notification globals.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::spec::FRAME_SPEC_CURRENT;

// ---------------------------------------------------------------------------
// Numeric constants
// ---------------------------------------------------------------------------
pub const KB: usize = 1 << 10;
pub const MB: usize = 1 << 20;

/// Default buffered-I/O window.
pub const DEFAULT_BUFFER_SIZE: usize = MB;

// ---------------------------------------------------------------------------
// Display / notification globals
// ---------------------------------------------------------------------------

/// Global notification level.  0 = silent, 1 = errors only, 2 = results +
/// warnings, 3 = progress, 4+ = verbose.
pub static DISPLAY_LEVEL: AtomicI32 = AtomicI32::new(0);

/// Set the global notification level; returns the previous value.
pub fn set_notification_level(level: i32) -> i32 {
    DISPLAY_LEVEL.swap(level, Ordering::Relaxed)
}

/// Write `msg` to stderr if the current notification level is ≥ `level`.
#[inline]
pub fn display_level(level: i32, msg: &str) {
    if DISPLAY_LEVEL.load(Ordering::Relaxed) >= level {
        eprintln!("{}", msg);
    }
}

// ---------------------------------------------------------------------------
// Checksum policy
// ---------------------------------------------------------------------------

/// What to do when a structure or file checksum does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Mismatch is an error (default).
    #[default]
    Enforce,
    /// Mismatch is reported on stderr (level 2) and counted, but the read
    /// proceeds.
    Warn,
    /// Checksums are not computed on read.
    Ignore,
}

// ---------------------------------------------------------------------------
// Stream preferences
// ---------------------------------------------------------------------------

/// Per-stream configuration, passed at open time.
///
/// A value type: copy it, tweak fields, hand it to the stream constructor.
/// Process-wide behaviour (notification level) lives in globals above, not
/// here.
#[derive(Debug, Clone)]
pub struct StreamPrefs {
    /// Buffered-I/O window size in bytes; rounded up to the system page
    /// size with a floor of 4096.
    pub buffer_size: usize,
    /// Request memory-mapped input.  A hint: declined for write streams and
    /// non-regular files, in which case buffered I/O is used.
    pub memory_mapped_io: bool,
    /// Checksum verification policy for reads.
    pub checksum_policy: ChecksumPolicy,
    /// When `true`, structures whose class-id is not in the registry for the
    /// file's version are skipped (using the declared length) instead of
    /// failing the read.  Each skip increments the stream's warning counter.
    pub permissive_schema: bool,
    /// Data-format version emitted by write streams.  Objects held at the
    /// library's current version are demoted to this on write.
    pub output_version: u8,
    /// Byte order emitted by write streams.  `None` (the default) uses the
    /// host's natural order; set it to force a foreign-order file.
    pub output_order: Option<crate::stream::codec::ByteOrder>,
}

impl Default for StreamPrefs {
    fn default() -> Self {
        StreamPrefs {
            buffer_size: DEFAULT_BUFFER_SIZE,
            memory_mapped_io: false,
            checksum_policy: ChecksumPolicy::default(),
            permissive_schema: false,
            output_version: FRAME_SPEC_CURRENT,
            output_order: None,
        }
    }
}

impl StreamPrefs {
    /// Buffer size after page rounding (≥ 4096).
    pub fn effective_buffer_size(&self) -> usize {
        let page = page_size();
        let floor = self.buffer_size.max(4096);
        floor.div_ceil(page) * page
    }
}

/// System page size, with a conservative fallback.
pub(crate) fn page_size() -> usize {
    // The frame buffer only needs a plausible granularity; 4 KiB covers
    // every platform this crate targets.
    4096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prefs() {
        let p = StreamPrefs::default();
        assert_eq!(p.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(!p.memory_mapped_io);
        assert_eq!(p.checksum_policy, ChecksumPolicy::Enforce);
        assert!(!p.permissive_schema);
        assert_eq!(p.output_version, FRAME_SPEC_CURRENT);
    }

    #[test]
    fn buffer_size_page_rounding() {
        let mut p = StreamPrefs::default();
        p.buffer_size = 1;
        assert_eq!(p.effective_buffer_size(), 4096);
        p.buffer_size = 4097;
        assert_eq!(p.effective_buffer_size(), 8192);
    }

    #[test]
    fn notification_level_roundtrip() {
        let prev = set_notification_level(3);
        assert_eq!(set_notification_level(prev), 3);
    }
}
