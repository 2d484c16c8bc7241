// gwframe — reader/writer for the LIGO/Virgo frame (IGWD) file format.

pub mod buffer;
pub mod checksum;
pub mod detectors;
pub mod error;
pub mod filter;
pub mod gpstime;
pub mod objects;
pub mod plan;
pub mod prefs;
pub mod spec;
pub mod stream;
pub mod toc;
pub mod verify;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level re-exports for the common entry points.
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for every operation in the crate.
pub use error::{FrameError, FrameResult};

/// Read-side stream: open a file, query it through its table of contents.
pub use stream::IFrameStream;
/// Write-side stream: create a file, write frames, close to finalize.
pub use stream::OFrameStream;

/// Per-stream configuration.
pub use prefs::{set_notification_level, ChecksumPolicy, StreamPrefs};

/// Reusable TOC bundle for opening sequences of similar files.
pub use plan::ReadPlan;

/// Payload kinds indexed by the table of contents.
pub use toc::ChannelKind;

/// The frame header and the payload classes hanging off it.
pub use objects::{
    FrAdcData, FrDetector, FrEvent, FrHistory, FrMsg, FrProcData, FrRawData, FrSerData,
    FrSimData, FrSimEvent, FrStatData, FrSummary, FrTable, FrVect, FrameH,
};
pub use objects::{Dimension, ElementType, VectCompression};

/// GPS timestamps.
pub use gpstime::GpsTime;

/// Populate the process-wide registries.  Idempotent; streams call it on
/// open, so an explicit call is only needed to front-load the work.
pub use spec::initialize;

/// Supported data-format versions.
pub use spec::{FRAME_SPEC_CURRENT, FRAME_SPEC_MAX, FRAME_SPEC_MIN, FRAME_SPEC_VERSIONS};

// ─────────────────────────────────────────────────────────────────────────────
// Library identity
// ─────────────────────────────────────────────────────────────────────────────

pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minor revision byte recorded in file headers.
pub const LIBRARY_MINOR: u8 = 9;

/// Identity string written into the file header's originator field.
pub fn library_name() -> String {
    format!("gwframe-{}", LIBRARY_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_name_fits_the_header_field() {
        let name = library_name();
        assert!(name.starts_with("gwframe-"));
        assert!(name.len() <= crate::stream::header::MAX_LIBRARY_NAME);
    }

    #[test]
    fn version_constants_are_consistent() {
        assert!(FRAME_SPEC_MIN <= FRAME_SPEC_CURRENT);
        assert!(FRAME_SPEC_CURRENT <= FRAME_SPEC_MAX);
        assert!(FRAME_SPEC_VERSIONS.contains(&FRAME_SPEC_CURRENT));
    }
}
