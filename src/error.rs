//! Error taxonomy for frame-file I/O.
//!
//! Every failure surfaced by the crate is one of the variants below.  Errors
//! carry the byte offset at which they were detected and, where meaningful,
//! the expected vs. observed values, so a caller can locate the damage in the
//! file without re-parsing it.

use core::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type FrameResult<T> = Result<T, FrameError>;

// ─────────────────────────────────────────────────────────────────────────────
// Error kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Errors produced while reading or writing a frame file.
///
/// The variants split along recovery boundaries: `Io` and `Format` taint the
/// whole stream, `Schema`/`Checksum` taint a single structure (the stream
/// advances past it using the declared length), `Domain` is a caller-level
/// violation detected before any bytes move.
#[derive(Debug)]
pub enum FrameError {
    /// The underlying file descriptor returned failure.
    Io(io::Error),
    /// The bytes do not satisfy the on-disk contract.
    Format {
        offset: u64,
        what: String,
    },
    /// A primitive read would overrun the declared structure length.
    Overrun {
        offset: u64,
        requested: usize,
        remaining: usize,
    },
    /// The declared structure length exceeds the bytes available in the file.
    Underrun {
        offset: u64,
        declared: u64,
        available: u64,
    },
    /// A class-id was unknown at the file's declared version, or an FrSH
    /// read from the file does not match the registered description.
    Schema {
        version: u8,
        class: i16,
        offset: u64,
        what: String,
    },
    /// An outgoing reference never resolved, or a cycle was detected while
    /// ordering objects for write.
    DanglingReference {
        class: i16,
        instance: u32,
        offset: u64,
    },
    /// Structure or whole-file CRC mismatch.
    Checksum {
        offset: u64,
        expected: u32,
        observed: u32,
        scope: ChecksumScope,
    },
    /// Caller-level violation: impossible demotion, merge of incompatible
    /// payloads, backward seek on a write stream, mutating filter on a
    /// memory-mapped stream.
    Domain(String),
    /// A feature of the requested data-format version has no codec in this
    /// build.
    Unimplemented {
        version: u8,
        what: &'static str,
    },
}

/// Which checksum failed: one structure, or the whole file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumScope {
    Structure,
    File,
}

impl FrameError {
    /// Stable machine-readable name for the error kind.
    pub fn error_name(&self) -> &'static str {
        match self {
            FrameError::Io(_) => "ERROR_io",
            FrameError::Format { .. } => "ERROR_format",
            FrameError::Overrun { .. } => "ERROR_overrun",
            FrameError::Underrun { .. } => "ERROR_underrun",
            FrameError::Schema { .. } => "ERROR_schema",
            FrameError::DanglingReference { .. } => "ERROR_dangling_reference",
            FrameError::Checksum { .. } => "ERROR_checksum",
            FrameError::Domain(_) => "ERROR_domain",
            FrameError::Unimplemented { .. } => "ERROR_unimplemented",
        }
    }

    /// True when the error taints the whole stream rather than a single
    /// structure.  After a stream-level error the stream refuses further
    /// reads and writes.
    pub fn is_stream_level(&self) -> bool {
        matches!(
            self,
            FrameError::Io(_) | FrameError::Format { .. } | FrameError::Underrun { .. }
        )
    }

    pub(crate) fn format(offset: u64, what: impl Into<String>) -> Self {
        FrameError::Format {
            offset,
            what: what.into(),
        }
    }

    pub(crate) fn domain(what: impl Into<String>) -> Self {
        FrameError::Domain(what.into())
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Io(e) => write!(f, "i/o failure: {}", e),
            FrameError::Format { offset, what } => {
                write!(f, "malformed frame file at byte {}: {}", offset, what)
            }
            FrameError::Overrun {
                offset,
                requested,
                remaining,
            } => write!(
                f,
                "read of {} bytes at {} overruns structure ({} bytes remain)",
                requested, offset, remaining
            ),
            FrameError::Underrun {
                offset,
                declared,
                available,
            } => write!(
                f,
                "structure at {} declares {} bytes but only {} remain in file",
                offset, declared, available
            ),
            FrameError::Schema {
                version,
                class,
                offset,
                what,
            } => write!(
                f,
                "schema violation at byte {} (class {}, data-format version {}): {}",
                offset, class, version, what
            ),
            FrameError::DanglingReference {
                class,
                instance,
                offset,
            } => write!(
                f,
                "reference to class {} instance {} never resolved (noted at byte {})",
                class, instance, offset
            ),
            FrameError::Checksum {
                offset,
                expected,
                observed,
                scope,
            } => write!(
                f,
                "{} checksum mismatch at byte {}: expected {:#010x}, observed {:#010x}",
                match scope {
                    ChecksumScope::Structure => "structure",
                    ChecksumScope::File => "file",
                },
                offset,
                expected,
                observed
            ),
            FrameError::Domain(what) => write!(f, "{}", what),
            FrameError::Unimplemented { version, what } => write!(
                f,
                "{} is not implemented for data-format version {}",
                what, version
            ),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        FrameError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_level_split() {
        assert!(FrameError::format(0, "bad magic").is_stream_level());
        assert!(!FrameError::Checksum {
            offset: 64,
            expected: 1,
            observed: 2,
            scope: ChecksumScope::Structure,
        }
        .is_stream_level());
        assert!(!FrameError::domain("backward seek on write stream").is_stream_level());
    }

    #[test]
    fn display_carries_expected_and_observed() {
        let e = FrameError::Checksum {
            offset: 4096,
            expected: 0xDEAD_BEEF,
            observed: 0x0BAD_F00D,
            scope: ChecksumScope::File,
        };
        let msg = e.to_string();
        assert!(msg.contains("0xdeadbeef"));
        assert!(msg.contains("0x0badf00d"));
        assert!(msg.contains("4096"));
    }

    #[test]
    fn error_names_are_stable() {
        assert_eq!(
            FrameError::domain("merge of incompatible payloads").error_name(),
            "ERROR_domain"
        );
        assert_eq!(
            FrameError::Unimplemented {
                version: 5,
                what: "FrTable codec",
            }
            .error_name(),
            "ERROR_unimplemented"
        );
    }
}
