//! Process-wide table of interferometer channel prefixes.
//!
//! Channel names carry a site prefix (`"H1:LSC-STRAIN"`); this table maps the
//! prefix to the detector it identifies.  Populated once by
//! [`crate::initialize`] and read-only afterwards.

use std::collections::HashMap;
use std::sync::OnceLock;

/// One known detector site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorInfo {
    /// Two-character channel prefix, e.g. `"H1"`.
    pub prefix: &'static str,
    /// Human-readable site name.
    pub site: &'static str,
}

const KNOWN_DETECTORS: &[DetectorInfo] = &[
    DetectorInfo { prefix: "G1", site: "GEO 600" },
    DetectorInfo { prefix: "H1", site: "LIGO Hanford 4km" },
    DetectorInfo { prefix: "H2", site: "LIGO Hanford 2km" },
    DetectorInfo { prefix: "K1", site: "KAGRA" },
    DetectorInfo { prefix: "L1", site: "LIGO Livingston 4km" },
    DetectorInfo { prefix: "T1", site: "TAMA 300" },
    DetectorInfo { prefix: "V1", site: "Virgo" },
];

fn table() -> &'static HashMap<&'static str, DetectorInfo> {
    static TABLE: OnceLock<HashMap<&'static str, DetectorInfo>> = OnceLock::new();
    TABLE.get_or_init(|| {
        KNOWN_DETECTORS
            .iter()
            .map(|d| (d.prefix, *d))
            .collect()
    })
}

/// Force the table into existence.  Called by [`crate::initialize`].
pub(crate) fn populate() {
    let _ = table();
}

/// Look up a detector by its two-character channel prefix.
pub fn lookup(prefix: &str) -> Option<DetectorInfo> {
    table().get(prefix).copied()
}

/// Extract the site prefix of a channel name (`"H1:LSC-STRAIN"` → `"H1"`),
/// if the name carries one.
pub fn channel_prefix(channel: &str) -> Option<&str> {
    let (prefix, _) = channel.split_once(':')?;
    if prefix.len() == 2 {
        Some(prefix)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_prefixes_resolve() {
        assert_eq!(lookup("H1").unwrap().site, "LIGO Hanford 4km");
        assert_eq!(lookup("V1").unwrap().site, "Virgo");
        assert!(lookup("X9").is_none());
    }

    #[test]
    fn prefix_extraction() {
        assert_eq!(channel_prefix("H1:TEST"), Some("H1"));
        assert_eq!(channel_prefix("no-colon-here"), None);
        assert_eq!(channel_prefix("LONG:NAME"), None);
    }
}
