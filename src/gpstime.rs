//! GPS time and the leap-second table.
//!
//! Frame headers and event records stamp time as GPS seconds + nanoseconds.
//! The leap-second count (TAI−UTC) carried in frame headers and in the table
//! of contents is derived from a compiled-in table, optionally overridden by
//! a file named in the `GWFRAME_LEAPSECONDS_FILE` environment variable.
//! Each line of the override file is `<gps-second> <tai-utc>`; `#` starts a
//! comment.

use std::sync::OnceLock;

/// A GPS timestamp: whole seconds since the GPS epoch plus nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct GpsTime {
    pub seconds: u32,
    pub nanoseconds: u32,
}

impl GpsTime {
    pub fn new(seconds: u32, nanoseconds: u32) -> Self {
        GpsTime {
            seconds,
            nanoseconds,
        }
    }

    /// Time as floating seconds.  Loses sub-nanosecond precision for large
    /// second counts; intended for display and coarse arithmetic only.
    pub fn as_seconds_f64(&self) -> f64 {
        self.seconds as f64 + self.nanoseconds as f64 * 1e-9
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Leap seconds
// ─────────────────────────────────────────────────────────────────────────────

/// (first GPS second at which the offset applies, TAI−UTC in seconds).
///
/// Covers every leap second declared since the GPS epoch (1980-01-06, at
/// which TAI−UTC was already 19 s).
const BUILTIN_LEAP_TABLE: &[(u32, u16)] = &[
    (0, 19),
    (46_828_800, 20),  // 1981-07-01
    (78_364_801, 21),  // 1982-07-01
    (109_900_802, 22), // 1983-07-01
    (173_059_203, 23), // 1985-07-01
    (252_028_804, 24), // 1988-01-01
    (315_187_205, 25), // 1990-01-01
    (346_723_206, 26), // 1991-01-01
    (393_984_007, 27), // 1992-07-01
    (425_520_008, 28), // 1993-07-01
    (457_056_009, 29), // 1994-07-01
    (504_489_610, 30), // 1996-01-01
    (551_750_411, 31), // 1997-07-01
    (599_184_012, 32), // 1999-01-01
    (820_108_813, 33), // 2006-01-01
    (914_803_214, 34), // 2009-01-01
    (1_025_136_015, 35), // 2012-07-01
    (1_119_744_016, 36), // 2015-07-01
    (1_167_264_017, 37), // 2017-01-01
];

/// Environment variable naming an override leap-second table.
pub const LEAPSECONDS_FILE_ENV: &str = "GWFRAME_LEAPSECONDS_FILE";

fn leap_table() -> &'static [(u32, u16)] {
    static TABLE: OnceLock<Vec<(u32, u16)>> = OnceLock::new();
    TABLE
        .get_or_init(|| match std::env::var(LEAPSECONDS_FILE_ENV) {
            Ok(path) => parse_leap_file(&path).unwrap_or_else(|| BUILTIN_LEAP_TABLE.to_vec()),
            Err(_) => BUILTIN_LEAP_TABLE.to_vec(),
        })
        .as_slice()
}

fn parse_leap_file(path: &str) -> Option<Vec<(u32, u16)>> {
    let text = std::fs::read_to_string(path).ok()?;
    let mut table = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let gps: u32 = parts.next()?.parse().ok()?;
        let leaps: u16 = parts.next()?.parse().ok()?;
        table.push((gps, leaps));
    }
    if table.is_empty() {
        return None;
    }
    table.sort_by_key(|&(gps, _)| gps);
    Some(table)
}

/// TAI−UTC at the given GPS second.
pub fn leap_seconds_at(gps_seconds: u32) -> u16 {
    let table = leap_table();
    match table.binary_search_by_key(&gps_seconds, |&(gps, _)| gps) {
        Ok(i) => table[i].1,
        Err(0) => table[0].1,
        Err(i) => table[i - 1].1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_offset() {
        assert_eq!(leap_seconds_at(0), 19);
    }

    #[test]
    fn o1_era_offset() {
        // GPS 1126259462 (2015-09-14) falls after the 2015-07-01 leap.
        assert_eq!(leap_seconds_at(1_126_259_462), 36);
    }

    #[test]
    fn post_2017_offset() {
        assert_eq!(leap_seconds_at(1_400_000_000), 37);
    }

    #[test]
    fn boundary_is_inclusive() {
        assert_eq!(leap_seconds_at(1_167_264_017), 37);
        assert_eq!(leap_seconds_at(1_167_264_016), 36);
    }

    #[test]
    fn gps_time_ordering() {
        let a = GpsTime::new(100, 999_999_999);
        let b = GpsTime::new(101, 0);
        assert!(a < b);
        assert!((b.as_seconds_f64() - 101.0).abs() < 1e-12);
    }
}
