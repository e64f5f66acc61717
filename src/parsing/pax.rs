//! Pax extended header records.
//!
//! A pax body is a sequence of `"<len> <key>=<value>\n"` records where
//! `<len>` counts the whole record including itself. Per-entry (`x`) records
//! apply to the next entry only; global (`g`) records apply to every entry
//! that follows, and are shared through a [`GlobalContext`].

use std::collections::BTreeMap;
use std::sync::Arc;

/// Snapshot of the global pax records in effect.
///
/// A new global header never mutates the snapshot held by earlier entries; it
/// produces a new merged snapshot instead.
pub type GlobalContext = Arc<PaxRecords>;

/// Parsed pax key/value records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaxRecords {
    pub path: Option<String>,
    pub linkpath: Option<String>,
    pub size: Option<u64>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub uname: Option<String>,
    pub gname: Option<String>,
    /// Seconds since the epoch, with fractional part.
    pub mtime: Option<f64>,
    pub atime: Option<f64>,
    pub ctime: Option<f64>,
    /// Keys without a dedicated field, kept verbatim.
    pub other: BTreeMap<String, String>,
}

impl PaxRecords {
    /// Parse a pax body. Malformed trailing data is ignored.
    pub fn parse(data: &[u8]) -> Self {
        let mut records = Self::default();
        let mut rest = data;

        while !rest.is_empty() && rest[0] != 0 {
            let Some(space) = rest.iter().position(|&b| b == b' ') else {
                break;
            };
            let len = match std::str::from_utf8(&rest[..space])
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
            {
                Some(len) if len > space + 1 && len <= rest.len() => len,
                _ => break,
            };

            let record = &rest[space + 1..len];
            let record = record.strip_suffix(b"\n").unwrap_or(record);
            if let Some(eq) = record.iter().position(|&b| b == b'=') {
                let key = String::from_utf8_lossy(&record[..eq]);
                let value = String::from_utf8_lossy(&record[eq + 1..]);
                records.set(&key, &value);
            }
            rest = &rest[len..];
        }

        records
    }

    /// Apply one record. Unparseable numeric values are dropped.
    pub fn set(&mut self, key: &str, value: &str) {
        match key {
            "path" => self.path = Some(value.to_string()),
            "linkpath" => self.linkpath = Some(value.to_string()),
            "size" => self.size = value.parse().ok(),
            "uid" => self.uid = value.parse().ok(),
            "gid" => self.gid = value.parse().ok(),
            "uname" => self.uname = Some(value.to_string()),
            "gname" => self.gname = Some(value.to_string()),
            "mtime" => self.mtime = parse_time(value),
            "atime" => self.atime = parse_time(value),
            "ctime" => self.ctime = parse_time(value),
            _ => {
                self.other.insert(key.to_string(), value.to_string());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Records from `newer` override ours.
    pub fn merged(&self, newer: &PaxRecords) -> PaxRecords {
        let mut out = self.clone();
        macro_rules! take {
            ($($field:ident),*) => {
                $(if newer.$field.is_some() {
                    out.$field = newer.$field.clone();
                })*
            };
        }
        take!(path, linkpath, size, uid, gid, uname, gname, mtime, atime, ctime);
        out.other
            .extend(newer.other.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    /// Serialize to a pax body.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(v) = &self.path {
            write_record(&mut out, "path", v);
        }
        if let Some(v) = &self.linkpath {
            write_record(&mut out, "linkpath", v);
        }
        if let Some(v) = self.size {
            write_record(&mut out, "size", &v.to_string());
        }
        if let Some(v) = self.uid {
            write_record(&mut out, "uid", &v.to_string());
        }
        if let Some(v) = self.gid {
            write_record(&mut out, "gid", &v.to_string());
        }
        if let Some(v) = &self.uname {
            write_record(&mut out, "uname", v);
        }
        if let Some(v) = &self.gname {
            write_record(&mut out, "gname", v);
        }
        for (key, v) in [("mtime", self.mtime), ("atime", self.atime), ("ctime", self.ctime)] {
            if let Some(v) = v {
                write_record(&mut out, key, &format_time(v));
            }
        }
        for (key, value) in &self.other {
            write_record(&mut out, key, value);
        }
        out
    }
}

fn parse_time(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|t| t.is_finite())
}

fn format_time(t: f64) -> String {
    if t.fract() == 0.0 {
        format!("{}", t as i64)
    } else {
        let s = format!("{:.9}", t);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn digits(n: usize) -> usize {
    n.to_string().len()
}

/// The length prefix counts its own digits.
fn write_record(out: &mut Vec<u8>, key: &str, value: &str) {
    let base = key.len() + value.len() + 3;
    let mut len = base + digits(base);
    if digits(len) + base != len {
        len = base + digits(len);
    }
    out.extend_from_slice(format!("{} {}={}\n", len, key, value).as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records() {
        let records = PaxRecords::parse(b"30 mtime=1700000000.123456789\n21 path=dir/file.txt\n");
        assert_eq!(records.path.as_deref(), Some("dir/file.txt"));
        let mtime = records.mtime.unwrap();
        assert!((mtime - 1_700_000_000.123_456_789).abs() < 1e-6);
    }

    #[test]
    fn test_record_length_counts_itself() {
        let mut out = Vec::new();
        write_record(&mut out, "path", "x");
        assert_eq!(out, b"9 path=x\n");

        // crossing a digit boundary
        let mut out = Vec::new();
        write_record(&mut out, "path", &"v".repeat(92));
        let space = out.iter().position(|&b| b == b' ').unwrap();
        let declared: usize = std::str::from_utf8(&out[..space]).unwrap().parse().unwrap();
        assert_eq!(declared, out.len());
    }

    #[test]
    fn test_malformed_length_stops_parsing() {
        let records = PaxRecords::parse(b"9 path=x\n99 size=1\n");
        assert_eq!(records.path.as_deref(), Some("x"));
        assert_eq!(records.size, None);
    }

    #[test]
    fn test_nul_padding_ends_records() {
        let mut body = b"9 path=x\n".to_vec();
        body.resize(512, 0);
        let records = PaxRecords::parse(&body);
        assert_eq!(records.path.as_deref(), Some("x"));
        assert!(records.other.is_empty());
    }

    #[test]
    fn test_merged_prefers_newer() {
        let old = PaxRecords::parse(b"9 path=a\n8 uid=7\n");
        let new = PaxRecords::parse(b"9 path=b\n");
        let merged = old.merged(&new);
        assert_eq!(merged.path.as_deref(), Some("b"));
        assert_eq!(merged.uid, Some(7));
    }

    #[test]
    fn test_encode_parse_roundtrip() {
        let records = PaxRecords {
            path: Some("long/".repeat(40)),
            size: Some(123),
            mtime: Some(1.5),
            ..Default::default()
        };
        assert_eq!(PaxRecords::parse(&records.encode()), records);
        assert!(!records.is_empty());
        assert!(PaxRecords::default().is_empty());
    }
}
