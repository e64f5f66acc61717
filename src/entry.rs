//! Canonical entry metadata.
//!
//! An entry's fields can come from three places: the header block itself,
//! the pax global records in effect, and the pax extended records (or GNU
//! long-name records) written immediately before it. [`EntryMetadata::merge`]
//! layers them so that extended beats global beats header.

use std::time::SystemTime;

use crate::formats::from_unix_secs_f64;
use crate::parsing::{EntryKind, PaxRecords, RawHeader, TypeFlag};

/// Merged description of one archive entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryMetadata {
    pub path: String,
    pub linkpath: Option<String>,
    /// Raw typeflag byte as read from the header.
    pub typeflag: TypeFlag,
    /// What the entry is, after classification.
    pub kind: EntryKind,
    pub mode: Option<u32>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub uname: Option<String>,
    pub gname: Option<String>,
    /// Declared body size; 0 when absent.
    pub size: u64,
    pub mtime: Option<SystemTime>,
    pub atime: Option<SystemTime>,
    pub ctime: Option<SystemTime>,
    pub devmajor: Option<u64>,
    pub devminor: Option<u64>,
}

impl EntryMetadata {
    /// Merge header fields with global and extended pax records.
    ///
    /// A `path` in the global records is not applied: it would rename every
    /// following entry to the same name.
    pub fn merge(
        header: &RawHeader,
        extended: Option<&PaxRecords>,
        global: Option<&PaxRecords>,
    ) -> Self {
        macro_rules! layer {
            ($base:expr, $field:ident) => {{
                let mut value = $base;
                if let Some(v) = global.and_then(|g| g.$field.clone()) {
                    value = Some(v);
                }
                if let Some(v) = extended.and_then(|x| x.$field.clone()) {
                    value = Some(v);
                }
                value
            }};
        }

        let path = extended
            .and_then(|x| x.path.clone())
            .or_else(|| header.path.clone())
            .unwrap_or_default();

        let mtime = layer!(header.mtime.map(|t| t as f64), mtime);
        let atime = layer!(header.atime.map(|t| t as f64), atime);
        let ctime = layer!(header.ctime.map(|t| t as f64), ctime);

        Self {
            path,
            linkpath: layer!(header.linkpath.clone(), linkpath),
            typeflag: header.typeflag,
            kind: header.typeflag.classify(),
            mode: header.mode,
            uid: layer!(header.uid, uid),
            gid: layer!(header.gid, gid),
            uname: layer!(header.uname.clone(), uname),
            gname: layer!(header.gname.clone(), gname),
            size: layer!(header.size, size).unwrap_or(0),
            mtime: mtime.and_then(from_unix_secs_f64),
            atime: atime.and_then(from_unix_secs_f64),
            ctime: ctime.and_then(from_unix_secs_f64),
            devmajor: header.devmajor,
            devminor: header.devminor,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// The header fields needed to write this entry back out.
    pub fn to_header(&self) -> RawHeader {
        RawHeader {
            path: Some(self.path.clone()),
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            size: Some(self.size),
            mtime: self.mtime.map(crate::formats::to_unix_secs),
            typeflag: self.typeflag,
            linkpath: self.linkpath.clone(),
            uname: self.uname.clone(),
            gname: self.gname.clone(),
            devmajor: self.devmajor,
            devminor: self.devminor,
            ..Default::default()
        }
    }

    /// Pax records carrying whatever a ustar header cannot hold exactly.
    pub fn to_pax(&self) -> PaxRecords {
        let secs = |t: SystemTime| match t.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64(),
            Err(e) => -e.duration().as_secs_f64(),
        };
        PaxRecords {
            path: Some(self.path.clone()),
            linkpath: self.linkpath.clone(),
            size: Some(self.size),
            uid: self.uid,
            gid: self.gid,
            uname: self.uname.clone(),
            gname: self.gname.clone(),
            mtime: self.mtime.map(secs),
            atime: self.atime.map(secs),
            ctime: self.ctime.map(secs),
            ..Default::default()
        }
    }
}
