//! Archive format detection and timestamp conversion.
//!
//! Zero dependencies.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// What the first bytes of a file say about its format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// gzip member header (RFC 1952).
    Gzip,
    /// POSIX ustar header (`ustar\0` magic, version `00`).
    Ustar,
    /// Old GNU tar header (`ustar  \0` magic).
    GnuTar,
}

impl Signature {
    pub const GZIP: &[u8; 2] = b"\x1f\x8b";
    pub const USTAR: &[u8; 6] = b"ustar\0";
    pub const GNU: &[u8; 8] = b"ustar  \0";

    /// Byte offset of the magic field inside a header block.
    pub const MAGIC_OFFSET: usize = 257;

    /// Detect a signature at the start of `data`.
    ///
    /// The gzip check only needs two bytes; the tar checks need the magic
    /// field of a full header block.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(Self::GZIP) {
            return Some(Self::Gzip);
        }
        let magic = data.get(Self::MAGIC_OFFSET..)?;
        if magic.starts_with(Self::GNU) {
            Some(Self::GnuTar)
        } else if magic.starts_with(Self::USTAR) {
            Some(Self::Ustar)
        } else {
            None
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Gzip)
    }
}

/// File suffixes that mark a compressed archive.
const COMPRESSED_SUFFIXES: &[&str] = &[
    ".tgz", ".tar.gz", ".gz", ".tbr", ".tar.br", ".br", ".tzst", ".tar.zst", ".zst", ".txz",
    ".tar.xz", ".xz", ".tbz", ".tbz2", ".tar.bz2", ".bz2",
];

/// Returns true if the file name looks like a compressed archive.
pub fn has_compressed_suffix(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n.to_ascii_lowercase(),
        None => return false,
    };
    COMPRESSED_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Convert whole seconds since the Unix epoch to a `SystemTime`.
pub fn from_unix_secs(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

/// Convert fractional seconds (pax `mtime=1700000000.25`) to a `SystemTime`.
///
/// Returns `None` for NaN or values too large to represent.
pub fn from_unix_secs_f64(secs: f64) -> Option<SystemTime> {
    let magnitude = Duration::try_from_secs_f64(secs.abs()).ok()?;
    if secs >= 0.0 {
        UNIX_EPOCH.checked_add(magnitude)
    } else {
        UNIX_EPOCH.checked_sub(magnitude)
    }
}

/// Whole seconds since the Unix epoch, truncated toward negative infinity.
pub fn to_unix_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => {
            let d = e.duration();
            let secs = -(d.as_secs() as i64);
            if d.subsec_nanos() > 0 {
                secs - 1
            } else {
                secs
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_signature_needs_two_bytes() {
        assert_eq!(Signature::from_bytes(&[0x1f, 0x8b]), Some(Signature::Gzip));
        assert_eq!(Signature::from_bytes(&[0x1f]), None);
        assert!(Signature::Gzip.is_compressed());
    }

    #[test]
    fn test_tar_magic() {
        let mut block = [0u8; 512];
        block[257..263].copy_from_slice(b"ustar\0");
        assert_eq!(Signature::from_bytes(&block), Some(Signature::Ustar));
        block[257..265].copy_from_slice(b"ustar  \0");
        assert_eq!(Signature::from_bytes(&block), Some(Signature::GnuTar));
        assert!(!Signature::Ustar.is_compressed());
    }

    #[test]
    fn test_compressed_suffixes() {
        assert!(has_compressed_suffix(Path::new("backup.tgz")));
        assert!(has_compressed_suffix(Path::new("dir/backup.TAR.GZ")));
        assert!(has_compressed_suffix(Path::new("x.tar.zst")));
        assert!(!has_compressed_suffix(Path::new("backup.tar")));
        assert!(!has_compressed_suffix(Path::new("gz")));
    }

    #[test]
    fn test_unix_secs_roundtrip() {
        assert_eq!(to_unix_secs(from_unix_secs(1_700_000_000)), 1_700_000_000);
        assert_eq!(to_unix_secs(from_unix_secs(-5)), -5);
        let t = from_unix_secs_f64(-1.5).unwrap();
        assert_eq!(to_unix_secs(t), -2);
        assert!(from_unix_secs_f64(f64::NAN).is_none());
    }
}
