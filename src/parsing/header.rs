//! Header block codec.
//!
//! Every entry in a tar archive starts with a 512-byte header block in the
//! POSIX ustar (or older GNU) layout. Decoding never fails: a block whose
//! checksum does not match is returned with `cksum_valid == false`, and
//! callers decide what that means for them.

use super::typeflag::TypeFlag;
use crate::formats::Signature;

/// Size of every header and body block.
pub const BLOCK_SIZE: usize = 512;

const NAME: (usize, usize) = (0, 100);
const MODE: (usize, usize) = (100, 8);
const UID: (usize, usize) = (108, 8);
const GID: (usize, usize) = (116, 8);
const SIZE: (usize, usize) = (124, 12);
const MTIME: (usize, usize) = (136, 12);
const CKSUM: (usize, usize) = (148, 8);
const TYPEFLAG: usize = 156;
const LINKNAME: (usize, usize) = (157, 100);
const MAGIC: (usize, usize) = (257, 6);
const VERSION: (usize, usize) = (263, 2);
const UNAME: (usize, usize) = (265, 32);
const GNAME: (usize, usize) = (297, 32);
const DEVMAJOR: (usize, usize) = (329, 8);
const DEVMINOR: (usize, usize) = (337, 8);
const PREFIX: (usize, usize) = (345, 155);
// old GNU headers keep access and change times where ustar has the prefix
const ATIME: (usize, usize) = (345, 12);
const CTIME: (usize, usize) = (357, 12);

/// Round `size` up to a whole number of blocks.
pub fn block_align(size: u64) -> u64 {
    size.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}

/// Sum of all bytes in the block, counting the checksum field as spaces.
pub fn checksum_of(block: &[u8; BLOCK_SIZE]) -> u64 {
    let (off, len) = CKSUM;
    let head: u64 = block[..off].iter().map(|&b| b as u64).sum();
    let tail: u64 = block[off + len..].iter().map(|&b| b as u64).sum();
    head + tail + (len as u64) * 0x20
}

/// Decoded fields of one header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    /// `prefix/name` for ustar headers with a prefix, otherwise `name`.
    pub path: Option<String>,
    pub mode: Option<u32>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub size: Option<u64>,
    /// Seconds since the Unix epoch.
    pub mtime: Option<i64>,
    pub cksum: Option<u64>,
    pub typeflag: TypeFlag,
    pub linkpath: Option<String>,
    pub uname: Option<String>,
    pub gname: Option<String>,
    pub devmajor: Option<u64>,
    pub devminor: Option<u64>,
    /// Seconds since the Unix epoch. Only old GNU headers carry these;
    /// [`encode`](RawHeader::encode) leaves them to pax records.
    pub atime: Option<i64>,
    pub ctime: Option<i64>,
    /// Checksum field matches [`checksum_of`].
    pub cksum_valid: bool,
    /// Every byte of the block is zero.
    pub null_block: bool,
}

impl Default for RawHeader {
    fn default() -> Self {
        Self {
            path: None,
            mode: None,
            uid: None,
            gid: None,
            size: None,
            mtime: None,
            cksum: None,
            typeflag: TypeFlag::File,
            linkpath: None,
            uname: None,
            gname: None,
            devmajor: None,
            devminor: None,
            atime: None,
            ctime: None,
            cksum_valid: false,
            null_block: false,
        }
    }
}

/// Result of [`RawHeader::encode`].
#[derive(Debug, Clone)]
pub struct EncodedHeader {
    pub block: [u8; BLOCK_SIZE],
    /// A string field did not fit; a pax extended header must carry it.
    pub needs_pax: bool,
}

impl RawHeader {
    /// Decode a header block.
    pub fn decode(block: &[u8; BLOCK_SIZE]) -> Self {
        let cksum = parse_unsigned(field(block, CKSUM));
        let sum = checksum_of(block);
        let signature = Signature::from_bytes(block);
        let posix = signature == Some(Signature::Ustar) && field(block, VERSION) == b"00";
        let has_owner_names = matches!(signature, Some(Signature::Ustar | Signature::GnuTar));

        let name = parse_string(field(block, NAME));
        let path = if posix {
            match (parse_string(field(block, PREFIX)), name) {
                (Some(prefix), Some(name)) => Some(format!("{}/{}", prefix, name)),
                (Some(prefix), None) => Some(prefix),
                (None, name) => name,
            }
        } else {
            name
        };

        let (uname, gname) = if has_owner_names {
            (parse_string(field(block, UNAME)), parse_string(field(block, GNAME)))
        } else {
            (None, None)
        };
        let (devmajor, devminor) = if posix {
            (parse_unsigned(field(block, DEVMAJOR)), parse_unsigned(field(block, DEVMINOR)))
        } else {
            (None, None)
        };
        let (atime, ctime) = if signature == Some(Signature::GnuTar) {
            (parse_numeric(field(block, ATIME)), parse_numeric(field(block, CTIME)))
        } else {
            (None, None)
        };

        Self {
            path,
            mode: parse_unsigned(field(block, MODE)).and_then(|v| u32::try_from(v).ok()),
            uid: parse_unsigned(field(block, UID)),
            gid: parse_unsigned(field(block, GID)),
            size: parse_unsigned(field(block, SIZE)),
            mtime: parse_numeric(field(block, MTIME)),
            cksum,
            typeflag: TypeFlag::from_byte(block[TYPEFLAG]),
            linkpath: parse_string(field(block, LINKNAME)),
            uname,
            gname,
            devmajor,
            devminor,
            atime,
            ctime,
            cksum_valid: cksum == Some(sum),
            null_block: cksum.is_none() && sum == (CKSUM.1 as u64) * 0x20,
        }
    }

    /// Encode as a ustar header block with a valid checksum.
    ///
    /// Numbers too large for their octal field use the base-256 extension.
    /// Strings that do not fit are truncated and `needs_pax` is set.
    pub fn encode(&self) -> EncodedHeader {
        let mut block = [0u8; BLOCK_SIZE];
        let mut needs_pax = false;

        let path = self.path.as_deref().unwrap_or("");
        match split_ustar_path(path) {
            Some((prefix, name)) => {
                write_string(&mut block, PREFIX, prefix);
                write_string(&mut block, NAME, name);
            }
            None => {
                needs_pax = true;
                write_string(&mut block, NAME, path);
            }
        }

        if let Some(mode) = self.mode {
            write_numeric(&mut block, MODE, mode as i64);
        }
        if let Some(uid) = self.uid {
            write_numeric(&mut block, UID, uid as i64);
        }
        if let Some(gid) = self.gid {
            write_numeric(&mut block, GID, gid as i64);
        }
        write_numeric(&mut block, SIZE, self.size.unwrap_or(0) as i64);
        write_numeric(&mut block, MTIME, self.mtime.unwrap_or(0));
        block[TYPEFLAG] = self.typeflag.as_byte();

        if let Some(link) = &self.linkpath {
            needs_pax |= !write_string(&mut block, LINKNAME, link);
        }
        block[MAGIC.0..MAGIC.0 + MAGIC.1].copy_from_slice(Signature::USTAR);
        block[VERSION.0..VERSION.0 + VERSION.1].copy_from_slice(b"00");
        if let Some(uname) = &self.uname {
            needs_pax |= !write_string(&mut block, UNAME, uname);
        }
        if let Some(gname) = &self.gname {
            needs_pax |= !write_string(&mut block, GNAME, gname);
        }
        if let Some(major) = self.devmajor {
            write_numeric(&mut block, DEVMAJOR, major as i64);
        }
        if let Some(minor) = self.devminor {
            write_numeric(&mut block, DEVMINOR, minor as i64);
        }

        write_checksum(&mut block);
        EncodedHeader { block, needs_pax }
    }
}

/// Six octal digits, NUL, space.
fn write_checksum(block: &mut [u8; BLOCK_SIZE]) {
    let (off, len) = CKSUM;
    block[off..off + len].fill(b' ');
    let sum = checksum_of(block);
    block[off..off + len].copy_from_slice(format!("{:06o}\0 ", sum).as_bytes());
}

fn field(block: &[u8; BLOCK_SIZE], (off, len): (usize, usize)) -> &[u8] {
    &block[off..off + len]
}

/// NUL-terminated string field; `None` when empty.
fn parse_string(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    if end == 0 {
        None
    } else {
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

fn parse_unsigned(bytes: &[u8]) -> Option<u64> {
    parse_numeric(bytes).and_then(|v| u64::try_from(v).ok())
}

/// Numeric field: octal ASCII or GNU base-256.
///
/// Octal values may be terminated by NUL or space and padded with leading
/// spaces. Returns `None` for empty or malformed fields.
pub fn parse_numeric(bytes: &[u8]) -> Option<i64> {
    let first = *bytes.first()?;
    if first & 0x80 != 0 {
        return parse_base256(bytes);
    }
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = std::str::from_utf8(&bytes[..end]).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    i64::from_str_radix(text, 8).ok()
}

/// Base-256: `0x80` marks a positive big-endian value in the remaining
/// bits, `0xff` a negative two's-complement value over the whole field.
fn parse_base256(bytes: &[u8]) -> Option<i64> {
    if bytes.len() > 12 {
        return None;
    }
    let bits = bytes.len() * 8;
    let raw = bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128);
    let value = if bytes[0] == 0xff {
        raw as i128 - (1i128 << bits)
    } else {
        (raw & !(0x80u128 << (bits - 8))) as i128
    };
    i64::try_from(value).ok()
}

/// Write `value` as zero-padded octal followed by NUL, or base-256 when it
/// does not fit in `len - 1` octal digits.
fn write_numeric(block: &mut [u8; BLOCK_SIZE], (off, len): (usize, usize), value: i64) {
    let dst = &mut block[off..off + len];
    let octal = format!("{:o}", value);
    if value >= 0 && octal.len() < len {
        let padded = format!("{:0>width$}\0", octal, width = len - 1);
        dst.copy_from_slice(padded.as_bytes());
        return;
    }
    let bytes = (value as i128).to_be_bytes();
    dst.copy_from_slice(&bytes[bytes.len() - len..]);
    if value >= 0 {
        dst[0] |= 0x80;
    }
}

/// Returns false when the string had to be truncated.
fn write_string(block: &mut [u8; BLOCK_SIZE], (off, len): (usize, usize), value: &str) -> bool {
    let bytes = value.as_bytes();
    let n = bytes.len().min(len);
    block[off..off + n].copy_from_slice(&bytes[..n]);
    bytes.len() <= len
}

/// Split a path into ustar `(prefix, name)`, or `None` if it cannot fit.
fn split_ustar_path(path: &str) -> Option<(&str, &str)> {
    if path.len() <= NAME.1 {
        return Some(("", path));
    }
    // split at a '/' leaving name <= 100 and prefix <= 155
    path.match_indices('/')
        .map(|(i, _)| i)
        .filter(|&i| i > 0 && i <= PREFIX.1 && path.len() - i - 1 <= NAME.1)
        .map(|i| (&path[..i], &path[i + 1..]))
        .find(|(_, name)| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_header(path: &str, size: u64) -> RawHeader {
        RawHeader {
            path: Some(path.to_string()),
            mode: Some(0o644),
            uid: Some(1000),
            gid: Some(1000),
            size: Some(size),
            mtime: Some(1_700_000_000),
            uname: Some("user".to_string()),
            gname: Some("staff".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_encode_decode_checksum_valid() {
        let encoded = file_header("dir/file.txt", 1234).encode();
        assert!(!encoded.needs_pax);
        let header = RawHeader::decode(&encoded.block);
        assert!(header.cksum_valid);
        assert!(!header.null_block);
        assert_eq!(header.path.as_deref(), Some("dir/file.txt"));
        assert_eq!(header.size, Some(1234));
        assert_eq!(header.mtime, Some(1_700_000_000));
        assert_eq!(header.mode, Some(0o644));
        assert_eq!(header.uname.as_deref(), Some("user"));
        assert_eq!(header.typeflag, TypeFlag::File);
    }

    #[test]
    fn test_single_byte_flip_invalidates_checksum() {
        let block = file_header("a.txt", 3).encode().block;
        for i in (0..BLOCK_SIZE).filter(|i| !(148..156).contains(i)) {
            let mut corrupt = block;
            corrupt[i] ^= 0x01;
            assert!(!RawHeader::decode(&corrupt).cksum_valid, "byte {} flip undetected", i);
        }
    }

    #[test]
    fn test_checksum_field_format() {
        let block = file_header("a.txt", 3).encode().block;
        assert_eq!(block[154], 0);
        assert_eq!(block[155], b' ');
        let digits = std::str::from_utf8(&block[148..154]).unwrap();
        assert_eq!(u64::from_str_radix(digits, 8).unwrap(), checksum_of(&block));
    }

    #[test]
    fn test_null_block() {
        let header = RawHeader::decode(&[0u8; BLOCK_SIZE]);
        assert!(header.null_block);
        assert!(!header.cksum_valid);
        assert_eq!(header.path, None);
    }

    #[test]
    fn test_old_gnu_times() {
        let mut block = file_header("gnu.txt", 0).encode().block;
        block[MAGIC.0..MAGIC.0 + Signature::GNU.len()].copy_from_slice(Signature::GNU);
        write_numeric(&mut block, ATIME, 1_600_000_000);
        write_numeric(&mut block, CTIME, 1_650_000_000);
        write_checksum(&mut block);

        let header = RawHeader::decode(&block);
        assert!(header.cksum_valid);
        assert_eq!(header.path.as_deref(), Some("gnu.txt"));
        assert_eq!(header.atime, Some(1_600_000_000));
        assert_eq!(header.ctime, Some(1_650_000_000));

        // the same bytes are the path prefix in a ustar header
        let ustar = RawHeader::decode(&file_header("u.txt", 0).encode().block);
        assert_eq!((ustar.atime, ustar.ctime), (None, None));
    }

    #[test]
    fn test_octal_terminators() {
        assert_eq!(parse_numeric(b"0000644\0"), Some(0o644));
        assert_eq!(parse_numeric(b"0000644 "), Some(0o644));
        assert_eq!(parse_numeric(b"   644 \0"), Some(0o644));
        assert_eq!(parse_numeric(b"00000000017\0"), Some(15));
        assert_eq!(parse_numeric(b"\0\0\0\0"), None);
        assert_eq!(parse_numeric(b"xyz\0"), None);
    }

    #[test]
    fn test_base256() {
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[8..].copy_from_slice(&u32::MAX.to_be_bytes());
        assert_eq!(parse_numeric(&field), Some(0xffff_ffff));

        let negative = [0xffu8; 12];
        assert_eq!(parse_numeric(&negative), Some(-1));
    }

    #[test]
    fn test_large_size_uses_base256() {
        let big = 0o77777777777u64 + 1;
        let encoded = file_header("big.bin", big).encode();
        assert_eq!(encoded.block[124] & 0x80, 0x80);
        let header = RawHeader::decode(&encoded.block);
        assert!(header.cksum_valid);
        assert_eq!(header.size, Some(big));
    }

    #[test]
    fn test_negative_mtime_roundtrip() {
        let mut h = file_header("old.txt", 0);
        h.mtime = Some(-86_400);
        let header = RawHeader::decode(&h.encode().block);
        assert_eq!(header.mtime, Some(-86_400));
    }

    #[test]
    fn test_long_path_uses_prefix() {
        let dir = "d".repeat(120);
        let path = format!("{}/file.txt", dir);
        let encoded = file_header(&path, 0).encode();
        assert!(!encoded.needs_pax);
        let header = RawHeader::decode(&encoded.block);
        assert_eq!(header.path.as_deref(), Some(path.as_str()));
    }

    #[test]
    fn test_unsplittable_path_needs_pax() {
        let path = "x".repeat(200);
        assert!(file_header(&path, 0).encode().needs_pax);
    }

    #[test]
    fn test_block_align() {
        assert_eq!(block_align(0), 0);
        assert_eq!(block_align(1), 512);
        assert_eq!(block_align(512), 512);
        assert_eq!(block_align(513), 1024);
    }
}
