//! Typeflag table and entry classification.
//!
//! The typeflag is the single byte at offset 156 of a header block. Every
//! flag this crate knows is listed in [`TypeFlag::KNOWN`]; anything else
//! decodes to [`TypeFlag::Unknown`] with the raw byte preserved, so an
//! unmapped flag stays visible instead of turning into a regular file.

/// Raw entry type, as written in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFlag {
    /// `\0` - pre-POSIX regular file
    OldFile,
    /// `0`
    File,
    /// `1` - hard link
    Link,
    /// `2`
    SymbolicLink,
    /// `3`
    CharacterDevice,
    /// `4`
    BlockDevice,
    /// `5`
    Directory,
    /// `6`
    Fifo,
    /// `7` - treated as a regular file
    ContiguousFile,
    /// `g` - pax global extended header
    GlobalExtendedHeader,
    /// `x` - pax extended header for the next entry
    ExtendedHeader,
    /// `A` - Solaris access control list
    SolarisAcl,
    /// `D` - GNU directory listing dump
    GnuDumpDir,
    /// `I` - inode metadata only
    Inode,
    /// `K` - GNU long link name for the next entry
    NextFileHasLongLinkpath,
    /// `L` - GNU long path for the next entry
    NextFileHasLongPath,
    /// `M` - GNU multi-volume continuation
    ContinuationFile,
    /// `N` - old GNU long path
    OldGnuLongPath,
    /// `S` - GNU sparse file
    SparseFile,
    /// `V` - tape volume label
    TapeVolumeHeader,
    /// `X` - Solaris extended header
    OldExtendedHeader,
    /// Any byte not listed above.
    Unknown(u8),
}

/// Canonical kind of an entry handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Link,
    SymbolicLink,
    CharacterDevice,
    BlockDevice,
    Directory,
    Fifo,
    Unknown,
}

impl TypeFlag {
    /// Every known flag. [`TypeFlag::from_byte`] is a lookup in this table.
    pub const KNOWN: [TypeFlag; 21] = [
        Self::OldFile,
        Self::File,
        Self::Link,
        Self::SymbolicLink,
        Self::CharacterDevice,
        Self::BlockDevice,
        Self::Directory,
        Self::Fifo,
        Self::ContiguousFile,
        Self::GlobalExtendedHeader,
        Self::ExtendedHeader,
        Self::SolarisAcl,
        Self::GnuDumpDir,
        Self::Inode,
        Self::NextFileHasLongLinkpath,
        Self::NextFileHasLongPath,
        Self::ContinuationFile,
        Self::OldGnuLongPath,
        Self::SparseFile,
        Self::TapeVolumeHeader,
        Self::OldExtendedHeader,
    ];

    pub fn from_byte(byte: u8) -> Self {
        Self::KNOWN
            .iter()
            .copied()
            .find(|flag| flag.as_byte() == byte)
            .unwrap_or(Self::Unknown(byte))
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::OldFile => b'\0',
            Self::File => b'0',
            Self::Link => b'1',
            Self::SymbolicLink => b'2',
            Self::CharacterDevice => b'3',
            Self::BlockDevice => b'4',
            Self::Directory => b'5',
            Self::Fifo => b'6',
            Self::ContiguousFile => b'7',
            Self::GlobalExtendedHeader => b'g',
            Self::ExtendedHeader => b'x',
            Self::SolarisAcl => b'A',
            Self::GnuDumpDir => b'D',
            Self::Inode => b'I',
            Self::NextFileHasLongLinkpath => b'K',
            Self::NextFileHasLongPath => b'L',
            Self::ContinuationFile => b'M',
            Self::OldGnuLongPath => b'N',
            Self::SparseFile => b'S',
            Self::TapeVolumeHeader => b'V',
            Self::OldExtendedHeader => b'X',
            Self::Unknown(b) => b,
        }
    }

    /// Meta entries carry metadata for the entry that follows them and are
    /// consumed by the parser.
    pub fn is_meta(self) -> bool {
        matches!(
            self,
            Self::GlobalExtendedHeader
                | Self::ExtendedHeader
                | Self::OldExtendedHeader
                | Self::NextFileHasLongPath
                | Self::NextFileHasLongLinkpath
                | Self::OldGnuLongPath
        )
    }

    pub fn is_link(self) -> bool {
        matches!(self, Self::Link | Self::SymbolicLink)
    }

    /// Map the raw flag to the kind reported to callers.
    pub fn classify(self) -> EntryKind {
        match self {
            Self::File | Self::OldFile | Self::ContiguousFile => EntryKind::File,
            Self::Directory | Self::GnuDumpDir => EntryKind::Directory,
            Self::Link => EntryKind::Link,
            Self::SymbolicLink => EntryKind::SymbolicLink,
            Self::CharacterDevice => EntryKind::CharacterDevice,
            Self::BlockDevice => EntryKind::BlockDevice,
            Self::Fifo => EntryKind::Fifo,
            Self::GlobalExtendedHeader
            | Self::ExtendedHeader
            | Self::OldExtendedHeader
            | Self::NextFileHasLongPath
            | Self::NextFileHasLongLinkpath
            | Self::OldGnuLongPath
            | Self::SolarisAcl
            | Self::Inode
            | Self::ContinuationFile
            | Self::SparseFile
            | Self::TapeVolumeHeader
            | Self::Unknown(_) => EntryKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_roundtrip() {
        for flag in TypeFlag::KNOWN {
            assert_eq!(TypeFlag::from_byte(flag.as_byte()), flag);
        }
    }

    #[test]
    fn test_unknown_byte_is_preserved() {
        assert_eq!(TypeFlag::from_byte(b'Z'), TypeFlag::Unknown(b'Z'));
        assert_eq!(TypeFlag::Unknown(b'Z').as_byte(), b'Z');
        assert_eq!(TypeFlag::from_byte(b'Z').classify(), EntryKind::Unknown);
    }

    #[test]
    fn test_classification() {
        assert_eq!(TypeFlag::OldFile.classify(), EntryKind::File);
        assert_eq!(TypeFlag::ContiguousFile.classify(), EntryKind::File);
        assert_eq!(TypeFlag::GnuDumpDir.classify(), EntryKind::Directory);
        assert_eq!(TypeFlag::SymbolicLink.classify(), EntryKind::SymbolicLink);
        assert_eq!(TypeFlag::Fifo.classify(), EntryKind::Fifo);
        assert_eq!(TypeFlag::SparseFile.classify(), EntryKind::Unknown);
    }

    #[test]
    fn test_meta_flags() {
        let meta: Vec<_> = TypeFlag::KNOWN.iter().filter(|f| f.is_meta()).collect();
        assert_eq!(meta.len(), 6);
        assert!(TypeFlag::ExtendedHeader.is_meta());
        assert!(!TypeFlag::File.is_meta());
    }
}
