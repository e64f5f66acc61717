//! Tar header parsing modules.

pub mod header;
pub mod pax;
pub mod typeflag;

pub use header::{block_align, checksum_of, EncodedHeader, RawHeader, BLOCK_SIZE};
pub use pax::{GlobalContext, PaxRecords};
pub use typeflag::{EntryKind, TypeFlag};
