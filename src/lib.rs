//! Streaming tar reading, listing and append-in-place.
//!
//! Archives are processed block by block; nothing holds a whole archive in
//! memory. Entries are parsed from any byte stream with [`Parser`], listed
//! with [`list_sync`] / [`list`], and new entries are appended to an
//! existing archive with [`append_sync`] / [`append`] without rewriting the
//! part that is already there.
//!
//! Supports POSIX ustar and old GNU headers, pax extended and global
//! headers, and GNU long names. Compressed archives are detected and
//! rejected for appending.
//!
//! ## Features
//! - `async` (default) - tokio-based listing, scanning and appending

pub mod append;
pub mod append_locator;
pub mod body_stream;
pub mod entry;
pub mod error;
mod file_media;
pub mod formats;
pub mod list;
pub mod pack;
pub mod parser;
pub mod parsing;
pub mod path_filter;

pub use append::{append_sync, update_sync, AppendOptions};
pub use append_locator::{locate_sync, AppendLocator, MtimeCache, ScanStep};
pub use body_stream::{BodySignal, EntryBodyStream, StreamState};
pub use entry::EntryMetadata;
pub use error::{Result, StreamError, TarError};
pub use file_media::LocalFileMedia;
pub use list::{list_reader_sync, list_sync, list_with_sync, ListOptions};
pub use pack::{ArchiveWriter, TarWriter};
pub use parser::{EntryHandler, Parser, ParserOptions, ReadEntry};
pub use parsing::{EntryKind, RawHeader, TypeFlag};
pub use path_filter::PathFilter;

#[cfg(feature = "async")]
pub use append::{append, update};
#[cfg(feature = "async")]
pub use append_locator::locate_async;
#[cfg(feature = "async")]
pub use file_media::{AsyncFileMedia, FileMedia};
#[cfg(feature = "async")]
pub use list::{list, list_with};
