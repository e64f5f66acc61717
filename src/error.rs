//! Error types for tar reading, listing and appending.
//!
//! This module provides the [`TarError`] type, which covers every failure an
//! archive operation can report, and [`StreamError`], which is surfaced as a
//! signal on an individual entry body rather than aborting the operation.
//!
//! ## Error Categories
//!
//! | Category | Errors | Description |
//! |----------|--------|-------------|
//! | Arguments | [`InvalidArgument`] | Missing destination, empty input list |
//! | Format | [`CompressedArchive`] | Target is compressed and cannot be appended to |
//! | Stream | [`Stream`] | Body misuse, or a paused body nobody resumes |
//! | I/O | [`Io`] | Open/read/stat/close failures, passed through verbatim |
//!
//! An invalid header checksum, a short trailing block or a truncated final
//! entry are *not* errors: scanning stops at the last valid entry instead.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tar_stream::{append_sync, AppendOptions, TarError};
//!
//! match append_sync(opts) {
//!     Ok(offset) => println!("appended at {}", offset),
//!     Err(TarError::CompressedArchive) => eprintln!("cannot append to a compressed archive"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
//!
//! [`InvalidArgument`]: TarError::InvalidArgument
//! [`CompressedArchive`]: TarError::CompressedArchive
//! [`Stream`]: TarError::Stream
//! [`Io`]: TarError::Io

use std::io;

/// Error type for archive operations.
#[derive(Debug, thiserror::Error)]
pub enum TarError {
    /// An option was missing or invalid. Raised before any I/O happens.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The archive is compressed.
    ///
    /// Appending writes raw blocks at a byte offset, which is meaningless
    /// inside a compressed stream. Detected either from the options (explicit
    /// flag or file suffix) or from the gzip magic bytes at offset 0.
    #[error("cannot append to compressed archives")]
    CompressedArchive,

    /// An entry body stream was misused.
    #[error("stream protocol error: {0}")]
    Stream(#[from] StreamError),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Protocol violations on an [`EntryBodyStream`](crate::EntryBodyStream).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// `write` was called after `end`.
    #[error("write after end")]
    WriteAfterEnd,

    /// More bytes arrived than the entry header declared.
    #[error("writing more data than expected (declared size {declared})")]
    PastDeclaredEnd {
        /// Size from the merged entry metadata.
        declared: u64,
    },

    /// A listing stopped on a paused entry body and the handler left it
    /// paused when asked to consume it.
    #[error("entry body for {path:?} left paused")]
    Stalled { path: String },
}

pub type Result<T> = std::result::Result<T, TarError>;
