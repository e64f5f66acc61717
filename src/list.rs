//! Listing archive contents.
//!
//! The list functions read an archive in chunks of at most
//! [`ListOptions::max_read_size`] bytes and feed them to a [`Parser`]. The
//! plain forms collect the metadata of every entry; the `_with` forms drive
//! a caller-supplied [`EntryHandler`] and hand it back when done.
//!
//! Reading stops whenever the parser reports a paused entry body; the
//! handler's [`stalled`](EntryHandler::stalled) hook is asked to consume it
//! before the next read.

use std::io::Read;
use std::path::PathBuf;

use crate::entry::EntryMetadata;
use crate::error::{Result, TarError};
use crate::file_media::read_exactish;
use crate::parser::{EntryHandler, Parser, ParserOptions, ReadEntry, DEFAULT_MAX_META_ENTRY_SIZE};
use crate::path_filter::{EntryPredicate, PathFilter};
use crate::BodySignal;

/// Default read size for archive files.
pub const DEFAULT_MAX_READ_SIZE: usize = 16 * 1024 * 1024;

/// Per-entry callback.
pub type OnEntry = Box<dyn FnMut(&mut ReadEntry) + Send>;

/// Options for listing an archive.
pub struct ListOptions {
    /// Archive to read. Required by the file-based functions.
    pub file: Option<PathBuf>,
    /// Largest single read from the archive file.
    pub max_read_size: usize,
    /// Predicate run on every entry path before `paths` is consulted.
    pub filter: Option<EntryPredicate>,
    /// Called for each entry that passes the filters.
    pub onentry: Option<OnEntry>,
    /// Leave entry bodies paused for the consumer instead of draining them.
    pub no_resume: bool,
    /// Only list these paths and whatever lies below them.
    pub paths: Vec<String>,
    pub max_meta_entry_size: u64,
    pub max_buffered: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            file: None,
            max_read_size: DEFAULT_MAX_READ_SIZE,
            filter: None,
            onentry: None,
            no_resume: false,
            paths: Vec::new(),
            max_meta_entry_size: DEFAULT_MAX_META_ENTRY_SIZE,
            max_buffered: crate::body_stream::DEFAULT_MAX_BUFFERED,
        }
    }
}

impl std::fmt::Debug for ListOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListOptions")
            .field("file", &self.file)
            .field("max_read_size", &self.max_read_size)
            .field("filter", &self.filter.is_some())
            .field("onentry", &self.onentry.is_some())
            .field("no_resume", &self.no_resume)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl ListOptions {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(file.into()),
            ..Default::default()
        }
    }

    fn split(self) -> (Option<PathBuf>, usize, Option<OnEntry>, ParserOptions) {
        let filter = if self.paths.is_empty() && self.filter.is_none() {
            None
        } else {
            Some(PathFilter::new(self.paths, self.filter))
        };
        let parser = ParserOptions {
            filter,
            no_resume: self.no_resume,
            max_meta_entry_size: self.max_meta_entry_size,
            max_buffered: self.max_buffered,
        };
        (self.file, self.max_read_size.max(1), self.onentry, parser)
    }
}

/// Runs the `onentry` callback ahead of the wrapped handler.
struct WithCallback<H> {
    onentry: Option<OnEntry>,
    inner: H,
}

impl<H: EntryHandler> EntryHandler for WithCallback<H> {
    fn entry(&mut self, entry: &mut ReadEntry) -> Result<()> {
        if let Some(onentry) = self.onentry.as_mut() {
            onentry(entry);
        }
        self.inner.entry(entry)
    }

    fn body(&mut self, entry: &mut ReadEntry, signal: BodySignal) -> Result<()> {
        self.inner.body(entry, signal)
    }

    fn stalled(&mut self, entry: &mut ReadEntry) -> Result<()> {
        self.inner.stalled(entry)
    }

    fn finished(&mut self, entry: ReadEntry) -> Result<()> {
        self.inner.finished(entry)
    }
}

/// Keep handing the paused body to the handler until the parser takes
/// input again.
fn unblock<H: EntryHandler>(parser: &mut Parser<H>, mut accepted: bool) -> Result<()> {
    while !accepted {
        accepted = parser.resume_stalled()?;
    }
    Ok(())
}

/// Collects entry metadata.
#[derive(Debug, Default)]
struct Collect(Vec<EntryMetadata>);

impl EntryHandler for Collect {
    fn entry(&mut self, entry: &mut ReadEntry) -> Result<()> {
        self.0.push(entry.meta.clone());
        Ok(())
    }
}

fn required_file(file: Option<PathBuf>) -> Result<PathBuf> {
    file.ok_or_else(|| TarError::InvalidArgument("file is required".to_string()))
}

/// List the entries of an archive file.
pub fn list_sync(options: ListOptions) -> Result<Vec<EntryMetadata>> {
    Ok(list_with_sync(options, Collect::default())?.0)
}

/// Drive `handler` over the entries of an archive file.
pub fn list_with_sync<H: EntryHandler>(options: ListOptions, handler: H) -> Result<H> {
    let (file, max_read_size, onentry, parser_options) = options.split();
    let path = required_file(file)?;
    log::debug!("listing {}", path.display());
    let file = std::fs::File::open(&path)?;
    read_into_parser(file, max_read_size, onentry, parser_options, handler)
}

/// Drive `handler` over an archive read from any reader. `options.file` is
/// ignored.
pub fn list_reader_sync<R: Read, H: EntryHandler>(
    reader: R,
    options: ListOptions,
    handler: H,
) -> Result<H> {
    let (_, max_read_size, onentry, parser_options) = options.split();
    read_into_parser(reader, max_read_size, onentry, parser_options, handler)
}

fn read_into_parser<R: Read, H: EntryHandler>(
    mut reader: R,
    max_read_size: usize,
    onentry: Option<OnEntry>,
    parser_options: ParserOptions,
    handler: H,
) -> Result<H> {
    let mut parser = Parser::new(parser_options, WithCallback { onentry, inner: handler });
    // a small first read so a compressed archive fails fast
    let mut buf = vec![0u8; max_read_size.min(crate::parsing::BLOCK_SIZE)];
    loop {
        let n = read_exactish(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        let accepted = parser.write(&buf[..n])?;
        unblock(&mut parser, accepted)?;
        if parser.is_done() || n < buf.len() {
            break;
        }
        if buf.len() < max_read_size {
            buf.resize(max_read_size, 0);
        }
    }
    parser.end()?;
    Ok(parser.into_handler().inner)
}

/// List the entries of an archive file asynchronously.
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub async fn list(options: ListOptions) -> Result<Vec<EntryMetadata>> {
    Ok(list_with(options, Collect::default()).await?.0)
}

/// Drive `handler` over the entries of an archive file asynchronously.
///
/// Reads are awaited; the handler runs inline between reads.
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub async fn list_with<H: EntryHandler>(options: ListOptions, handler: H) -> Result<H> {
    use tokio::io::AsyncReadExt;

    let (file, max_read_size, onentry, parser_options) = options.split();
    let path = required_file(file)?;
    log::debug!("listing {}", path.display());
    let mut file = tokio::fs::File::open(&path).await?;

    let mut parser = Parser::new(parser_options, WithCallback { onentry, inner: handler });
    let mut buf = vec![0u8; max_read_size.min(crate::parsing::BLOCK_SIZE)];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let accepted = parser.write(&buf[..n])?;
        unblock(&mut parser, accepted)?;
        if parser.is_done() {
            break;
        }
        if buf.len() < max_read_size {
            buf.resize(max_read_size, 0);
        }
    }
    parser.end()?;
    Ok(parser.into_handler().inner)
}
