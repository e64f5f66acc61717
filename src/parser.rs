//! Push-driven tar stream parser.
//!
//! Raw archive bytes go in through [`Parser::write`] in chunks of any size;
//! entries come out through an [`EntryHandler`]. The parser handles the
//! block framing, pax `x`/`g` records, GNU `L`/`K` long names and the
//! two-zero-block end marker. Invalid entries are logged and skipped.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tar_stream::{Parser, ParserOptions, ReadEntry, Result};
//!
//! let mut names = Vec::new();
//! let mut parser = Parser::new(ParserOptions::default(), |entry: &mut ReadEntry| -> Result<()> {
//!     names.push(entry.meta.path.clone());
//!     Ok(())
//! });
//! parser.write(&archive_bytes)?;
//! parser.end()?;
//! ```

use std::sync::Arc;

use crate::body_stream::{BodySignal, EntryBodyStream, DEFAULT_MAX_BUFFERED};
use crate::entry::EntryMetadata;
use crate::error::{Result, StreamError, TarError};
use crate::formats::Signature;
use crate::parsing::{
    block_align, EntryKind, GlobalContext, PaxRecords, RawHeader, TypeFlag, BLOCK_SIZE,
};
use crate::path_filter::PathFilter;

/// Largest meta entry (pax or long-name body) the parser will buffer.
pub const DEFAULT_MAX_META_ENTRY_SIZE: u64 = 1024 * 1024;

/// An entry as handed to the consumer.
#[derive(Debug)]
pub struct ReadEntry {
    pub meta: EntryMetadata,
    pub body: EntryBodyStream,
    /// Global pax records in effect when this entry was read.
    pub global: GlobalContext,
}

/// Receives entries and their body signals from a [`Parser`].
pub trait EntryHandler {
    /// A new entry header was read. Pausing `entry.body` here makes the
    /// parser hold back the entry's bytes until the body is resumed.
    fn entry(&mut self, entry: &mut ReadEntry) -> Result<()>;

    /// A body signal for the current entry. Unconsumed by default.
    fn body(&mut self, entry: &mut ReadEntry, signal: BodySignal) -> Result<()> {
        let _ = (entry, signal);
        Ok(())
    }

    /// The parser is holding back bytes because `entry.body` is paused.
    /// Called by [`Parser::resume_stalled`]; resumes the body by default.
    fn stalled(&mut self, entry: &mut ReadEntry) -> Result<()> {
        entry.body.resume();
        Ok(())
    }

    /// The entry's body is complete. A body paused after its last byte still
    /// holds its undelivered signals.
    fn finished(&mut self, entry: ReadEntry) -> Result<()> {
        let _ = entry;
        Ok(())
    }
}

impl<F> EntryHandler for F
where
    F: FnMut(&mut ReadEntry) -> Result<()>,
{
    fn entry(&mut self, entry: &mut ReadEntry) -> Result<()> {
        self(entry)
    }
}

/// Parser configuration.
#[derive(Debug)]
pub struct ParserOptions {
    /// Entries the filter rejects are skipped without reaching the handler.
    pub filter: Option<PathFilter>,
    /// Hand out entries paused; the consumer drains them.
    pub no_resume: bool,
    pub max_meta_entry_size: u64,
    /// Compaction threshold for each entry body.
    pub max_buffered: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            filter: None,
            no_resume: false,
            max_meta_entry_size: DEFAULT_MAX_META_ENTRY_SIZE,
            max_buffered: DEFAULT_MAX_BUFFERED,
        }
    }
}

enum State {
    Header,
    /// Consuming `remaining` padded body bytes.
    Body { remaining: u64, target: BodyTarget },
    /// End-of-archive marker seen.
    Done,
}

enum BodyTarget {
    Entry,
    Meta { flag: TypeFlag, size: u64, data: Vec<u8> },
    Skip,
}

pub struct Parser<H> {
    options: ParserOptions,
    handler: H,
    state: State,
    pending: Vec<u8>,
    position: u64,
    null_blocks: u8,
    global: GlobalContext,
    extended: Option<PaxRecords>,
    current: Option<ReadEntry>,
}

impl<H: EntryHandler> Parser<H> {
    pub fn new(options: ParserOptions, handler: H) -> Self {
        Self {
            options,
            handler,
            state: State::Header,
            pending: Vec::new(),
            position: 0,
            null_blocks: 0,
            global: Arc::new(PaxRecords::default()),
            extended: None,
            current: None,
        }
    }

    /// Feed archive bytes.
    ///
    /// Returns `false` while the current entry's body is paused. Body bytes
    /// are then held back unparsed; stop reading until [`resume`] or
    /// [`resume_stalled`] lets them through.
    ///
    /// [`resume`]: Parser::resume
    /// [`resume_stalled`]: Parser::resume_stalled
    pub fn write(&mut self, data: &[u8]) -> Result<bool> {
        if matches!(self.state, State::Done) {
            return Ok(true);
        }
        self.pending.extend_from_slice(data);
        self.process()
    }

    /// Resume the current entry body and parse what was held back.
    pub fn resume(&mut self) -> Result<bool> {
        if let Some(entry) = self.current.as_mut() {
            entry.body.resume();
        }
        self.pump()?;
        self.process()
    }

    /// Ask the handler to deal with a paused body through
    /// [`EntryHandler::stalled`], then parse what was held back.
    ///
    /// Fails with [`StreamError::Stalled`] if the body is still paused
    /// afterwards, since no more input can be taken.
    pub fn resume_stalled(&mut self) -> Result<bool> {
        if !self.is_blocked() {
            return self.process();
        }
        if let Some(entry) = self.current.as_mut() {
            self.handler.stalled(entry)?;
            if entry.body.is_paused() {
                return Err(StreamError::Stalled {
                    path: entry.meta.path.clone(),
                }
                .into());
            }
        }
        self.pump()?;
        self.process()
    }

    /// Body bytes are being held back for a paused entry.
    pub fn is_blocked(&self) -> bool {
        matches!(self.state, State::Body { target: BodyTarget::Entry, .. })
            && self
                .current
                .as_ref()
                .is_some_and(|e| e.body.is_paused() && e.body.remain() > 0)
    }

    fn process(&mut self) -> Result<bool> {
        let mut offset = 0;
        while offset < self.pending.len() {
            let available = self.pending.len() - offset;
            let used = match self.state {
                State::Done => {
                    offset = self.pending.len();
                    break;
                }
                State::Header => {
                    if available < BLOCK_SIZE {
                        break;
                    }
                    let mut block = [0u8; BLOCK_SIZE];
                    block.copy_from_slice(&self.pending[offset..offset + BLOCK_SIZE]);
                    self.on_header(&block)?;
                    BLOCK_SIZE
                }
                State::Body { .. } if self.is_blocked() => break,
                State::Body { remaining, .. } => {
                    let n = available.min(usize::try_from(remaining).unwrap_or(usize::MAX));
                    let chunk = self.pending[offset..offset + n].to_vec();
                    self.on_body(&chunk)?;
                    n
                }
            };
            offset += used;
            self.position += used as u64;
        }
        self.pending.drain(..offset);

        Ok(!self.is_blocked())
    }

    /// Signal end of input. Bytes held back for a paused body are released
    /// through [`resume_stalled`](Parser::resume_stalled) first. A body cut
    /// short by the end of input is ended early with a warning.
    pub fn end(&mut self) -> Result<()> {
        while self.is_blocked() && !self.pending.is_empty() {
            self.resume_stalled()?;
        }
        if let State::Body { remaining, .. } = self.state {
            log::warn!(
                "truncated archive: {} body bytes missing at offset {}",
                remaining,
                self.position
            );
            if self.current.is_some() {
                self.finish_entry()?;
            }
        } else if matches!(self.state, State::Header) && !self.pending.is_empty() {
            log::warn!(
                "ignoring {} trailing bytes at offset {}",
                self.pending.len(),
                self.position
            );
        }
        self.pending.clear();
        self.state = State::Done;
        Ok(())
    }

    /// Push any signals a consumer made room for since the last write.
    pub fn pump(&mut self) -> Result<()> {
        if let Some(entry) = self.current.as_mut() {
            while !entry.body.is_paused() {
                match entry.body.next_signal() {
                    Some(signal) => self.handler.body(entry, signal)?,
                    None => break,
                }
            }
        }
        Ok(())
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    fn on_header(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<()> {
        if self.position == 0 && Signature::from_bytes(block) == Some(Signature::Gzip) {
            return Err(TarError::CompressedArchive);
        }

        let header = RawHeader::decode(block);
        if header.null_block {
            self.null_blocks += 1;
            if self.null_blocks >= 2 {
                log::debug!("end of archive at offset {}", self.position + BLOCK_SIZE as u64);
                self.state = State::Done;
            }
            return Ok(());
        }
        self.null_blocks = 0;

        if !header.cksum_valid {
            log::warn!("invalid entry at offset {}: checksum mismatch", self.position);
            return Ok(());
        }

        let size = header.size.unwrap_or(0);
        if header.typeflag.is_meta() {
            let target = if size > self.options.max_meta_entry_size {
                log::warn!(
                    "ignoring {:?} meta entry of {} bytes (limit {})",
                    header.typeflag,
                    size,
                    self.options.max_meta_entry_size
                );
                BodyTarget::Skip
            } else {
                BodyTarget::Meta {
                    flag: header.typeflag,
                    size,
                    data: Vec::with_capacity(size as usize),
                }
            };
            return self.enter_body(size, target);
        }

        let extended = self.extended.take();
        let meta = EntryMetadata::merge(&header, extended.as_ref(), Some(self.global.as_ref()));
        // a pax size overrides the header size for framing too
        let framing = meta.size;

        if let Some(reason) = invalid_reason(&meta) {
            log::warn!("invalid entry {:?}: {}", meta.path, reason);
            return self.enter_body(framing, BodyTarget::Skip);
        }
        if meta.kind == EntryKind::Unknown {
            log::debug!("skipping unsupported entry type {:?}: {}", meta.typeflag, meta.path);
            return self.enter_body(framing, BodyTarget::Skip);
        }
        if let Some(filter) = self.options.filter.as_mut() {
            if !filter.matches(&meta.path, &meta) {
                log::trace!("filtered out: {}", meta.path);
                return self.enter_body(framing, BodyTarget::Skip);
            }
        }

        log::trace!("entry {} ({} bytes) at offset {}", meta.path, meta.size, self.position);
        let mut entry = ReadEntry {
            body: EntryBodyStream::with_max_buffered(meta.size, self.options.max_buffered),
            meta,
            global: Arc::clone(&self.global),
        };
        if self.options.no_resume {
            entry.body.pause();
        }
        self.handler.entry(&mut entry)?;
        self.current = Some(entry);

        if framing == 0 {
            self.finish_entry()
        } else {
            self.enter_body(framing, BodyTarget::Entry)
        }
    }

    fn enter_body(&mut self, size: u64, target: BodyTarget) -> Result<()> {
        let remaining = block_align(size);
        if remaining == 0 {
            self.state = State::Header;
            if let BodyTarget::Meta { flag, data, .. } = target {
                self.apply_meta(flag, &data);
            }
        } else {
            self.state = State::Body { remaining, target };
        }
        Ok(())
    }

    fn on_body(&mut self, chunk: &[u8]) -> Result<()> {
        let done = match &mut self.state {
            State::Body { remaining, target } => {
                *remaining -= chunk.len() as u64;
                if let BodyTarget::Meta { size, data, .. } = target {
                    let want = (*size as usize).saturating_sub(data.len()).min(chunk.len());
                    data.extend_from_slice(&chunk[..want]);
                }
                *remaining == 0
            }
            _ => return Ok(()),
        };

        if matches!(self.state, State::Body { target: BodyTarget::Entry, .. }) {
            if let Some(entry) = self.current.as_mut() {
                // block padding past the declared size is dropped here
                if entry.body.remain() > 0 && !entry.body.write(chunk) {
                    log::trace!("backpressure on {}", entry.meta.path);
                }
            }
            // a pause during the pump holds back the next body bytes
            self.pump()?;
        }

        if done {
            if let State::Body { target, .. } = std::mem::replace(&mut self.state, State::Header) {
                match target {
                    BodyTarget::Entry => self.finish_entry()?,
                    BodyTarget::Meta { flag, data, .. } => self.apply_meta(flag, &data),
                    BodyTarget::Skip => {}
                }
            }
        }
        Ok(())
    }

    fn apply_meta(&mut self, flag: TypeFlag, data: &[u8]) {
        match flag {
            TypeFlag::GlobalExtendedHeader => {
                let records = PaxRecords::parse(data);
                self.global = Arc::new(self.global.merged(&records));
            }
            TypeFlag::ExtendedHeader | TypeFlag::OldExtendedHeader => {
                let records = PaxRecords::parse(data);
                let merged = match self.extended.take() {
                    Some(prev) => prev.merged(&records),
                    None => records,
                };
                self.extended = Some(merged);
            }
            TypeFlag::NextFileHasLongPath | TypeFlag::OldGnuLongPath => {
                let records = self.extended.get_or_insert_with(PaxRecords::default);
                records.path = Some(c_string(data));
            }
            TypeFlag::NextFileHasLongLinkpath => {
                let records = self.extended.get_or_insert_with(PaxRecords::default);
                records.linkpath = Some(c_string(data));
            }
            _ => {}
        }
    }

    fn finish_entry(&mut self) -> Result<()> {
        if let Some(entry) = self.current.as_mut() {
            entry.body.end(None);
        }
        self.pump()?;
        if let Some(entry) = self.current.take() {
            self.handler.finished(entry)?;
        }
        Ok(())
    }
}

impl<H> std::fmt::Debug for Parser<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("position", &self.position)
            .field("pending", &self.pending.len())
            .field("current", &self.current.as_ref().map(|e| &e.meta.path))
            .finish_non_exhaustive()
    }
}

fn invalid_reason(meta: &EntryMetadata) -> Option<&'static str> {
    if meta.path.is_empty() {
        return Some("path is required");
    }
    let has_link = meta.linkpath.as_deref().is_some_and(|l| !l.is_empty());
    match (meta.typeflag.is_link(), has_link) {
        (true, false) => Some("linkpath required"),
        (false, true) => Some("linkpath forbidden"),
        _ => None,
    }
}

/// Long-name bodies are NUL-terminated.
fn c_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}
