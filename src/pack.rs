//! Writing entries into an archive.
//!
//! [`ArchiveWriter`] is what the append orchestrator drives. [`TarWriter`]
//! implements it on top of [`tar::Builder`]: filesystem inputs go through the
//! builder's own path handling, and entries copied from another archive are
//! streamed through as raw header and body blocks, with a pax header in
//! front when a field does not fit the ustar layout.

use std::io::Write;
use std::path::{Component, Path};

use crate::entry::EntryMetadata;
use crate::error::{Result, TarError};
use crate::parsing::{block_align, RawHeader, TypeFlag, BLOCK_SIZE};

/// Sink for new archive entries.
pub trait ArchiveWriter {
    /// Add one file, directory or symlink from disk under the archive name
    /// `name`. Directory contents are not included.
    fn add_path(&mut self, path: &Path, name: &str) -> Result<()>;

    /// Start an entry whose body will follow through [`write_body`].
    ///
    /// [`write_body`]: ArchiveWriter::write_body
    fn begin_entry(&mut self, meta: &EntryMetadata) -> Result<()>;

    fn write_body(&mut self, data: &[u8]) -> Result<()>;

    /// Close the current entry, padding the body to its declared size and to
    /// the block boundary.
    fn end_entry(&mut self) -> Result<()>;
}

#[derive(Debug)]
struct PendingBody {
    declared: u64,
    written: u64,
}

pub struct TarWriter<W: Write> {
    builder: tar::Builder<W>,
    current: Option<PendingBody>,
}

impl<W: Write> TarWriter<W> {
    pub fn new(inner: W) -> Self {
        let mut builder = tar::Builder::new(inner);
        builder.follow_symlinks(false);
        Self { builder, current: None }
    }

    /// Write the end-of-archive marker and hand back the writer.
    pub fn finish(mut self) -> Result<W> {
        if self.current.is_some() {
            self.end_entry()?;
        }
        Ok(self.builder.into_inner()?)
    }

    fn raw(&mut self) -> &mut W {
        self.builder.get_mut()
    }

    fn write_pax(&mut self, meta: &EntryMetadata) -> Result<()> {
        let records = meta.to_pax().encode();
        let header = RawHeader {
            path: Some(pax_header_name(&meta.path)),
            mode: Some(0o644),
            size: Some(records.len() as u64),
            mtime: meta.mtime.map(crate::formats::to_unix_secs),
            typeflag: TypeFlag::ExtendedHeader,
            ..Default::default()
        };
        let block = header.encode().block;
        let padding = block_align(records.len() as u64) as usize - records.len();

        let out = self.raw();
        out.write_all(&block)?;
        out.write_all(&records)?;
        out.write_all(&ZEROS[..padding])?;
        Ok(())
    }
}

const ZEROS: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

impl<W: Write> ArchiveWriter for TarWriter<W> {
    fn add_path(&mut self, path: &Path, name: &str) -> Result<()> {
        let name = archive_name(name)?;
        log::debug!("adding {} as {}", path.display(), name);
        let metadata = std::fs::symlink_metadata(path)?;
        if metadata.is_dir() {
            self.builder.append_dir(&name, path)?;
        } else {
            self.builder.append_path_with_name(path, &name)?;
        }
        Ok(())
    }

    fn begin_entry(&mut self, meta: &EntryMetadata) -> Result<()> {
        if self.current.is_some() {
            self.end_entry()?;
        }
        log::trace!("copying entry {} ({} bytes)", meta.path, meta.size);

        let encoded = meta.to_header().encode();
        let needs_pax = encoded.needs_pax || meta.atime.is_some() || meta.ctime.is_some();
        if needs_pax {
            self.write_pax(meta)?;
        }
        self.raw().write_all(&encoded.block)?;
        self.current = Some(PendingBody {
            declared: meta.size,
            written: 0,
        });
        Ok(())
    }

    fn write_body(&mut self, data: &[u8]) -> Result<()> {
        let Some(pending) = self.current.as_mut() else {
            return Err(TarError::InvalidArgument("body data without an entry".to_string()));
        };
        let room = pending.declared - pending.written;
        let n = data.len().min(usize::try_from(room).unwrap_or(usize::MAX));
        pending.written += n as u64;
        self.raw().write_all(&data[..n])?;
        Ok(())
    }

    fn end_entry(&mut self) -> Result<()> {
        let Some(pending) = self.current.take() else {
            return Ok(());
        };
        if pending.written < pending.declared {
            log::warn!(
                "entry body ended after {} of {} bytes, padding with zeros",
                pending.written,
                pending.declared
            );
        }
        let mut padding = block_align(pending.declared) - pending.written;
        while padding > 0 {
            let n = padding.min(BLOCK_SIZE as u64) as usize;
            self.raw().write_all(&ZEROS[..n])?;
            padding -= n as u64;
        }
        Ok(())
    }
}

impl<W: Write> std::fmt::Debug for TarWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TarWriter").field("current", &self.current).finish_non_exhaustive()
    }
}

/// Archive names are relative; leading `/` and `..` are dropped.
fn archive_name(name: &str) -> Result<String> {
    let parts: Vec<_> = Path::new(name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return Err(TarError::InvalidArgument(format!("no archive name for input {:?}", name)));
    }
    let joined = parts.join("/");
    if joined != name.trim_end_matches('/') {
        log::warn!("stripping {:?} to {:?}", name, joined);
    }
    Ok(joined)
}

/// `dir/PaxHeader/file`, cut to fit the name field.
fn pax_header_name(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    let (dir, base) = match trimmed.rfind('/') {
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
        None => ("", trimmed),
    };
    let mut name = if dir.is_empty() {
        format!("PaxHeader/{}", base)
    } else {
        format!("{}/PaxHeader/{}", dir, base)
    };
    if name.len() > 99 {
        let mut cut = 99;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}
