//! Appending entries to an existing archive in place.
//!
//! The archive is scanned with the [`AppendLocator`](crate::AppendLocator)
//! to find where its valid entries end, the scan handle is closed, and a
//! write handle positioned at that offset receives the new entries followed
//! by a fresh end-of-archive marker. Nothing before the offset is rewritten.
//!
//! Inputs are filesystem paths relative to [`AppendOptions::cwd`], or
//! `@archive.tar` to copy every entry of another archive through unchanged.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tar_stream::{append_sync, AppendOptions};
//!
//! append_sync(AppendOptions {
//!     inputs: vec!["notes.txt".into(), "@other.tar".into()],
//!     ..AppendOptions::new("backup.tar")
//! })?;
//! ```

use std::fs::OpenOptions;
use std::io::{BufWriter, ErrorKind, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::append_locator::{locate_sync, MtimeCache};
use crate::error::{Result, TarError};
use crate::file_media::LocalFileMedia;
use crate::formats::has_compressed_suffix;
use crate::list::{list_with_sync, ListOptions, DEFAULT_MAX_READ_SIZE};
use crate::pack::{ArchiveWriter, TarWriter};
use crate::parser::{EntryHandler, ReadEntry};
use crate::BodySignal;

/// Marks an input as another archive to copy from.
pub const ARCHIVE_INPUT_MARKER: char = '@';

/// Options for [`append_sync`] and friends.
#[derive(Debug)]
pub struct AppendOptions<'a> {
    /// Archive to append to. Created if it does not exist.
    pub file: Option<PathBuf>,
    /// Paths to add, or `@path` for archives to copy from.
    pub inputs: Vec<String>,
    /// The archive is gzip-compressed. Always rejected.
    pub gzip: bool,
    /// Filled with path -> mtime for every entry found while scanning.
    pub mtime_cache: Option<&'a mut MtimeCache>,
    /// Read size when copying from `@` archives.
    pub max_read_size: usize,
    /// Base directory for relative inputs. Defaults to the process cwd.
    pub cwd: Option<PathBuf>,
}

impl Default for AppendOptions<'_> {
    fn default() -> Self {
        Self {
            file: None,
            inputs: Vec::new(),
            gzip: false,
            mtime_cache: None,
            max_read_size: DEFAULT_MAX_READ_SIZE,
            cwd: None,
        }
    }
}

impl AppendOptions<'_> {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(file.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Append,
    /// Skip filesystem inputs not newer than their archived copy.
    Update,
}

/// Everything the write phase needs, owned so it can move to a blocking task.
#[derive(Debug)]
struct WritePlan {
    path: PathBuf,
    offset: u64,
    inputs: Vec<String>,
    cwd: PathBuf,
    max_read_size: usize,
    /// Set in update mode.
    archived_mtimes: Option<MtimeCache>,
}

/// Check options before touching the filesystem.
fn validate(options: &AppendOptions<'_>) -> Result<PathBuf> {
    let Some(file) = options.file.as_ref() else {
        return Err(TarError::InvalidArgument("file is required".to_string()));
    };
    if options.inputs.is_empty() {
        return Err(TarError::InvalidArgument("no paths specified to add to archive".to_string()));
    }
    if options.gzip || has_compressed_suffix(file) {
        return Err(TarError::CompressedArchive);
    }
    Ok(file.clone())
}

/// Open read-write, creating the file only if it is missing.
fn open_read_write(path: &Path) -> std::io::Result<std::fs::File> {
    match OpenOptions::new().read(true).write(true).open(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("creating {}", path.display());
            OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)
        }
        other => other,
    }
}

/// Append inputs to an archive, blocking. Returns the offset the new
/// entries start at.
pub fn append_sync(options: AppendOptions<'_>) -> Result<u64> {
    run_sync(options, Mode::Append)
}

/// Like [`append_sync`], but filesystem inputs whose mtime is not newer than
/// the archived entry of the same name are skipped.
pub fn update_sync(options: AppendOptions<'_>) -> Result<u64> {
    run_sync(options, Mode::Update)
}

fn run_sync(mut options: AppendOptions<'_>, mode: Mode) -> Result<u64> {
    let path = validate(&options)?;

    let mut local_cache = MtimeCache::new();
    let offset = {
        let file = open_read_write(&path)?;
        let length = file.metadata()?.len();
        let mut media = LocalFileMedia::new(file, length);
        let cache = scan_cache(options.mtime_cache.as_deref_mut(), &mut local_cache, mode);
        locate_sync(&mut media, cache)?
        // scan handle closes here
    };

    let plan = make_plan(path, offset, options, local_cache, mode);
    plan.run()?;
    Ok(offset)
}

/// Append inputs to an archive. Scanning is async; writing runs on the
/// blocking pool once the scan handle is closed.
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub async fn append(options: AppendOptions<'_>) -> Result<u64> {
    run_async(options, Mode::Append).await
}

/// Async form of [`update_sync`].
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub async fn update(options: AppendOptions<'_>) -> Result<u64> {
    run_async(options, Mode::Update).await
}

#[cfg(feature = "async")]
async fn run_async(mut options: AppendOptions<'_>, mode: Mode) -> Result<u64> {
    use crate::append_locator::locate_async;
    use crate::file_media::AsyncFileMedia;

    let path = validate(&options)?;

    let mut local_cache = MtimeCache::new();
    let offset = {
        let file = match tokio::fs::OpenOptions::new().read(true).write(true).open(&path).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("creating {}", path.display());
                tokio::fs::OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&path)
                    .await?
            }
            other => other?,
        };
        let length = file.metadata().await?.len();
        let media = AsyncFileMedia::new(file, length);
        let cache = scan_cache(options.mtime_cache.as_deref_mut(), &mut local_cache, mode);
        locate_async(&media, cache).await?
    };

    let plan = make_plan(path, offset, options, local_cache, mode);
    tokio::task::spawn_blocking(move || plan.run())
        .await
        .map_err(|e| TarError::Io(std::io::Error::other(e)))??;
    Ok(offset)
}

/// The caller's cache if given; update mode needs one either way.
fn scan_cache<'c>(
    caller: Option<&'c mut MtimeCache>,
    local: &'c mut MtimeCache,
    mode: Mode,
) -> Option<&'c mut MtimeCache> {
    match (caller, mode) {
        (Some(cache), _) => Some(cache),
        (None, Mode::Update) => Some(local),
        (None, Mode::Append) => None,
    }
}

fn make_plan(
    path: PathBuf,
    offset: u64,
    options: AppendOptions<'_>,
    local_cache: MtimeCache,
    mode: Mode,
) -> WritePlan {
    let archived_mtimes = match mode {
        Mode::Append => None,
        Mode::Update => Some(match options.mtime_cache {
            Some(cache) => cache.clone(),
            None => local_cache,
        }),
    };
    WritePlan {
        path,
        offset,
        inputs: options.inputs,
        cwd: options.cwd.unwrap_or_else(|| PathBuf::from(".")),
        max_read_size: options.max_read_size,
        archived_mtimes,
    }
}

impl WritePlan {
    fn run(self) -> Result<()> {
        log::debug!(
            "appending {} inputs to {} at offset {}",
            self.inputs.len(),
            self.path.display(),
            self.offset
        );
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;

        let mut writer = TarWriter::new(BufWriter::new(file));
        for input in &self.inputs {
            if let Some(archive) = input.strip_prefix(ARCHIVE_INPUT_MARKER) {
                self.copy_archive(&mut writer, archive)?;
            } else {
                self.add_tree(&mut writer, &self.cwd.join(input), input)?;
            }
        }

        let mut file = writer.finish()?.into_inner().map_err(|e| e.into_error())?;
        let end = file.stream_position()?;
        file.set_len(end)?;
        file.sync_all()?;
        log::debug!("archive {} now ends at {}", self.path.display(), end);
        Ok(())
    }

    fn copy_archive<W: ArchiveWriter>(&self, writer: &mut W, archive: &str) -> Result<()> {
        log::debug!("copying entries from {}", archive);
        let options = ListOptions {
            max_read_size: self.max_read_size,
            ..ListOptions::new(self.cwd.join(archive))
        };
        list_with_sync(options, CopyThrough(writer))?;
        Ok(())
    }

    /// Add a path, then everything below it when it is a directory.
    fn add_tree<W: ArchiveWriter>(&self, writer: &mut W, path: &Path, name: &str) -> Result<()> {
        let metadata = std::fs::symlink_metadata(path)?;
        if self.is_newer(name, &metadata) {
            writer.add_path(path, name)?;
        } else {
            log::debug!("skipping {}: not newer than archived copy", name);
        }

        if metadata.is_dir() {
            let mut children = std::fs::read_dir(path)?.collect::<std::io::Result<Vec<_>>>()?;
            children.sort_by_key(|c| c.file_name());
            for child in children {
                let child_name = format!(
                    "{}/{}",
                    name.trim_end_matches('/'),
                    child.file_name().to_string_lossy()
                );
                self.add_tree(writer, &child.path(), &child_name)?;
            }
        }
        Ok(())
    }

    fn is_newer(&self, name: &str, metadata: &std::fs::Metadata) -> bool {
        let Some(archived) = self.archived_mtimes.as_ref() else {
            return true;
        };
        let key = name.trim_end_matches('/');
        let recorded = archived.get(key).or_else(|| archived.get(&format!("{}/", key)));
        match (recorded, metadata.modified()) {
            (Some(recorded), Ok(modified)) => truncate_to_secs(modified) > *recorded,
            _ => true,
        }
    }
}

/// Header mtimes have whole-second resolution.
fn truncate_to_secs(time: SystemTime) -> SystemTime {
    crate::formats::from_unix_secs(crate::formats::to_unix_secs(time))
}

/// Streams every listed entry into a writer unchanged.
struct CopyThrough<'w, W>(&'w mut W);

impl<W: ArchiveWriter> EntryHandler for CopyThrough<'_, W> {
    fn entry(&mut self, entry: &mut ReadEntry) -> Result<()> {
        self.0.begin_entry(&entry.meta)
    }

    fn body(&mut self, entry: &mut ReadEntry, signal: BodySignal) -> Result<()> {
        match signal {
            BodySignal::Data(data) => self.0.write_body(&data),
            BodySignal::End => self.0.end_entry(),
            BodySignal::Drain => Ok(()),
            BodySignal::Error(e) => {
                log::warn!("{}: {}", entry.meta.path, e);
                Ok(())
            }
        }
    }
}
