//! Finding where new entries can be appended to an existing archive.
//!
//! [`AppendLocator`] walks the archive one header at a time and stops at the
//! first position that does not start a complete, valid entry. That is where
//! the end-of-archive marker (or trailing garbage from an interrupted write)
//! begins, and where new entries go.
//!
//! The locator performs no I/O itself. It asks for a block with
//! [`AppendLocator::step`] and is fed the bytes with
//! [`AppendLocator::feed`], so [`locate_sync`] and [`locate_async`] share
//! every decision and return the same offset for the same bytes.
//!
//! An invalid checksum, a short read or an entry that would run past the end
//! of the file all end the scan; none of them are errors.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::time::SystemTime;

use crate::error::{Result, TarError};
use crate::file_media::LocalFileMedia;
use crate::formats::{from_unix_secs, Signature};
use crate::parsing::{block_align, RawHeader, BLOCK_SIZE};

/// Archive path to the mtime recorded in its header.
pub type MtimeCache = HashMap<String, SystemTime>;

/// What the locator needs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// Read one block at this offset and pass it to [`AppendLocator::feed`].
    Read { offset: u64 },
    /// Scan finished; new entries start here.
    Done(u64),
}

#[derive(Debug)]
pub struct AppendLocator<'a> {
    length: u64,
    position: u64,
    done: bool,
    mtime_cache: Option<&'a mut MtimeCache>,
}

impl<'a> AppendLocator<'a> {
    pub fn new(length: u64, mtime_cache: Option<&'a mut MtimeCache>) -> Self {
        Self {
            length,
            position: 0,
            done: false,
            mtime_cache,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn step(&mut self) -> ScanStep {
        if self.done || self.position + BLOCK_SIZE as u64 > self.length {
            self.done = true;
            ScanStep::Done(self.position)
        } else {
            ScanStep::Read { offset: self.position }
        }
    }

    /// Consume the block requested by the last [`step`](Self::step).
    ///
    /// `block` may be shorter than a full block if the file ended early.
    pub fn feed(&mut self, block: &[u8]) -> Result<()> {
        if self.done {
            return Ok(());
        }
        if self.position == 0 && Signature::from_bytes(block) == Some(Signature::Gzip) {
            return Err(TarError::CompressedArchive);
        }
        let Ok(block) = <&[u8; BLOCK_SIZE]>::try_from(block) else {
            log::debug!("short read at offset {}, stopping scan", self.position);
            self.done = true;
            return Ok(());
        };

        let header = RawHeader::decode(block);
        if !header.cksum_valid {
            log::debug!("no valid header at offset {}, stopping scan", self.position);
            self.done = true;
            return Ok(());
        }

        let entry_block_size = block_align(header.size.unwrap_or(0));
        if self.position + entry_block_size + BLOCK_SIZE as u64 > self.length {
            log::debug!("entry at offset {} runs past end of file, stopping scan", self.position);
            self.done = true;
            return Ok(());
        }

        if let (Some(cache), Some(path), Some(mtime)) =
            (self.mtime_cache.as_deref_mut(), header.path, header.mtime)
        {
            cache.insert(path, from_unix_secs(mtime));
        }

        self.position += entry_block_size + BLOCK_SIZE as u64;
        if self.position >= self.length {
            self.done = true;
        }
        Ok(())
    }
}

/// Find the append offset by blocking reads.
pub fn locate_sync<R: Read + Seek>(
    media: &mut LocalFileMedia<R>,
    mtime_cache: Option<&mut MtimeCache>,
) -> Result<u64> {
    let mut locator = AppendLocator::new(media.length(), mtime_cache);
    let mut block = [0u8; BLOCK_SIZE];
    loop {
        match locator.step() {
            ScanStep::Done(offset) => {
                log::debug!("append offset {}", offset);
                return Ok(offset);
            }
            ScanStep::Read { offset } => {
                let n = media.read_block_sync(offset, &mut block)?;
                locator.feed(&block[..n])?;
            }
        }
    }
}

/// Find the append offset by async reads.
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub async fn locate_async<M: crate::file_media::FileMedia + ?Sized>(
    media: &M,
    mtime_cache: Option<&mut MtimeCache>,
) -> Result<u64> {
    let mut locator = AppendLocator::new(media.length(), mtime_cache);
    loop {
        match locator.step() {
            ScanStep::Done(offset) => {
                log::debug!("append offset {}", offset);
                return Ok(offset);
            }
            ScanStep::Read { offset } => {
                let block = media.read_block(offset, BLOCK_SIZE).await?;
                locator.feed(&block)?;
            }
        }
    }
}
