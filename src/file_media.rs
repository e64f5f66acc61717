//! Block sources - positioned reads over an archive file.
//!
//! Scanning an archive only ever needs one capability: "read this many bytes
//! at this offset". [`LocalFileMedia`] provides it synchronously over any
//! seekable reader, and [`FileMedia`] (with the `async` feature) provides it
//! as a future.

use crate::error::Result;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// Fill as much of `buf` as the reader can provide, retrying short and
/// interrupted reads. Returns the byte count, which is less than
/// `buf.len()` only at end of file.
pub(crate) fn read_exactish(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Synchronous block source over a seekable reader.
#[derive(Debug)]
pub struct LocalFileMedia<R = std::fs::File> {
    reader: R,
    length: u64,
}

impl<R: Read + Seek> LocalFileMedia<R> {
    /// Wrap a reader whose total length is already known.
    pub fn new(reader: R, length: u64) -> Self {
        Self { reader, length }
    }

    /// Wrap a reader, measuring its length by seeking to the end.
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let length = reader.seek(SeekFrom::End(0))?;
        Ok(Self { reader, length })
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Read up to `buf.len()` bytes at `offset`.
    pub fn read_block_sync(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(read_exactish(&mut self.reader, buf)?)
    }
}

// Async FileMedia trait (requires 'async' feature)
#[cfg(feature = "async")]
use std::future::Future;
#[cfg(feature = "async")]
use std::pin::Pin;

/// Block source that reads asynchronously.
///
/// Implement this trait for custom byte sources. The library provides
/// [`AsyncFileMedia`] for tokio readers.
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub trait FileMedia: Send + Sync {
    fn length(&self) -> u64;

    /// Read up to `len` bytes at `offset`. A shorter result means end of file.
    fn read_block(
        &self,
        offset: u64,
        len: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>>;
}

/// Async block source over a tokio reader.
#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
#[derive(Debug)]
pub struct AsyncFileMedia<R = tokio::fs::File> {
    reader: tokio::sync::Mutex<R>,
    length: u64,
}

#[cfg(feature = "async")]
impl<R> AsyncFileMedia<R>
where
    R: tokio::io::AsyncRead + tokio::io::AsyncSeek + Unpin + Send,
{
    pub fn new(reader: R, length: u64) -> Self {
        Self {
            reader: tokio::sync::Mutex::new(reader),
            length,
        }
    }
}

#[cfg(feature = "async")]
impl<R> FileMedia for AsyncFileMedia<R>
where
    R: tokio::io::AsyncRead + tokio::io::AsyncSeek + Unpin + Send,
{
    fn length(&self) -> u64 {
        self.length
    }

    fn read_block(
        &self,
        offset: u64,
        len: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + '_>> {
        Box::pin(async move {
            use tokio::io::{AsyncReadExt, AsyncSeekExt};
            let mut reader = self.reader.lock().await;
            reader.seek(SeekFrom::Start(offset)).await?;
            let mut buffer = vec![0u8; len];
            let mut filled = 0;
            while filled < len {
                match reader.read(&mut buffer[filled..]).await {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            buffer.truncate(filled);
            Ok(buffer)
        })
    }
}
