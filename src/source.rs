//! Byte sources.
//!
//! A [`ByteSource`] is a fixed-length, random-access view of file contents.
//! All reads go through [`ByteRange`]s, so a source never needs to hold the
//! whole file in memory at once.
//!
//! Two implementations are provided:
//! - [`MemoryByteSource`]: bytes already in memory, sub-sliced at zero cost.
//! - [`FileByteSource`]: a file on disk, read with seek + read behind a lock.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use parking_lot::Mutex;
use thiserror::Error;

use crate::byte_range::{validate_byte_range, ByteRange, InvalidByteRangeError};

/// The type for bytes returned by [`ByteSource`] reads.
///
/// An alias for [`bytes::Bytes`].
pub type Bytes = bytes::Bytes;

/// A fixed-length, random-access source of bytes.
///
/// Reads take `&self`; implementations must support concurrent readers.
pub trait ByteSource: Send + Sync {
    /// Return the total size of the source in bytes.
    fn size(&self) -> u64;

    /// Read `byte_range` from the source.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the byte range is invalid or the underlying read fails.
    fn read(&self, byte_range: ByteRange) -> Result<Bytes, SourceError>;
}

/// A byte source error.
#[derive(Debug, Error)]
pub enum SourceError {
    /// An IO error.
    #[error(transparent)]
    IO(#[from] std::io::Error),
    /// An invalid byte range.
    #[error(transparent)]
    InvalidByteRange(#[from] InvalidByteRangeError),
}

/// An in-memory byte source.
///
/// Reads are zero copy: the returned [`Bytes`] share the underlying allocation.
#[derive(Clone, Debug)]
pub struct MemoryByteSource(Bytes);

impl MemoryByteSource {
    /// Create a new in-memory byte source.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }
}

impl From<Vec<u8>> for MemoryByteSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl ByteSource for MemoryByteSource {
    fn size(&self) -> u64 {
        self.0.len() as u64
    }

    fn read(&self, byte_range: ByteRange) -> Result<Bytes, SourceError> {
        validate_byte_range(&byte_range, self.size())?;
        Ok(self.0.slice(byte_range.to_range_usize(self.size())))
    }
}

/// A file-backed byte source.
///
/// The file handle is shared behind a lock; each read seeks then reads exactly
/// the requested range. The file must not change size while the source is open.
#[derive(Debug)]
pub struct FileByteSource {
    file: Mutex<File>,
    size: u64,
}

impl FileByteSource {
    /// Open a file as a byte source.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the file cannot be opened or its length queried.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

impl ByteSource for FileByteSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read(&self, byte_range: ByteRange) -> Result<Bytes, SourceError> {
        validate_byte_range(&byte_range, self.size)?;
        let length = usize::try_from(byte_range.length(self.size)).unwrap();
        let mut buffer = vec![0; length];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(byte_range.start(self.size)))?;
            file.read_exact(&mut buffer)?;
        }
        Ok(buffer.into())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn memory_byte_source() {
        let source = MemoryByteSource::new((0u8..10).collect::<Vec<u8>>());
        assert_eq!(source.size(), 10);
        assert_eq!(
            source.read(ByteRange::FromStart(3, Some(3))).unwrap(),
            vec![3, 4, 5]
        );
        assert_eq!(
            source.read(ByteRange::FromEnd(1, Some(2))).unwrap(),
            vec![7, 8]
        );
        assert_eq!(
            source.read(ByteRange::FromStart(8, None)).unwrap(),
            vec![8, 9]
        );
        assert!(source.read(ByteRange::FromStart(8, Some(3))).is_err());
    }

    #[test]
    fn file_byte_source() {
        let path = std::env::temp_dir().join(format!("omread-source-{}", std::process::id()));
        let mut file = File::create(&path).unwrap();
        file.write_all(&(0u8..10).collect::<Vec<u8>>()).unwrap();
        drop(file);

        let source = FileByteSource::open(&path).unwrap();
        assert_eq!(source.size(), 10);
        assert_eq!(
            source.read(ByteRange::FromStart(3, Some(3))).unwrap(),
            vec![3, 4, 5]
        );
        assert_eq!(
            source.read(ByteRange::FromEnd(0, Some(2))).unwrap(),
            vec![8, 9]
        );
        assert!(source.read(ByteRange::FromStart(20, Some(1))).is_err());

        std::fs::remove_file(&path).unwrap();
    }
}
