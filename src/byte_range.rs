//! Byte ranges.
//!
//! A [`ByteRange`] represents a byte range relative to the start or end of a byte source.
//! A byte range has an offset and optional length, which if omitted means to read all remaining bytes.

use std::ops::Range;

use thiserror::Error;

/// A byte offset.
pub type ByteOffset = u64;

/// A byte length.
pub type ByteLength = u64;

/// A byte range.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ByteRange {
    /// A byte range from the start.
    ///
    /// If the byte length is [`None`], reads to the end of the source.
    FromStart(ByteOffset, Option<ByteLength>),
    /// A byte range from the end.
    ///
    /// If the byte length is [`None`], reads to the start of the source.
    FromEnd(ByteOffset, Option<ByteLength>),
}

impl ByteRange {
    /// Return the start of a byte range. `size` is the size of the entire source.
    #[must_use]
    pub fn start(&self, size: u64) -> u64 {
        match self {
            Self::FromStart(offset, _) => *offset,
            Self::FromEnd(offset, length) => {
                length.as_ref().map_or(0, |length| size - *offset - *length)
            }
        }
    }

    /// Return the exclusive end of a byte range. `size` is the size of the entire source.
    #[must_use]
    pub fn end(&self, size: u64) -> u64 {
        match self {
            Self::FromStart(offset, length) => {
                length.as_ref().map_or(size, |length| offset + length)
            }
            Self::FromEnd(offset, _) => size - offset,
        }
    }

    /// Return the length of a byte range. `size` is the size of the entire source.
    #[must_use]
    pub fn length(&self, size: u64) -> u64 {
        match self {
            Self::FromStart(offset, None) | Self::FromEnd(offset, None) => size - offset,
            Self::FromStart(_, Some(length)) | Self::FromEnd(_, Some(length)) => *length,
        }
    }

    /// Convert the byte range to a [`Range<u64>`].
    #[must_use]
    pub fn to_range(&self, size: u64) -> Range<u64> {
        self.start(size)..self.end(size)
    }

    /// Convert the byte range to a [`Range<usize>`].
    ///
    /// # Panics
    ///
    /// Panics if the byte range exceeds [`usize::MAX`].
    #[must_use]
    pub fn to_range_usize(&self, size: u64) -> Range<usize> {
        self.start(size).try_into().unwrap()..self.end(size).try_into().unwrap()
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Self::FromStart(offset, length) => write!(
                f,
                "{}..{}",
                if offset == &0 {
                    String::new()
                } else {
                    offset.to_string()
                },
                length.map_or(String::new(), |length| (offset + length).to_string())
            ),
            Self::FromEnd(offset, length) => write!(
                f,
                "{}..{}",
                length.map_or(String::new(), |length| format!("-{}", offset + length)),
                if offset == &0 {
                    String::new()
                } else {
                    format!("-{offset}")
                }
            ),
        }
    }
}

/// An invalid byte range error.
#[derive(Copy, Clone, Debug, Error)]
#[error("invalid byte range {0} for a source of length {1}")]
pub struct InvalidByteRangeError(ByteRange, u64);

impl InvalidByteRangeError {
    /// Create a new [`InvalidByteRangeError`].
    #[must_use]
    pub fn new(byte_range: ByteRange, source_len: u64) -> Self {
        Self(byte_range, source_len)
    }
}

/// Validate that `byte_range` lies within a source of `source_len` bytes.
///
/// # Errors
/// Returns [`InvalidByteRangeError`] if any requested byte is beyond the end of the source.
pub fn validate_byte_range(
    byte_range: &ByteRange,
    source_len: u64,
) -> Result<(), InvalidByteRangeError> {
    let valid = match byte_range {
        ByteRange::FromStart(offset, length) | ByteRange::FromEnd(offset, length) => {
            offset + length.unwrap_or(0) <= source_len
        }
    };
    if valid {
        Ok(())
    } else {
        Err(InvalidByteRangeError(*byte_range, source_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_ranges() {
        let byte_range = ByteRange::FromStart(1, None);
        assert_eq!(byte_range.to_range(10), 1..10);
        assert_eq!(byte_range.length(10), 9);

        let byte_range = ByteRange::FromEnd(1, None);
        assert_eq!(byte_range.to_range(10), 0..9);
        assert_eq!(byte_range.length(10), 9);

        let byte_range = ByteRange::FromEnd(8, Some(4));
        assert_eq!(byte_range.to_range(16), 4..12);
        assert_eq!(byte_range.length(16), 4);

        let byte_range = ByteRange::FromStart(1, Some(5));
        assert_eq!(byte_range.to_range(10), 1..6);
        assert_eq!(byte_range.to_range_usize(10), 1..6);
        assert_eq!(byte_range.length(10), 5);

        assert!(validate_byte_range(&ByteRange::FromStart(1, Some(5)), 6).is_ok());
        assert!(validate_byte_range(&ByteRange::FromStart(1, Some(5)), 2).is_err());

        assert!(validate_byte_range(&ByteRange::FromEnd(1, Some(5)), 6).is_ok());
        assert!(validate_byte_range(&ByteRange::FromEnd(1, Some(5)), 2).is_err());

        assert_eq!(
            validate_byte_range(&ByteRange::FromStart(1, Some(4)), 3)
                .unwrap_err()
                .to_string(),
            "invalid byte range 1..5 for a source of length 3"
        );
    }

    #[test]
    fn byte_range_display() {
        assert_eq!(format!("{}", ByteRange::FromStart(0, None)), "..");
        assert_eq!(format!("{}", ByteRange::FromStart(5, None)), "5..");
        assert_eq!(format!("{}", ByteRange::FromStart(5, Some(2))), "5..7");
        assert_eq!(format!("{}", ByteRange::FromEnd(5, None)), "..-5");
        assert_eq!(format!("{}", ByteRange::FromEnd(0, Some(2))), "-2..");
        assert_eq!(format!("{}", ByteRange::FromEnd(5, Some(2))), "-7..-5");
    }
}
