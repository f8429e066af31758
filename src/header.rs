//! File metadata.
//!
//! Every file starts with a 3 byte marker: the magic [`MAGIC`] followed by a
//! format version byte. The remaining metadata layout depends on the version:
//!
//! - **Version 2**: a header at the start of the file (compression, scale
//!   factor, dimensions, chunk shape), followed by the chunk lookup table,
//!   followed by the data region.
//! - **Version 3**: the data region starts immediately after the marker; the
//!   lookup table and a trailer holding the remaining metadata sit at the end
//!   of the file, so metadata can be written after the data.
//!
//! Parsing either layout produces an [`ArrayMetadata`], which is immutable for
//! the lifetime of an open array.

use derive_more::Display;
use thiserror::Error;

use crate::{
    byte_range::ByteRange,
    source::{ByteSource, SourceError},
};

/// The file magic, the first two bytes of every file.
pub const MAGIC: [u8; 2] = *b"OM";

/// The length of the file marker (magic plus version byte).
pub(crate) const MARKER_LEN: u64 = 3;

/// The size of one lookup table entry in bytes.
pub(crate) const LUT_ENTRY_SIZE: u64 = 8;

/// The quantization scheme applied when the array was written.
///
/// Selects the formula that maps stored 16-bit integers back to floats.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq)]
pub enum Compression {
    /// Values were stored as `round(x * scale_factor)`.
    #[display("linear")]
    LinearQuantized,
    /// Values were stored as `round(log10(x + 1) * scale_factor)`.
    #[display("logarithmic")]
    LogarithmicQuantized,
}

impl Compression {
    fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::LinearQuantized),
            1 => Some(Self::LogarithmicQuantized),
            _ => None,
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::LinearQuantized => 0,
            Self::LogarithmicQuantized => 1,
        }
    }
}

/// Where the lookup table and data regions live in the file.
///
/// Both variants answer the same questions: where the LUT starts and where
/// chunk byte offsets are relative to. Lookup table semantics are identical in
/// both versions: entry `k` is the end offset of chunk `k` within the data
/// region, chunk `k` starts at entry `k - 1`, and chunk 0 starts at an
/// implicit zero that is never stored.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LutLayout {
    /// Version 2: the lookup table sits between the header and the data region.
    Version2 {
        /// Byte offset of the first lookup table entry.
        lut_start: u64,
        /// Byte offset of the data region.
        data_start: u64,
    },
    /// Version 3: the data region follows the marker and the lookup table
    /// precedes the trailer.
    Version3 {
        /// Byte offset of the first lookup table entry.
        lut_start: u64,
        /// Byte offset of the data region.
        data_start: u64,
    },
}

impl LutLayout {
    /// Return the byte offset of the first lookup table entry.
    #[must_use]
    pub fn lut_start(&self) -> u64 {
        let (Self::Version2 { lut_start, .. } | Self::Version3 { lut_start, .. }) = self;
        *lut_start
    }

    /// Return the byte offset of the data region.
    #[must_use]
    pub fn data_start(&self) -> u64 {
        let (Self::Version2 { data_start, .. } | Self::Version3 { data_start, .. }) = self;
        *data_start
    }

    /// Return the format version.
    #[must_use]
    pub fn version(&self) -> u8 {
        match self {
            Self::Version2 { .. } => 2,
            Self::Version3 { .. } => 3,
        }
    }
}

/// The length of a version 2 header with `n_dims` dimensions.
///
/// The version 2 lookup table starts at this offset.
#[must_use]
pub fn version2_header_length(n_dims: u64) -> u64 {
    16 + 16 * n_dims
}

/// The length of a version 3 trailer with `n_dims` dimensions.
fn version3_trailer_length(n_dims: u64) -> u64 {
    24 + 16 * n_dims
}

/// Immutable metadata of an open array.
#[derive(Clone, Debug)]
pub struct ArrayMetadata {
    dims: Vec<u64>,
    chunks: Vec<u64>,
    scale_factor: f32,
    compression: Compression,
    lut: LutLayout,
}

impl ArrayMetadata {
    /// Parse array metadata from a byte source.
    ///
    /// Reads the marker and then the version 2 header or version 3 trailer.
    ///
    /// # Errors
    /// Returns a [`MetadataError`] if the source cannot be read or holds
    /// invalid metadata.
    pub fn from_source<S: ByteSource + ?Sized>(source: &S) -> Result<Self, MetadataError> {
        let size = source.size();
        if size < MARKER_LEN {
            return Err(MetadataError::Truncated(size));
        }
        let marker = source.read(ByteRange::FromStart(0, Some(MARKER_LEN)))?;
        if marker[0..2] != MAGIC {
            return Err(MetadataError::InvalidMagic([marker[0], marker[1]]));
        }
        match marker[2] {
            2 => Self::from_version2_header(source, size),
            3 => Self::from_version3_trailer(source, size),
            version => Err(MetadataError::UnsupportedVersion(version)),
        }
    }

    fn from_version2_header<S: ByteSource + ?Sized>(
        source: &S,
        size: u64,
    ) -> Result<Self, MetadataError> {
        if size < 16 {
            return Err(MetadataError::Truncated(size));
        }
        let head = source.read(ByteRange::FromStart(0, Some(16)))?;
        let compression = Compression::from_u8(head[3])
            .ok_or(MetadataError::UnsupportedCompression(head[3]))?;
        let scale_factor = f32::from_le_bytes(head[4..8].try_into().unwrap());
        let n_dims = u64::from_le_bytes(head[8..16].try_into().unwrap());
        if n_dims == 0 {
            return Err(MetadataError::ZeroDimensions);
        }
        if n_dims > size / 16 {
            return Err(MetadataError::Truncated(size));
        }
        let header_length = version2_header_length(n_dims);
        if size < header_length {
            return Err(MetadataError::Truncated(size));
        }
        let shapes = source.read(ByteRange::FromStart(16, Some(16 * n_dims)))?;
        let dims = parse_u64_slice(&shapes[..8 * n_dims as usize]);
        let chunks = parse_u64_slice(&shapes[8 * n_dims as usize..]);

        let metadata = Self::validated(dims, chunks, scale_factor, compression)?;
        let chunk_count = metadata.chunk_count();
        let lut_start = header_length;
        let data_start = header_length + chunk_count * LUT_ENTRY_SIZE;
        if data_start > size {
            return Err(MetadataError::LutOutOfBounds {
                lut_start,
                chunk_count,
                size,
            });
        }
        Ok(Self {
            lut: LutLayout::Version2 {
                lut_start,
                data_start,
            },
            ..metadata
        })
    }

    fn from_version3_trailer<S: ByteSource + ?Sized>(
        source: &S,
        size: u64,
    ) -> Result<Self, MetadataError> {
        if size < MARKER_LEN + 16 {
            return Err(MetadataError::Truncated(size));
        }
        let tail = source.read(ByteRange::FromEnd(0, Some(16)))?;
        let n_dims = u64::from_le_bytes(tail[0..8].try_into().unwrap());
        let lut_start = i64::from_le_bytes(tail[8..16].try_into().unwrap());
        if n_dims == 0 {
            return Err(MetadataError::ZeroDimensions);
        }
        if n_dims > size / 16 {
            return Err(MetadataError::Truncated(size));
        }
        if lut_start < 0 {
            return Err(MetadataError::NegativeLutOffset(lut_start));
        }
        let lut_start = lut_start as u64;
        let trailer_length = version3_trailer_length(n_dims);
        if size < MARKER_LEN + trailer_length {
            return Err(MetadataError::Truncated(size));
        }
        let block = source.read(ByteRange::FromEnd(16, Some(8 + 16 * n_dims)))?;
        let scale_factor = f32::from_le_bytes(block[0..4].try_into().unwrap());
        let compression = Compression::from_u8(block[4])
            .ok_or(MetadataError::UnsupportedCompression(block[4]))?;
        let dims = parse_u64_slice(&block[8..8 + 8 * n_dims as usize]);
        let chunks = parse_u64_slice(&block[8 + 8 * n_dims as usize..]);

        let metadata = Self::validated(dims, chunks, scale_factor, compression)?;
        let chunk_count = metadata.chunk_count();
        if lut_start < MARKER_LEN
            || lut_start + chunk_count * LUT_ENTRY_SIZE > size - trailer_length
        {
            return Err(MetadataError::LutOutOfBounds {
                lut_start,
                chunk_count,
                size,
            });
        }
        Ok(Self {
            lut: LutLayout::Version3 {
                lut_start,
                data_start: MARKER_LEN,
            },
            ..metadata
        })
    }

    fn validated(
        dims: Vec<u64>,
        chunks: Vec<u64>,
        scale_factor: f32,
        compression: Compression,
    ) -> Result<Self, MetadataError> {
        if let Some(dim) = dims.iter().position(|&d| d == 0) {
            return Err(MetadataError::ZeroDimExtent(dim));
        }
        if let Some(dim) = chunks.iter().position(|&c| c == 0) {
            return Err(MetadataError::ZeroChunkExtent(dim));
        }
        if !(scale_factor.is_finite() && scale_factor > 0.0) {
            return Err(MetadataError::InvalidScaleFactor(scale_factor));
        }
        Ok(Self {
            dims,
            chunks,
            scale_factor,
            compression,
            // Placeholder until the caller fills in the parsed layout.
            lut: LutLayout::Version3 {
                lut_start: 0,
                data_start: MARKER_LEN,
            },
        })
    }

    /// Return the array dimensions.
    #[must_use]
    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    /// Return the chunk shape.
    #[must_use]
    pub fn chunks(&self) -> &[u64] {
        &self.chunks
    }

    /// Return the scale factor.
    #[must_use]
    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    /// Return the compression kind.
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Return the lookup table layout.
    #[must_use]
    pub fn lut(&self) -> &LutLayout {
        &self.lut
    }

    /// Return the total number of chunks.
    #[must_use]
    pub fn chunk_count(&self) -> u64 {
        std::iter::zip(&self.dims, &self.chunks)
            .map(|(d, c)| d.div_ceil(*c))
            .product()
    }
}

fn parse_u64_slice(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// A metadata error.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The byte source failed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// The file does not start with the expected magic.
    #[error("invalid magic {_0:?}, expected \"OM\"")]
    InvalidMagic([u8; 2]),
    /// The format version is not supported.
    #[error("unsupported format version {_0}")]
    UnsupportedVersion(u8),
    /// The file is too short to hold its metadata.
    #[error("file of {_0} bytes is too short to hold metadata")]
    Truncated(u64),
    /// The array has zero dimensions.
    #[error("array has zero dimensions")]
    ZeroDimensions,
    /// A dimension has zero extent.
    #[error("dimension {_0} has zero extent")]
    ZeroDimExtent(usize),
    /// The chunk shape has zero extent along a dimension.
    #[error("chunk shape has zero extent along dimension {_0}")]
    ZeroChunkExtent(usize),
    /// The compression identifier is not recognised.
    #[error("unsupported compression identifier {_0}")]
    UnsupportedCompression(u8),
    /// The scale factor is not finite and positive.
    #[error("scale factor {_0} is not finite and positive")]
    InvalidScaleFactor(f32),
    /// The lookup table offset is negative.
    #[error("lookup table offset {_0} is negative")]
    NegativeLutOffset(i64),
    /// The lookup table does not fit in the file.
    #[error("lookup table at {lut_start} with {chunk_count} entries does not fit in a file of {size} bytes")]
    LutOutOfBounds {
        /// Byte offset of the first lookup table entry.
        lut_start: u64,
        /// Number of lookup table entries.
        chunk_count: u64,
        /// Size of the file in bytes.
        size: u64,
    },
}
