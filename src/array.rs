//! Arrays.
//!
//! An [`Array`] is a chunked, compressed, multidimensional array backed by a
//! [`ByteSource`]. Opening an array parses its metadata; reading materializes
//! a hyper-rectangular slice into a caller-provided `f32` buffer positioned
//! inside a larger target cube.
//!
//! A read is planned as a sequence of lookup table reads, each covering a span
//! of chunks; within each, a sequence of compressed-data reads; within each,
//! the contained chunks are decoded in increasing order. All planning is
//! bounded by the [`ReadOptions`] I/O thresholds.

use itertools::izip;
use thiserror::Error;

use crate::{
    byte_range::ByteRange,
    chunk_grid::{ChunkGrid, ChunkWalk},
    codec::CodecError,
    decode::{decode_chunk_into, ChunkScratch},
    header::{ArrayMetadata, MetadataError},
    read_plan::{plan_data_read, plan_index_read, CorruptLutError, LutWindow, ReadOptions},
    source::{ByteSource, SourceError},
    subset::{ArraySubset, IncompatibleDimensionalityError},
};

/// A chunked compressed multidimensional array backed by a [`ByteSource`].
///
/// Reads take `&self`; concurrent reads of one array are safe because every
/// call owns its output buffer and scratch exclusively.
#[derive(Debug)]
pub struct Array<S: ByteSource> {
    source: S,
    metadata: ArrayMetadata,
    grid: ChunkGrid,
}

impl<S: ByteSource> Array<S> {
    /// Open an array, parsing its metadata from `source`.
    ///
    /// # Errors
    /// Returns a [`MetadataError`] if the source cannot be read or holds
    /// invalid metadata.
    pub fn open(source: S) -> Result<Self, MetadataError> {
        let metadata = ArrayMetadata::from_source(&source)?;
        let grid = ChunkGrid::new(metadata.dims().to_vec(), metadata.chunks().to_vec());
        Ok(Self {
            source,
            metadata,
            grid,
        })
    }

    /// Return the array metadata.
    #[must_use]
    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    /// Return the array dimensions.
    #[must_use]
    pub fn dims(&self) -> &[u64] {
        self.metadata.dims()
    }

    /// Return the chunk shape.
    #[must_use]
    pub fn chunks(&self) -> &[u64] {
        self.metadata.chunks()
    }

    /// Return the chunk grid.
    #[must_use]
    pub fn grid(&self) -> &ChunkGrid {
        &self.grid
    }

    /// Create a scratch buffer sized for this array's chunks.
    ///
    /// # Panics
    /// Panics if the chunk element count exceeds [`usize::MAX`].
    #[must_use]
    pub fn chunk_scratch(&self) -> ChunkScratch {
        ChunkScratch::with_chunk_elements(self.chunk_elements())
    }

    fn chunk_elements(&self) -> usize {
        usize::try_from(self.metadata.chunks().iter().product::<u64>()).unwrap()
    }

    /// Read the subset `read` into a newly allocated buffer of the read shape.
    ///
    /// The buffer is initialized to NaN; with an in-bounds request every
    /// element is overwritten.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the request is invalid or decoding fails.
    pub fn read(&self, read: &ArraySubset) -> Result<Vec<f32>, ReadError> {
        self.read_opt(read, &ReadOptions::default())
    }

    /// Explicit options variant of [`Array::read`].
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the request is invalid or decoding fails.
    pub fn read_opt(
        &self,
        read: &ArraySubset,
        options: &ReadOptions,
    ) -> Result<Vec<f32>, ReadError> {
        let mut into = vec![f32::NAN; read.num_elements_usize()];
        let into_lower = vec![0; read.dimensionality()];
        self.read_into_opt(&mut into, read, &into_lower, read.shape(), options)?;
        Ok(into)
    }

    /// Read the subset `read` into `into`, a cube of extents `cube` in which
    /// the read region's origin lands at `into_lower`.
    ///
    /// Elements of `into` outside the scattered region are left untouched. On
    /// error the scattered region is undefined; it may have been partially
    /// written.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the request is invalid or decoding fails.
    pub fn read_into(
        &self,
        into: &mut [f32],
        read: &ArraySubset,
        into_lower: &[u64],
        cube: &[u64],
    ) -> Result<(), ReadError> {
        self.read_into_opt(into, read, into_lower, cube, &ReadOptions::default())
    }

    /// Explicit options variant of [`Array::read_into`].
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the request is invalid or decoding fails.
    pub fn read_into_opt(
        &self,
        into: &mut [f32],
        read: &ArraySubset,
        into_lower: &[u64],
        cube: &[u64],
        options: &ReadOptions,
    ) -> Result<(), ReadError> {
        let mut scratch = self.chunk_scratch();
        self.read_into_with_scratch(into, read, into_lower, cube, options, &mut scratch)
    }

    /// [`Array::read_into_opt`] with a caller-provided scratch buffer,
    /// amortizing its allocation across many reads.
    ///
    /// # Errors
    /// Returns a [`ReadError`] if the request is invalid or decoding fails.
    pub fn read_into_with_scratch(
        &self,
        into: &mut [f32],
        read: &ArraySubset,
        into_lower: &[u64],
        cube: &[u64],
        options: &ReadOptions,
        scratch: &mut ChunkScratch,
    ) -> Result<(), ReadError> {
        let dimensionality = self.grid.dimensionality();
        if read.dimensionality() != dimensionality {
            return Err(
                IncompatibleDimensionalityError::new(read.dimensionality(), dimensionality).into(),
            );
        }
        if into_lower.len() != dimensionality {
            return Err(
                IncompatibleDimensionalityError::new(into_lower.len(), dimensionality).into(),
            );
        }
        if cube.len() != dimensionality {
            return Err(IncompatibleDimensionalityError::new(cube.len(), dimensionality).into());
        }
        if !read.inbounds(self.dims()) {
            return Err(ReadError::SubsetOutOfBounds(
                read.clone(),
                self.dims().to_vec(),
            ));
        }
        for (dim, (&lower, &count, &extent)) in
            izip!(into_lower, read.shape(), cube).enumerate()
        {
            if lower + count > extent {
                return Err(ReadError::TargetOutOfBounds {
                    dim,
                    lower,
                    count,
                    cube: extent,
                });
            }
        }
        let cube_elements: u64 = cube.iter().product();
        if into.len() as u64 != cube_elements {
            return Err(ReadError::InvalidBufferLength(into.len(), cube_elements));
        }

        scratch.ensure_chunk_elements(self.chunk_elements());
        let walk = ChunkWalk::new(&self.grid, read);
        let lut = self.metadata.lut();

        let mut chunk_index = walk.first_range();
        while let Some(index_chunks) = chunk_index {
            let index_read = plan_index_read(&walk, lut, index_chunks.clone(), options);
            let lut_bytes = self
                .source
                .read(ByteRange::FromStart(index_read.offset, Some(index_read.count)))?;
            let lut_window = LutWindow::new(&lut_bytes, index_read.chunks.clone());

            let mut chunk_data = Some(index_chunks);
            while let Some(data_chunks) = chunk_data {
                let data_read = plan_data_read(&walk, lut, &lut_window, data_chunks, options)?;
                if data_read.offset + data_read.count > self.source.size() {
                    return Err(CorruptLutError::PastEndOfSource {
                        offset: data_read.offset,
                        length: data_read.count,
                        size: self.source.size(),
                    }
                    .into());
                }
                let data = self
                    .source
                    .read(ByteRange::FromStart(data_read.offset, Some(data_read.count)))?;

                let mut cursor = 0usize;
                for chunk in data_read.chunks.clone() {
                    cursor += decode_chunk_into(
                        &self.metadata,
                        &self.grid,
                        chunk,
                        &data[cursor..],
                        read,
                        into,
                        into_lower,
                        cube,
                        scratch,
                    )?;
                }
                if cursor as u64 != data_read.count {
                    return Err(ReadError::DecodeMismatch {
                        decoded: cursor as u64,
                        planned: data_read.count,
                    });
                }
                chunk_data = data_read.next;
            }
            chunk_index = index_read.next;
        }
        Ok(())
    }
}

/// An array read error.
///
/// All read errors are fatal for the call; on error the output buffer may
/// have been partially scattered into.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The byte source failed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// Mismatched dimensionality between the request and the array.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
    /// The read region is not contained in the array.
    #[error("read region {_0} is not within the array shape {_1:?}")]
    SubsetOutOfBounds(ArraySubset, Vec<u64>),
    /// The scattered region is not contained in the target cube.
    #[error("read of {count} values at {lower} does not fit in target cube extent {cube} along dimension {dim}")]
    TargetOutOfBounds {
        /// The offending dimension.
        dim: usize,
        /// Scatter origin along the dimension.
        lower: u64,
        /// Scattered element count along the dimension.
        count: u64,
        /// Target cube extent along the dimension.
        cube: u64,
    },
    /// The output buffer does not match the target cube.
    #[error("output buffer of {_0} values does not match a target cube of {_1} values")]
    InvalidBufferLength(usize, u64),
    /// The chunk lookup table is corrupt.
    #[error(transparent)]
    CorruptLut(#[from] CorruptLutError),
    /// Chunks decoded from a data read did not consume exactly the planned
    /// bytes.
    #[error("decoded {decoded} bytes from a data read planned at {planned} bytes")]
    DecodeMismatch {
        /// Bytes consumed by the chunk decoders.
        decoded: u64,
        /// Bytes the data-read planner expected to be consumed.
        planned: u64,
    },
    /// The codec failed to decode a chunk.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
