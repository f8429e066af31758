//! `omread` is a Rust library for reading chunked, compressed,
//! multidimensional arrays.
//!
//! The on-disk format stores a rank-N array as a rank-N grid of independently
//! compressed chunks plus a lookup table (LUT) of cumulative chunk byte ends.
//! Values are 16-bit quantized floats, delta pre-coded and bit-packed. Two
//! format versions are supported; see [`header`] for the byte layouts.
//!
//! Reading an arbitrary hyper-rectangular slice touches only the chunks that
//! intersect it. The read planner coalesces LUT and compressed-data accesses
//! into I/O operations bounded by the [`ReadOptions`] merge and size
//! thresholds, which makes small slices of huge arrays cheap on
//! high-latency storage.
//!
//! ## Usage
//!
//! Open an [`Array`] over a [`ByteSource`] ([`FileByteSource`] for a file on
//! disk, [`MemoryByteSource`] for bytes in memory) and read subsets of it:
//! [`Array::read`] materializes a subset into a new buffer of the subset's
//! shape, [`Array::read_into`] scatters it into a caller-provided buffer at a
//! chosen position inside a larger target cube.
//!
//! The core is single threaded and synchronous. Concurrent reads of one
//! [`Array`] are safe; each call owns its output and scratch exclusively.

pub mod array;
pub mod byte_range;
pub mod chunk_grid;
pub mod codec;
mod decode;
pub mod header;
pub mod read_plan;
pub mod source;
pub mod subset;

pub use crate::{
    array::{Array, ReadError},
    decode::ChunkScratch,
    header::{ArrayMetadata, Compression, LutLayout, MetadataError},
    read_plan::{CorruptLutError, ReadOptions},
    source::{ByteSource, Bytes, FileByteSource, MemoryByteSource, SourceError},
    subset::ArraySubset,
};
