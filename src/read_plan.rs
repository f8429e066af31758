//! Read planning.
//!
//! Two planners turn the chunk runs of a [`ChunkWalk`] into bounded I/O
//! operations:
//!
//! - the *index-read* planner coalesces lookup table accesses into contiguous
//!   LUT byte ranges,
//! - the *data-read* planner coalesces the compressed bytes of consecutive
//!   chunks into contiguous data byte ranges.
//!
//! Both merge further chunks while the byte gap stays within
//! [`ReadOptions::io_size_merge`] and the total read stays within
//! [`ReadOptions::io_size_max`]. Merged reads may span chunks that do not
//! intersect the read region at all; the decoder skips their values but still
//! advances its byte cursor through them.

use std::ops::Range;

use thiserror::Error;

use crate::{
    byte_range::{ByteLength, ByteOffset},
    chunk_grid::ChunkWalk,
    header::{LutLayout, LUT_ENTRY_SIZE},
};

/// Options for a read call.
///
/// The defaults suit storage with a per-request latency cost (local SSDs,
/// object stores); tests lower them to force fragmented reads.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    io_size_merge: u64,
    io_size_max: u64,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            io_size_merge: 512,
            io_size_max: 65536,
        }
    }
}

impl ReadOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the maximum byte gap merged into a single read.
    #[must_use]
    pub fn io_size_merge(&self) -> u64 {
        self.io_size_merge
    }

    /// Set the maximum byte gap merged into a single read.
    pub fn set_io_size_merge(&mut self, io_size_merge: u64) -> &mut Self {
        self.io_size_merge = io_size_merge;
        self
    }

    /// Set the maximum byte gap merged into a single read.
    #[must_use]
    pub fn with_io_size_merge(mut self, io_size_merge: u64) -> Self {
        self.io_size_merge = io_size_merge;
        self
    }

    /// Return the target maximum size of a single read in bytes.
    ///
    /// A read covering a single chunk may exceed this.
    #[must_use]
    pub fn io_size_max(&self) -> u64 {
        self.io_size_max
    }

    /// Set the target maximum size of a single read in bytes.
    pub fn set_io_size_max(&mut self, io_size_max: u64) -> &mut Self {
        self.io_size_max = io_size_max;
        self
    }

    /// Set the target maximum size of a single read in bytes.
    #[must_use]
    pub fn with_io_size_max(mut self, io_size_max: u64) -> Self {
        self.io_size_max = io_size_max;
        self
    }
}

/// A planned read of a contiguous region of the lookup table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct IndexRead {
    /// Absolute byte offset of the read.
    pub offset: ByteOffset,
    /// Length of the read in bytes.
    pub count: ByteLength,
    /// The chunk numbers whose byte bounds the read resolves.
    pub chunks: Range<u64>,
    /// The next chunk run to plan an index read for, if any.
    pub next: Option<Range<u64>>,
}

/// A planned read of a contiguous span of compressed chunk data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct DataRead {
    /// Absolute byte offset of the read.
    pub offset: ByteOffset,
    /// Length of the read in bytes.
    pub count: ByteLength,
    /// The chunk numbers whose compressed bytes the read contains.
    pub chunks: Range<u64>,
    /// The next chunk run to plan a data read for within the same index read,
    /// if any.
    pub next: Option<Range<u64>>,
}

/// A corrupt lookup table error.
#[derive(Copy, Clone, Debug, Error)]
pub enum CorruptLutError {
    /// Lookup table entries decreased.
    #[error("lookup table is not monotonic at chunk {chunk}: start {start} exceeds end {end}")]
    NonMonotonic {
        /// The chunk whose byte bounds are inverted.
        chunk: u64,
        /// The resolved start offset.
        start: u64,
        /// The resolved end offset.
        end: u64,
    },
    /// A planned data read extends past the end of the byte source.
    #[error("chunk data at {offset} of {length} bytes extends past the end of the source ({size} bytes)")]
    PastEndOfSource {
        /// Absolute byte offset of the read.
        offset: u64,
        /// Length of the read in bytes.
        length: u64,
        /// Size of the byte source in bytes.
        size: u64,
    },
}

/// Lookup table bytes held in memory, resolved against the chunk range they
/// cover.
pub(crate) struct LutWindow<'a> {
    bytes: &'a [u8],
    chunks: Range<u64>,
}

impl<'a> LutWindow<'a> {
    pub(crate) fn new(bytes: &'a [u8], chunks: Range<u64>) -> Self {
        debug_assert_eq!(
            bytes.len() as u64,
            (chunks.end - first_slot(chunks.start)) * LUT_ENTRY_SIZE
        );
        Self { bytes, chunks }
    }

    pub(crate) fn chunks(&self) -> &Range<u64> {
        &self.chunks
    }

    fn entry(&self, slot: u64) -> u64 {
        let offset = usize::try_from((slot - first_slot(self.chunks.start)) * LUT_ENTRY_SIZE)
            .unwrap();
        u64::from_le_bytes(self.bytes[offset..offset + 8].try_into().unwrap())
    }

    /// Return the byte interval of `chunk` within the data region.
    ///
    /// # Errors
    /// Returns [`CorruptLutError::NonMonotonic`] if the interval is inverted.
    pub(crate) fn chunk_bounds(&self, chunk: u64) -> Result<(u64, u64), CorruptLutError> {
        debug_assert!(self.chunks.contains(&chunk));
        let start = if chunk == 0 { 0 } else { self.entry(chunk - 1) };
        let end = self.entry(chunk);
        if end < start {
            Err(CorruptLutError::NonMonotonic { chunk, start, end })
        } else {
            Ok((start, end))
        }
    }
}

/// The first lookup table slot needed to resolve chunks starting at `chunk`:
/// the slot before it (whose entry is its start offset), except for chunk 0
/// whose start is the implicit zero.
fn first_slot(chunk: u64) -> u64 {
    chunk.saturating_sub(1)
}

/// Plan a single lookup table read starting at the run `chunk_range`.
pub(crate) fn plan_index_read(
    walk: &ChunkWalk<'_>,
    lut: &LutLayout,
    chunk_range: Range<u64>,
    options: &ReadOptions,
) -> IndexRead {
    let first = chunk_range.start;
    let slot0 = first_slot(first);
    // The last chunk whose slot fits under io_size_max; always cover at least
    // the first chunk so the planner makes progress.
    let max_slots = (options.io_size_max() / LUT_ENTRY_SIZE).max(1);
    let cap_end = (slot0 + max_slots).max(first + 1);

    let mut run = chunk_range;
    let end;
    let next;
    loop {
        if run.end > cap_end {
            // The run does not fit; split it and continue from the remainder.
            end = cap_end;
            next = Some(end..run.end);
            break;
        }
        let covered_end = run.end;
        match walk.next_range(covered_end - 1) {
            None => {
                end = covered_end;
                next = None;
                break;
            }
            Some(next_run) => {
                let gap_bytes = (next_run.start - covered_end) * LUT_ENTRY_SIZE;
                let needed = (next_run.start + 1 - slot0) * LUT_ENTRY_SIZE;
                if gap_bytes > options.io_size_merge() || needed > options.io_size_max() {
                    end = covered_end;
                    next = Some(next_run);
                    break;
                }
                run = next_run;
            }
        }
    }

    IndexRead {
        offset: lut.lut_start() + slot0 * LUT_ENTRY_SIZE,
        count: (end - slot0) * LUT_ENTRY_SIZE,
        chunks: first..end,
        next,
    }
}

/// Plan a single compressed-data read starting at the run `cursor`, using
/// lookup table bytes already in memory.
///
/// # Errors
/// Returns [`CorruptLutError::NonMonotonic`] if the lookup table entries are
/// not non-decreasing over the planned chunks.
pub(crate) fn plan_data_read(
    walk: &ChunkWalk<'_>,
    lut: &LutLayout,
    lut_window: &LutWindow<'_>,
    cursor: Range<u64>,
    options: &ReadOptions,
) -> Result<DataRead, CorruptLutError> {
    let index_range = lut_window.chunks();
    let first = cursor.start;
    debug_assert!(index_range.contains(&first));

    let (start_pos, mut end_pos) = lut_window.chunk_bounds(first)?;
    let mut last = first;
    let mut run = cursor;
    let next = loop {
        // The candidate is the successor within the current run, or the first
        // chunk of the next run.
        let (candidate, candidate_run) = if last + 1 < run.end {
            (last + 1, run.clone())
        } else if let Some(next_run) = walk.next_range(last) {
            (next_run.start, next_run)
        } else {
            break None;
        };
        if candidate >= index_range.end {
            // Beyond the lookup table bytes in memory; the session plans a
            // fresh index read for the remaining chunks.
            break None;
        }
        let (candidate_start, candidate_end) = lut_window.chunk_bounds(candidate)?;
        if candidate_start < end_pos {
            return Err(CorruptLutError::NonMonotonic {
                chunk: candidate,
                start: candidate_start,
                end: end_pos,
            });
        }
        if candidate_end - start_pos > options.io_size_max()
            || candidate_start - end_pos > options.io_size_merge()
        {
            break Some(candidate..candidate_run.end);
        }
        end_pos = candidate_end;
        last = candidate;
        run = candidate_run;
    };

    Ok(DataRead {
        offset: lut.data_start() + start_pos,
        count: end_pos - start_pos,
        chunks: first..last + 1,
        next,
    })
}
