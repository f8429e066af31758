//! Chunk-space geometry.
//!
//! Pure arithmetic over array dimensions, a chunk shape, and a read region;
//! no I/O happens here.
//!
//! Chunks are numbered by a single flat index with the last dimension varying
//! fastest. [`ChunkWalk`] enumerates the *linear runs* of chunk numbers that
//! intersect a read region: maximal spans of consecutive chunk numbers that
//! all overlap the region, which the read planners then coalesce into I/O
//! operations.

use std::{iter::FusedIterator, ops::Range};

use itertools::izip;

use crate::subset::ArraySubset;

/// The regular chunk grid of an array.
#[derive(Clone, Debug)]
pub struct ChunkGrid {
    dims: Vec<u64>,
    chunks: Vec<u64>,
    n_chunks: Vec<u64>,
}

impl ChunkGrid {
    /// Create a new chunk grid.
    ///
    /// `dims` and `chunks` must have the same length and all extents must be
    /// non-zero; this is guaranteed by validated
    /// [`ArrayMetadata`](crate::header::ArrayMetadata).
    #[must_use]
    pub fn new(dims: Vec<u64>, chunks: Vec<u64>) -> Self {
        debug_assert_eq!(dims.len(), chunks.len());
        debug_assert!(dims.iter().all(|&d| d > 0));
        debug_assert!(chunks.iter().all(|&c| c > 0));
        let n_chunks = std::iter::zip(&dims, &chunks)
            .map(|(d, c)| d.div_ceil(*c))
            .collect();
        Self {
            dims,
            chunks,
            n_chunks,
        }
    }

    /// Return the dimensionality of the grid.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.dims.len()
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

    /// Return the number of chunks along dimension `dim`.
    #[must_use]
    pub fn n_chunks(&self, dim: usize) -> u64 {
        self.n_chunks[dim]
    }

    /// Return the total number of chunks.
    #[must_use]
    pub fn chunk_count(&self) -> u64 {
        self.n_chunks.iter().product()
    }

    /// Return the flat-index stride of dimension `dim`: the number of chunks
    /// spanned by one step along it.
    #[must_use]
    pub fn stride(&self, dim: usize) -> u64 {
        self.n_chunks[dim + 1..].iter().product()
    }

    /// Return the per-dimension coordinates of `chunk`.
    #[must_use]
    pub fn chunk_coords(&self, chunk: u64) -> Vec<u64> {
        debug_assert!(chunk < self.chunk_count());
        let mut coords = vec![0; self.dimensionality()];
        let mut remainder = chunk;
        for (coord, n_chunks) in std::iter::zip(coords.iter_mut(), &self.n_chunks).rev() {
            *coord = remainder % n_chunks;
            remainder /= n_chunks;
        }
        coords
    }

    /// Return the flat chunk number of per-dimension chunk `coords`.
    #[must_use]
    pub fn chunk_number(&self, coords: &[u64]) -> u64 {
        debug_assert_eq!(coords.len(), self.dimensionality());
        std::iter::zip(coords, &self.n_chunks).fold(0, |acc, (coord, n_chunks)| {
            debug_assert!(coord < n_chunks);
            acc * n_chunks + coord
        })
    }

    /// Return the region of the array covered by `chunk`, clamped to the array
    /// bounds (chunks at the upper boundary of a dimension may be short).
    #[must_use]
    pub fn chunk_subset(&self, chunk: u64) -> ArraySubset {
        let coords = self.chunk_coords(chunk);
        let ranges: Vec<Range<u64>> = izip!(&coords, &self.chunks, &self.dims)
            .map(|(coord, chunk_extent, dim)| {
                let origin = coord * chunk_extent;
                origin..(*dim).min(origin + chunk_extent)
            })
            .collect();
        ArraySubset::new_with_ranges(&ranges)
    }
}

/// Enumerates the linear runs of chunk numbers intersecting a read region.
///
/// A run is a span of consecutive chunk numbers that all overlap the region.
/// Runs grow as products of fully-read fast dimensions and collapse at the
/// slowest dimension that is only partially read.
#[derive(Clone, Debug)]
pub struct ChunkWalk<'a> {
    grid: &'a ChunkGrid,
    /// Per-dimension chunk coordinate windows intersecting the read region.
    window: Vec<Range<u64>>,
    /// Per-dimension flag: the read region covers the entire dimension.
    full: Vec<bool>,
}

impl<'a> ChunkWalk<'a> {
    /// Create a new walk of the chunks intersecting `read`.
    #[must_use]
    pub fn new(grid: &'a ChunkGrid, read: &ArraySubset) -> Self {
        debug_assert_eq!(read.dimensionality(), grid.dimensionality());
        let window = izip!(read.start(), read.shape(), grid.chunks())
            .map(|(start, count, chunk_extent)| {
                let lower = start / chunk_extent;
                if *count == 0 {
                    lower..lower
                } else {
                    lower..(start + count).div_ceil(*chunk_extent)
                }
            })
            .collect();
        let full = izip!(read.start(), read.shape(), grid.dims())
            .map(|(&start, &count, &dim)| start == 0 && count == dim)
            .collect();
        Self { grid, window, full }
    }

    /// The slowest dimension that is only partially read while all faster
    /// dimensions are fully read, i.e. the dimension a linear run collapses
    /// at. [`None`] if the entire array is read (the whole grid is one run).
    fn collapse_dim(&self) -> Option<usize> {
        (0..self.grid.dimensionality())
            .rev()
            .find(|&dim| !self.full[dim])
    }

    /// Return the first linear run of chunk numbers intersecting the region,
    /// or [`None`] if the region is empty.
    #[must_use]
    pub fn first_range(&self) -> Option<Range<u64>> {
        if self.window.iter().any(|window| window.start >= window.end) {
            return None;
        }
        let mut start = 0;
        let mut end = 1;
        for (window, &full, &n_chunks) in izip!(&self.window, &self.full, &self.grid.n_chunks) {
            start = start * n_chunks + window.start;
            if full {
                end *= n_chunks;
            } else {
                end = start + (window.end - window.start);
            }
        }
        Some(start..end)
    }

    /// Given the `last` chunk of the current run, return the next linear run
    /// of intersecting chunk numbers, or [`None`] once the walk overflows the
    /// slowest dimension.
    #[must_use]
    pub fn next_range(&self, last: u64) -> Option<Range<u64>> {
        let collapse = self.collapse_dim()?;
        let mut coords = self.grid.chunk_coords(last);

        // Carry-increment the dimensions slower than the collapse dimension.
        let mut dim = collapse;
        loop {
            if dim == 0 {
                return None;
            }
            dim -= 1;
            coords[dim] += 1;
            if coords[dim] < self.window[dim].end {
                break;
            }
            coords[dim] = self.window[dim].start;
        }
        // The collapse dimension and everything faster restart at their window
        // starts (full windows start at zero).
        for dim in collapse..self.grid.dimensionality() {
            coords[dim] = self.window[dim].start;
        }

        let start = self.grid.chunk_number(&coords);
        let length =
            (self.window[collapse].end - self.window[collapse].start) * self.grid.stride(collapse);
        Some(start..start + length)
    }

    /// Return an iterator over all linear runs.
    #[must_use]
    pub fn runs(&self) -> Runs<'_> {
        Runs {
            walk: self,
            next: self.first_range(),
        }
    }
}

/// An iterator over the linear runs of a [`ChunkWalk`].
pub struct Runs<'a> {
    walk: &'a ChunkWalk<'a>,
    next: Option<Range<u64>>,
}

impl Iterator for Runs<'_> {
    type Item = Range<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        let run = self.next.take()?;
        self.next = self.walk.next_range(run.end - 1);
        Some(run)
    }
}

impl FusedIterator for Runs<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_grid_geometry() {
        let grid = ChunkGrid::new(vec![10, 10, 10], vec![4, 4, 4]);
        assert_eq!(grid.dimensionality(), 3);
        assert_eq!(grid.n_chunks(0), 3);
        assert_eq!(grid.chunk_count(), 27);
        assert_eq!(grid.stride(0), 9);
        assert_eq!(grid.stride(2), 1);

        assert_eq!(grid.chunk_coords(0), vec![0, 0, 0]);
        assert_eq!(grid.chunk_coords(26), vec![2, 2, 2]);
        assert_eq!(grid.chunk_coords(11), vec![1, 0, 2]);
        assert_eq!(grid.chunk_number(&[1, 0, 2]), 11);

        // Interior chunk is full sized, boundary chunks are short.
        assert_eq!(
            grid.chunk_subset(0),
            ArraySubset::new_with_ranges(&[0..4, 0..4, 0..4])
        );
        assert_eq!(
            grid.chunk_subset(26),
            ArraySubset::new_with_ranges(&[8..10, 8..10, 8..10])
        );
    }

    #[test]
    fn chunk_walk_full_region_is_one_run() {
        let grid = ChunkGrid::new(vec![10, 10], vec![4, 4]);
        let read = ArraySubset::new_with_shape(vec![10, 10]);
        let walk = ChunkWalk::new(&grid, &read);
        assert_eq!(walk.first_range(), Some(0..9));
        assert_eq!(walk.next_range(8), None);
    }

    #[test]
    fn chunk_walk_partial_fastest_dimension() {
        // 3x3 chunk grid, reading the middle chunk column: one run per row.
        let grid = ChunkGrid::new(vec![10, 10], vec![4, 4]);
        let read = ArraySubset::new_with_ranges(&[0..10, 4..8]);
        let walk = ChunkWalk::new(&grid, &read);
        assert_eq!(walk.runs().collect::<Vec<_>>(), vec![1..2, 4..5, 7..8]);
    }

    #[test]
    fn chunk_walk_partial_slow_dimension() {
        // Slow dimension partial, fast dimension full: one run spanning rows.
        let grid = ChunkGrid::new(vec![10, 10], vec![4, 4]);
        let read = ArraySubset::new_with_ranges(&[4..8, 0..10]);
        let walk = ChunkWalk::new(&grid, &read);
        assert_eq!(walk.runs().collect::<Vec<_>>(), vec![3..6]);
    }

    #[test]
    fn chunk_walk_three_dimensions() {
        // Chunk windows [0..3, 0..3, 0..2] in a 3x3x3 grid: 9 runs of 2.
        let grid = ChunkGrid::new(vec![10, 10, 10], vec![4, 4, 4]);
        let read = ArraySubset::new_with_ranges(&[0..10, 0..10, 3..7]);
        let walk = ChunkWalk::new(&grid, &read);
        let runs: Vec<_> = walk.runs().collect();
        assert_eq!(runs.len(), 9);
        assert_eq!(runs[0], 0..2);
        assert_eq!(runs[1], 3..5);
        assert_eq!(runs[8], 24..26);
    }

    #[test]
    fn chunk_walk_interior_block() {
        // Every chunk is touched, but the partially read slow dimension still
        // splits the walk into one run per chunk row.
        let grid = ChunkGrid::new(vec![4, 4], vec![2, 2]);
        let read = ArraySubset::new_with_ranges(&[1..3, 1..3]);
        let walk = ChunkWalk::new(&grid, &read);
        assert_eq!(walk.runs().collect::<Vec<_>>(), vec![0..2, 2..4]);
    }

    #[test]
    fn chunk_walk_empty_region() {
        let grid = ChunkGrid::new(vec![10], vec![4]);
        let read = ArraySubset::new_with_ranges(&[5..5]);
        let walk = ChunkWalk::new(&grid, &read);
        assert_eq!(walk.first_range(), None);
    }

    #[test]
    fn chunk_walk_tiles_every_chunk_once() {
        for (dims, chunks) in [
            (vec![5], vec![2]),
            (vec![4, 4], vec![2, 2]),
            (vec![10, 10, 10], vec![4, 4, 4]),
            (vec![7, 3, 5], vec![2, 3, 4]),
        ] {
            let grid = ChunkGrid::new(dims.clone(), chunks);
            let read = ArraySubset::new_with_shape(dims);
            let walk = ChunkWalk::new(&grid, &read);
            let visited: Vec<u64> = walk.runs().flatten().collect();
            assert_eq!(visited, (0..grid.chunk_count()).collect::<Vec<u64>>());
        }
    }
}
