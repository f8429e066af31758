//! Per-chunk decoding: decompress, reverse pre-coding, unscale and scatter.

use itertools::izip;

use crate::{
    chunk_grid::ChunkGrid,
    codec::{self, delta2d, pfor, CodecError},
    header::{ArrayMetadata, Compression},
    subset::ArraySubset,
};

/// Scratch space for decompressed chunk values.
///
/// Sized for the largest chunk of an array plus codec padding. One read call
/// owns its scratch exclusively; a caller can hold one and reuse it across
/// calls to amortize the allocation.
#[derive(Debug)]
pub struct ChunkScratch {
    values: Vec<i16>,
}

impl ChunkScratch {
    /// Create scratch for chunks of up to `chunk_elements` values.
    #[must_use]
    pub fn with_chunk_elements(chunk_elements: usize) -> Self {
        Self {
            values: vec![0; codec::decode_scratch_elements(chunk_elements)],
        }
    }

    /// Grow the scratch if it cannot hold `chunk_elements` decoded values.
    pub(crate) fn ensure_chunk_elements(&mut self, chunk_elements: usize) {
        let required = codec::decode_scratch_elements(chunk_elements);
        if self.values.len() < required {
            self.values.resize(required, 0);
        }
    }
}

/// Decode one chunk from `compressed` and scatter its elements intersecting
/// `read` into `into`, a cube of extents `cube` in which the read region's
/// origin lands at `into_lower`.
///
/// Returns the number of compressed bytes consumed, which the session uses to
/// advance through a data read holding several chunks back to back. A chunk
/// sharing no elements with `read` (read only because of I/O coalescing) is
/// still decompressed so the cursor advances, but nothing is scattered.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_chunk_into(
    metadata: &ArrayMetadata,
    grid: &ChunkGrid,
    chunk: u64,
    compressed: &[u8],
    read: &ArraySubset,
    into: &mut [f32],
    into_lower: &[u64],
    cube: &[u64],
    scratch: &mut ChunkScratch,
) -> Result<usize, CodecError> {
    let n = grid.dimensionality();
    let coords = grid.chunk_coords(chunk);

    // Intersect the chunk with the read region, fastest dimension last:
    // the clamped local window [local_start, local_end) within the chunk and
    // the corresponding origin inside the target cube.
    let mut lengths = vec![0u64; n];
    let mut local_start = vec![0u64; n];
    let mut local_end = vec![0u64; n];
    let mut cube_origin = vec![0u64; n];
    let mut no_data = false;
    for (i, (&coord, &chunk_extent, &dim, &read_start, &read_count)) in izip!(
        &coords,
        metadata.chunks(),
        metadata.dims(),
        read.start(),
        read.shape()
    )
    .enumerate()
    {
        let origin = coord * chunk_extent;
        let length = dim.min(origin + chunk_extent) - origin;
        lengths[i] = length;
        let clamped_start = read_start.max(origin);
        let clamped_end = (read_start + read_count).min(origin + length);
        if clamped_end <= clamped_start {
            no_data = true;
            continue;
        }
        local_start[i] = clamped_start - origin;
        local_end[i] = clamped_end - origin;
        cube_origin[i] = into_lower[i] + (clamped_start - read_start);
    }

    let n_elements = usize::try_from(lengths.iter().product::<u64>()).unwrap();
    let consumed = pfor::decode(compressed, n_elements, &mut scratch.values)?;
    if no_data {
        return Ok(consumed);
    }

    let length_last = usize::try_from(lengths[n - 1]).unwrap();
    delta2d::decode(
        n_elements / length_last,
        length_last,
        &mut scratch.values[..n_elements],
    );

    // Element strides of each dimension within the chunk and within the cube.
    let mut chunk_stride = vec![1u64; n];
    let mut cube_stride = vec![1u64; n];
    for i in (0..n.saturating_sub(1)).rev() {
        chunk_stride[i] = chunk_stride[i + 1] * lengths[i + 1];
        cube_stride[i] = cube_stride[i + 1] * cube[i + 1];
    }

    // The longest run of elements consecutive in both the chunk and the cube.
    // Trailing dimensions fold into the run while both sides cover them in
    // full; the fastest dimension contributes its window even when partial.
    let mut linear_run = 1u64;
    let mut fold_from = n;
    let mut contiguous = true;
    for i in (0..n).rev() {
        if !contiguous {
            break;
        }
        let window = local_end[i] - local_start[i];
        linear_run *= window;
        fold_from = i;
        contiguous = local_start[i] == 0
            && window == lengths[i]
            && cube_origin[i] == 0
            && window == cube[i];
    }
    let run = usize::try_from(linear_run).unwrap();

    let mut chunk_offset: u64 = izip!(&local_start, &chunk_stride).map(|(a, b)| a * b).sum();
    let mut cube_offset: u64 = izip!(&cube_origin, &cube_stride).map(|(a, b)| a * b).sum();
    let mut local = local_start.clone();
    let compression = metadata.compression();
    let scale_factor = metadata.scale_factor();
    loop {
        let src = &scratch.values[usize::try_from(chunk_offset).unwrap()..][..run];
        let dst = &mut into[usize::try_from(cube_offset).unwrap()..][..run];
        unscale_into(src, dst, compression, scale_factor);

        // Advance to the next run, walking dimensions fastest to slowest and
        // carrying into the next slower dimension on rollover.
        let mut i = fold_from;
        loop {
            if i == 0 {
                return Ok(consumed);
            }
            i -= 1;
            local[i] += 1;
            chunk_offset += chunk_stride[i];
            cube_offset += cube_stride[i];
            if local[i] < local_end[i] {
                break;
            }
            let window = local_end[i] - local_start[i];
            local[i] = local_start[i];
            chunk_offset -= window * chunk_stride[i];
            cube_offset -= window * cube_stride[i];
        }
    }
}

fn unscale_into(src: &[i16], dst: &mut [f32], compression: Compression, scale_factor: f32) {
    match compression {
        Compression::LinearQuantized => {
            for (out, &value) in std::iter::zip(dst, src) {
                *out = if value == i16::MAX {
                    f32::NAN
                } else {
                    f32::from(value) / scale_factor
                };
            }
        }
        Compression::LogarithmicQuantized => {
            for (out, &value) in std::iter::zip(dst, src) {
                *out = if value == i16::MAX {
                    f32::NAN
                } else {
                    10f32.powf(f32::from(value) / scale_factor) - 1.0
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unscale_linear() {
        let mut out = [0f32; 4];
        unscale_into(
            &[-40, 0, 25, i16::MAX],
            &mut out,
            Compression::LinearQuantized,
            20.0,
        );
        assert_eq!(out[0], -2.0);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[2], 1.25);
        assert!(out[3].is_nan());
    }

    #[test]
    fn unscale_logarithmic() {
        let mut out = [0f32; 3];
        unscale_into(
            &[0, 2, i16::MAX],
            &mut out,
            Compression::LogarithmicQuantized,
            2.0,
        );
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 9.0).abs() < 1e-4);
        assert!(out[2].is_nan());
    }
}
