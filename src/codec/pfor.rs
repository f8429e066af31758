//! A 16-bit block codec: zigzag-encoded first-order deltas, bit-packed in
//! fixed-size blocks.
//!
//! Values are delta-coded against their predecessor (carried across blocks,
//! starting from zero), zigzag-mapped to unsigned, and packed little-endian at
//! a per-block bit width. Each block is a one-byte width header followed by
//! `ceil(width * block_len / 8)` payload bytes; runs of equal values pack to a
//! width of zero and cost a single header byte per block.

use super::CodecError;

/// Values per block; each block carries its own bit width.
pub const BLOCK_LEN: usize = 128;

fn zigzag(value: i16) -> u16 {
    ((i32::from(value) << 1) ^ (i32::from(value) >> 15)) as u16
}

fn unzigzag(value: u16) -> i16 {
    ((value >> 1) ^ (value & 1).wrapping_neg()) as i16
}

/// Return the worst-case encoded size of `n_elements` values.
#[must_use]
pub fn encoded_bound(n_elements: usize) -> usize {
    2 * n_elements + n_elements.div_ceil(BLOCK_LEN)
}

/// Encode `values`, returning the compressed bytes.
#[must_use]
pub fn encode(values: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_bound(values.len()));
    let mut previous: i16 = 0;
    for block in values.chunks(BLOCK_LEN) {
        let mut zigzagged = [0u16; BLOCK_LEN];
        let mut width = 0u32;
        for (slot, &value) in std::iter::zip(zigzagged.iter_mut(), block) {
            let delta = value.wrapping_sub(previous);
            previous = value;
            *slot = zigzag(delta);
            width = width.max(16 - (*slot).leading_zeros());
        }
        out.push(width as u8);

        let mut accumulator: u64 = 0;
        let mut bits: u32 = 0;
        for &value in &zigzagged[..block.len()] {
            accumulator |= u64::from(value) << bits;
            bits += width;
            while bits >= 8 {
                out.push(accumulator as u8);
                accumulator >>= 8;
                bits -= 8;
            }
        }
        if bits > 0 {
            out.push(accumulator as u8);
        }
    }
    out
}

/// Decode `n_elements` values from `src` into `dst`.
///
/// Returns the number of source bytes consumed, which equals the length of
/// the corresponding [`encode`] output.
///
/// # Errors
/// Returns a [`CodecError`] if `src` is truncated, a block header is invalid,
/// or `dst` is too small.
pub fn decode(src: &[u8], n_elements: usize, dst: &mut [i16]) -> Result<usize, CodecError> {
    if dst.len() < n_elements {
        return Err(CodecError::ScratchTooSmall(dst.len(), n_elements));
    }
    let mut position = 0usize;
    let mut previous: i16 = 0;
    let mut produced = 0usize;
    while produced < n_elements {
        let &width = src
            .get(position)
            .ok_or(CodecError::UnexpectedEof(position))?;
        position += 1;
        if width > 16 {
            return Err(CodecError::InvalidBitWidth(width));
        }
        let width = u32::from(width);
        let block_len = BLOCK_LEN.min(n_elements - produced);
        let payload_len = (width as usize * block_len).div_ceil(8);
        let payload = src
            .get(position..position + payload_len)
            .ok_or(CodecError::UnexpectedEof(src.len()))?;

        let mask = if width == 0 { 0 } else { (1u64 << width) - 1 };
        let mut accumulator: u64 = 0;
        let mut bits: u32 = 0;
        let mut payload_position = 0usize;
        for slot in &mut dst[produced..produced + block_len] {
            while bits < width {
                accumulator |= u64::from(payload[payload_position]) << bits;
                payload_position += 1;
                bits += 8;
            }
            let value = previous.wrapping_add(unzigzag((accumulator & mask) as u16));
            accumulator >>= width;
            bits -= width;
            previous = value;
            *slot = value;
        }
        position += payload_len;
        produced += block_len;
    }
    Ok(position)
}
