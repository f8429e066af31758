//! Integer-sequence codecs.
//!
//! Chunk payloads go through two stages when written: [`delta2d`] pre-coding
//! over the chunk's `rows x cols` layout, then the [`pfor`] block codec over
//! the flat sequence. Decoding reverses them: [`pfor::decode`] first, then
//! [`delta2d::decode`].
//!
//! The decode contract is positional: `pfor::decode(src, n_elements, dst)`
//! is told how many values to produce (from chunk geometry) and returns how
//! many source bytes it consumed, which equals the chunk's compressed length
//! on disk. The caller uses the consumed count to advance through a buffer
//! holding several chunks back to back.

pub mod delta2d;
pub mod pfor;

use thiserror::Error;

/// Extra scratch elements beyond the decoded value count.
///
/// Block decoders may be specialised to write whole blocks; scratch buffers
/// are sized with this padding so the final partial block has room.
const DECODE_PADDING_ELEMENTS: usize = pfor::BLOCK_LEN;

/// The number of `i16` scratch elements required to decode `n_elements`.
#[must_use]
pub fn decode_scratch_elements(n_elements: usize) -> usize {
    n_elements + DECODE_PADDING_ELEMENTS
}

/// A codec error.
#[derive(Copy, Clone, Debug, Error)]
pub enum CodecError {
    /// The compressed stream ended with values outstanding.
    #[error("compressed data ended at byte {_0} with values outstanding")]
    UnexpectedEof(usize),
    /// A block header declared an impossible bit width.
    #[error("invalid bit width {_0} in block header")]
    InvalidBitWidth(u8),
    /// The scratch buffer cannot hold the decoded values.
    #[error("scratch of {_0} elements cannot hold {_1} decoded values")]
    ScratchTooSmall(usize, usize),
}
