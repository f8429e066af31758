//! Two-dimensional delta pre-coding.
//!
//! A chunk's values are treated as a `rows x cols` window, `cols` being the
//! chunk's fastest dimension. Before the [`pfor`](super::pfor) codec runs,
//! every row is differenced against the row above it; combined with the
//! codec's in-row deltas the stored values are second-order differences,
//! which compress well for smooth fields.

/// Reverse the row-wise delta coding of a `rows x cols` window in place.
///
/// # Panics
/// Panics if `values` holds fewer than `rows * cols` elements.
pub fn decode(rows: usize, cols: usize, values: &mut [i16]) {
    assert!(rows * cols <= values.len());
    for row in 1..rows {
        let (above, current) = values.split_at_mut(row * cols);
        let above = &above[(row - 1) * cols..];
        for (value, &previous) in std::iter::zip(&mut current[..cols], above) {
            *value = value.wrapping_add(previous);
        }
    }
}

/// Apply the row-wise delta coding of a `rows x cols` window in place.
///
/// The exact inverse of [`decode`].
///
/// # Panics
/// Panics if `values` holds fewer than `rows * cols` elements.
pub fn encode(rows: usize, cols: usize, values: &mut [i16]) {
    assert!(rows * cols <= values.len());
    for row in (1..rows).rev() {
        let (above, current) = values.split_at_mut(row * cols);
        let above = &above[(row - 1) * cols..];
        for (value, &previous) in std::iter::zip(&mut current[..cols], above) {
            *value = value.wrapping_sub(previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_accumulates_rows() {
        let mut values = [1, 2, 3, 1, 1, 1, 0, -1, -2];
        decode(3, 3, &mut values);
        assert_eq!(values, [1, 2, 3, 2, 3, 4, 2, 2, 2]);
    }

    #[test]
    fn round_trip() {
        let original: Vec<i16> = (0..60).map(|i| (i * i % 251) as i16).collect();
        for (rows, cols) in [(1, 60), (60, 1), (4, 15), (12, 5)] {
            let mut values = original.clone();
            encode(rows, cols, &mut values);
            decode(rows, cols, &mut values);
            assert_eq!(values, original);
        }
    }

    #[test]
    fn round_trip_wrapping() {
        let original = vec![i16::MIN, i16::MAX, -1, 1];
        let mut values = original.clone();
        encode(2, 2, &mut values);
        decode(2, 2, &mut values);
        assert_eq!(values, original);
    }
}
