//! Test-support writer: produces version 2 and version 3 files from float
//! arrays, mirroring the decode pipeline in reverse (quantize, delta
//! pre-code, block compress, assemble the lookup table and metadata).

use omread::{
    codec::{delta2d, pfor},
    Compression,
};

/// Quantize a float the way the writer side of the format does.
pub fn quantize(value: f32, scale_factor: f32, compression: Compression) -> i16 {
    if value.is_nan() {
        return i16::MAX;
    }
    let scaled = match compression {
        Compression::LinearQuantized => value * scale_factor,
        Compression::LogarithmicQuantized => (value + 1.0).log10() * scale_factor,
    };
    // i16::MAX is the NaN sentinel, so finite values saturate one below it.
    scaled
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX - 1)) as i16
}

/// Gather the elements of the row-major `values` array lying in the box
/// `[origin, origin + lengths)`, in row-major order.
pub fn gather(values: &[f32], dims: &[u64], origin: &[u64], lengths: &[u64]) -> Vec<f32> {
    let n = dims.len();
    let mut strides = vec![1u64; n];
    for i in (0..n.saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    let n_elements: u64 = lengths.iter().product();
    let mut out = Vec::with_capacity(n_elements as usize);
    if n_elements == 0 {
        return out;
    }
    let mut local = vec![0u64; n];
    loop {
        let index: u64 = (0..n).map(|i| (origin[i] + local[i]) * strides[i]).sum();
        out.push(values[index as usize]);
        let mut i = n;
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            local[i] += 1;
            if local[i] < lengths[i] {
                break;
            }
            local[i] = 0;
        }
    }
}

/// Write a complete file of the given `version` (2 or 3).
pub fn write_file(
    version: u8,
    dims: &[u64],
    chunks: &[u64],
    scale_factor: f32,
    compression: Compression,
    values: &[f32],
) -> Vec<u8> {
    assert_eq!(values.len() as u64, dims.iter().product::<u64>());
    let n = dims.len();
    let n_chunks: Vec<u64> = std::iter::zip(dims, chunks)
        .map(|(d, c)| d.div_ceil(*c))
        .collect();
    let chunk_count: u64 = n_chunks.iter().product();

    let mut payloads = Vec::with_capacity(chunk_count as usize);
    for chunk in 0..chunk_count {
        // Chunk coordinates, then its clamped box within the array.
        let mut coords = vec![0u64; n];
        let mut remainder = chunk;
        for i in (0..n).rev() {
            coords[i] = remainder % n_chunks[i];
            remainder /= n_chunks[i];
        }
        let origin: Vec<u64> = (0..n).map(|i| coords[i] * chunks[i]).collect();
        let lengths: Vec<u64> = (0..n)
            .map(|i| dims[i].min(origin[i] + chunks[i]) - origin[i])
            .collect();

        let mut quantized: Vec<i16> = gather(values, dims, &origin, &lengths)
            .iter()
            .map(|&v| quantize(v, scale_factor, compression))
            .collect();
        let cols = lengths[n - 1] as usize;
        delta2d::encode(quantized.len() / cols, cols, &mut quantized);
        payloads.push(pfor::encode(&quantized));
    }

    match version {
        2 => assemble_version2(dims, chunks, scale_factor, compression, &payloads),
        3 => assemble_version3(dims, chunks, scale_factor, compression, &payloads),
        _ => panic!("unsupported version {version}"),
    }
}

fn compression_byte(compression: Compression) -> u8 {
    match compression {
        Compression::LinearQuantized => 0,
        Compression::LogarithmicQuantized => 1,
    }
}

fn lut_bytes(payloads: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payloads.len() * 8);
    let mut end = 0u64;
    for payload in payloads {
        end += payload.len() as u64;
        out.extend_from_slice(&end.to_le_bytes());
    }
    out
}

fn assemble_version2(
    dims: &[u64],
    chunks: &[u64],
    scale_factor: f32,
    compression: Compression,
    payloads: &[Vec<u8>],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"OM");
    out.push(2);
    out.push(compression_byte(compression));
    out.extend_from_slice(&scale_factor.to_le_bytes());
    out.extend_from_slice(&(dims.len() as u64).to_le_bytes());
    for &d in dims {
        out.extend_from_slice(&d.to_le_bytes());
    }
    for &c in chunks {
        out.extend_from_slice(&c.to_le_bytes());
    }
    out.extend_from_slice(&lut_bytes(payloads));
    for payload in payloads {
        out.extend_from_slice(payload);
    }
    out
}

fn assemble_version3(
    dims: &[u64],
    chunks: &[u64],
    scale_factor: f32,
    compression: Compression,
    payloads: &[Vec<u8>],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"OM");
    out.push(3);
    for payload in payloads {
        out.extend_from_slice(payload);
    }
    let lut_start = out.len() as u64;
    out.extend_from_slice(&lut_bytes(payloads));
    out.extend_from_slice(&scale_factor.to_le_bytes());
    out.push(compression_byte(compression));
    out.extend_from_slice(&[0; 3]);
    for &d in dims {
        out.extend_from_slice(&d.to_le_bytes());
    }
    for &c in chunks {
        out.extend_from_slice(&c.to_le_bytes());
    }
    out.extend_from_slice(&(dims.len() as u64).to_le_bytes());
    out.extend_from_slice(&(lut_start as i64).to_le_bytes());
    out
}
