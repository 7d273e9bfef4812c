//! Portable embedding serialization.
//!
//! Vectors are stored as little-endian IEEE-754 `f32` components, so a blob is
//! exactly `dimension * 4` bytes. Embeddings are `f32` from the provider
//! response onward, so writes and queries compare identical values.

use crate::{Error, Result};

/// Bytes per encoded component.
pub const COMPONENT_BYTES: usize = 4;

/// Encode a vector as a little-endian f32 blob.
pub fn encode(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * COMPONENT_BYTES);
    for component in vector {
        out.extend_from_slice(&component.to_le_bytes());
    }
    out
}

/// Decode a little-endian f32 blob.
pub fn decode(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % COMPONENT_BYTES != 0 {
        return Err(Error::Serialization(format!(
            "vector blob length {} is not a multiple of {}",
            blob.len(),
            COMPONENT_BYTES
        )));
    }
    Ok(blob
        .chunks_exact(COMPONENT_BYTES)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Euclidean (L2) distance. Fails on dimension mismatch.
pub fn l2_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::InvalidInput(format!(
            "dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let sum: f32 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum();
    Ok(sum.sqrt())
}
