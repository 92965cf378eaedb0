//! Decoding and shape validation for `forward`, `get_faces` and `upload` payloads.
//!
//! Binary payloads are packed little-endian arrays. Structured payloads
//! arrive through the protobuf `Value` bridge, so every number is a double
//! and integer fields must be checked for integrality here.

use serde_json::Value;

use crate::error::{MeshError, Result};

/// Vertex count of the SMPL body model. Not configurable.
pub const SMPL_VERTEX_COUNT: usize = 6890;

/// One mesh vertex position `(x, y, z)`.
pub type Vertex = [f32; 3];

/// One triangle as three vertex indices.
pub type Face = [u32; 3];

const VERTEX_VALUES: usize = SMPL_VERTEX_COUNT * 3;

/// Decode an IEEE 754 binary16 value.
#[must_use]
pub fn decode_f16(bits: u16) -> f32 {
    let exponent = i32::from((bits & 0x7C00) >> 10);
    let fraction = f32::from(bits & 0x03FF);
    let sign = if bits & 0x8000 == 0 { 1.0 } else { -1.0 };

    match exponent {
        // Subnormal or zero.
        0 => sign * 2f32.powi(-14) * (fraction / 1024.0),
        0x1F if bits & 0x03FF == 0 => sign * f32::INFINITY,
        0x1F => f32::NAN,
        _ => sign * 2f32.powi(exponent - 15) * (1.0 + fraction / 1024.0),
    }
}

/// Decode a packed binary16 vertex buffer into exactly [`SMPL_VERTEX_COUNT`] vertices.
///
/// # Errors
///
/// [`MeshError::Protocol`] for an odd byte count, [`MeshError::ShapeMismatch`]
/// when the value count is not `6890 * 3`.
pub fn vertices_from_f16_le(bytes: &[u8]) -> Result<Vec<Vertex>> {
    if !bytes.len().is_multiple_of(2) {
        return Err(MeshError::Protocol(format!(
            "vertex buffer of {} bytes is not a whole number of f16 values",
            bytes.len()
        )));
    }
    let values = bytes
        .chunks_exact(2)
        .map(|pair| decode_f16(u16::from_le_bytes([pair[0], pair[1]])))
        .collect::<Vec<_>>();
    reshape_vertices(&values)
}

/// Extract vertices from a structured `verts` field.
///
/// Accepts rows of three numbers or a flat row-major list. The first
/// element fixes the layout for the whole array.
///
/// # Errors
///
/// [`MeshError::Protocol`] for non-numeric entries, rows that are not
/// triples, or rows mixed with bare numbers. [`MeshError::ShapeMismatch`]
/// when the value count is wrong.
#[allow(clippy::cast_possible_truncation)]
pub fn vertices_from_value(verts: &Value) -> Result<Vec<Vertex>> {
    let Some(items) = verts.as_array() else {
        return Err(MeshError::Protocol("`verts` is not an array".to_owned()));
    };
    let nested = items.first().is_some_and(Value::is_array);

    let mut values = Vec::with_capacity(VERTEX_VALUES);
    for (row_idx, item) in items.iter().enumerate() {
        match (nested, item) {
            (true, Value::Array(row)) => {
                if row.len() != 3 {
                    return Err(MeshError::Protocol(format!(
                        "vertex row {row_idx} has {} components",
                        row.len()
                    )));
                }
                for component in row {
                    values.push(number(component, "verts")? as f32);
                }
            }
            (false, Value::Array(_)) | (true, _) => {
                return Err(MeshError::Protocol(format!(
                    "`verts` mixes rows and bare numbers at index {row_idx}"
                )));
            }
            (false, other) => values.push(number(other, "verts")? as f32),
        }
    }
    reshape_vertices(&values)
}

fn reshape_vertices(values: &[f32]) -> Result<Vec<Vertex>> {
    if values.len() != VERTEX_VALUES {
        return Err(MeshError::ShapeMismatch {
            expected: VERTEX_VALUES,
            actual: values.len(),
        });
    }
    Ok(values
        .chunks_exact(3)
        .map(|xyz| [xyz[0], xyz[1], xyz[2]])
        .collect())
}

/// Decode a packed little-endian `i32` face buffer into triangles.
///
/// # Errors
///
/// [`MeshError::Protocol`] when the buffer is not a whole number of `i32`
/// triples or holds a negative index.
pub fn faces_from_i32_le(bytes: &[u8]) -> Result<Vec<Face>> {
    if !bytes.len().is_multiple_of(12) {
        return Err(MeshError::Protocol(format!(
            "face buffer of {} bytes is not a whole number of i32 triples",
            bytes.len()
        )));
    }
    let indices = bytes
        .chunks_exact(4)
        .map(|word| i32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .map(|idx| {
            u32::try_from(idx)
                .map_err(|_| MeshError::Protocol(format!("negative face index {idx}")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(indices
        .chunks_exact(3)
        .map(|ijk| [ijk[0], ijk[1], ijk[2]])
        .collect())
}

/// Extract triangles from a structured `faces` field.
///
/// # Errors
///
/// [`MeshError::Protocol`] when `faces` is not a list of integer triples.
pub fn faces_from_value(faces: &Value) -> Result<Vec<Face>> {
    let Some(rows) = faces.as_array() else {
        return Err(MeshError::Protocol("`faces` is not an array".to_owned()));
    };

    rows.iter()
        .enumerate()
        .map(|(row_idx, row)| match row.as_array().map(Vec::as_slice) {
            Some([i, j, k]) => Ok([index(i)?, index(j)?, index(k)?]),
            _ => Err(MeshError::Protocol(format!(
                "face row {row_idx} is not a triple"
            ))),
        })
        .collect()
}

/// Extract a positive frame count from a structured `num_frames` field.
///
/// # Errors
///
/// [`MeshError::Protocol`] unless the value is a positive integer.
pub fn frame_count_from_value(num_frames: &Value) -> Result<u64> {
    match integral(num_frames) {
        Some(count) if count > 0 => Ok(count),
        _ => Err(MeshError::Protocol(format!(
            "`num_frames` must be a positive integer, got {num_frames}"
        ))),
    }
}

fn number(value: &Value, field: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| MeshError::Protocol(format!("non-numeric entry in `{field}`: {value}")))
}

fn index(value: &Value) -> Result<u32> {
    integral(value)
        .and_then(|idx| u32::try_from(idx).ok())
        .ok_or_else(|| MeshError::Protocol(format!("invalid face index {value}")))
}

/// Non-negative integer, whether it arrived as an integer or an integral double.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn integral(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    // 2^64 is exactly representable; anything at or above it does not fit.
    (f >= 0.0 && f.fract() == 0.0 && f < 18_446_744_073_709_551_616.0).then_some(f as u64)
}

#[cfg(test)]
#[path = "decode_test.rs"]
mod tests;
