//! Bit-level pack and unpack between logical values and kernel byte streams
//!
//! The layout is defined bit-serially (see the crate docs), so the code
//! below works one bit at a time through a small accumulator. Group
//! padding falls out of the final flush: a group of `K` values occupies
//! exactly `ceil(K*b/8)` bytes, with the high bits of the last byte zero.

use crate::error::{QuantError, Result};
use crate::QuantType;

/// Packed byte width of one group of `innermost` values of width `bits`
#[must_use]
pub const fn packed_group_bytes(innermost: usize, bits: u32) -> usize {
    (innermost * bits as usize).div_ceil(8)
}

/// Pack logical values into the kernel byte stream
///
/// `values` are integer-equivalents of `dtype` (for fixed-point, the
/// unscaled stored integer), row-major over the folded shape whose
/// innermost dimension is `innermost`.
///
/// # Errors
///
/// Returns an error if the datatype has no integer codec, if the element
/// count is not a multiple of `innermost`, or if any value fails the
/// datatype's domain check.
pub fn pack(dtype: QuantType, values: &[i64], innermost: usize) -> Result<Vec<u8>> {
    let bits = codec_bits(dtype)?;
    if innermost == 0 || values.len() % innermost != 0 {
        return Err(QuantError::Shape {
            elements: values.len(),
            innermost,
        });
    }
    if let Some(index) = values.iter().position(|&v| !dtype.admits(v)) {
        return Err(QuantError::Domain {
            value: values[index],
            index,
            dtype,
        });
    }

    // byte-wide types pack to a plain copy: one value per byte, no padding
    if bits == 8 {
        return Ok(copy_to_bytes(dtype, values));
    }

    let group_bytes = packed_group_bytes(innermost, bits);
    let mut out = Vec::with_capacity((values.len() / innermost) * group_bytes);

    for group in values.chunks(innermost) {
        let mut acc: u8 = 0;
        let mut filled: u32 = 0;
        for &value in group {
            let code = encode(dtype, value, bits);
            for bit in 0..bits {
                if (code >> bit) & 1 == 1 {
                    acc |= 1 << filled;
                }
                filled += 1;
                if filled == 8 {
                    out.push(acc);
                    acc = 0;
                    filled = 0;
                }
            }
        }
        // zero-padded tail byte of the group
        if filled > 0 {
            out.push(acc);
        }
    }

    tracing::trace!(
        "Packed {} {} values into {} bytes (rows of {})",
        values.len(),
        dtype,
        out.len(),
        innermost
    );
    Ok(out)
}

/// Unpack a kernel byte stream into integer-equivalent logical values
///
/// The strict inverse of [`pack`]: consumes `ceil(innermost*b/8)` bytes
/// per group and emits `innermost` values, sign-extending iff the
/// datatype is signed. Padding bits are ignored.
///
/// # Errors
///
/// Returns an error if the datatype has no integer codec or if the byte
/// count is not a multiple of the packed group width.
pub fn unpack(dtype: QuantType, bytes: &[u8], innermost: usize) -> Result<Vec<i64>> {
    let bits = codec_bits(dtype)?;
    if innermost == 0 {
        return Err(QuantError::Shape {
            elements: 0,
            innermost,
        });
    }
    let group_bytes = packed_group_bytes(innermost, bits);
    if bytes.len() % group_bytes != 0 {
        return Err(QuantError::Length {
            bytes: bytes.len(),
            group_bytes,
        });
    }

    // byte-wide inverse of the plain-copy fast path
    if bits == 8 {
        return Ok(bytes
            .iter()
            .map(|&b| decode(dtype, u64::from(b), bits))
            .collect());
    }

    let mut out = Vec::with_capacity((bytes.len() / group_bytes) * innermost);
    for group in bytes.chunks(group_bytes) {
        for value_index in 0..innermost {
            let first_bit = value_index * bits as usize;
            let mut code: u64 = 0;
            for bit in 0..bits as usize {
                let absolute = first_bit + bit;
                if (group[absolute / 8] >> (absolute % 8)) & 1 == 1 {
                    code |= 1 << bit;
                }
            }
            out.push(decode(dtype, code, bits));
        }
    }
    Ok(out)
}

/// Pack values of a byte-wide datatype as a plain copy
///
/// The 8-bit fast path: every logical value is exactly one wire byte, so
/// the stream is the domain-checked two's-complement copy of the input
/// with no grouping or padding. [`pack`] routes byte-wide types through
/// the same copy.
///
/// # Errors
///
/// Returns an error when the datatype is not a byte-wide integer type or
/// a value fails its domain check.
pub fn pack_bytes(dtype: QuantType, values: &[i64]) -> Result<Vec<u8>> {
    if codec_bits(dtype)? != 8 {
        return Err(QuantError::Unsupported { dtype });
    }
    if let Some(index) = values.iter().position(|&v| !dtype.admits(v)) {
        return Err(QuantError::Domain {
            value: values[index],
            index,
            dtype,
        });
    }
    Ok(copy_to_bytes(dtype, values))
}

/// Plain copy of admitted byte-wide values
#[allow(clippy::cast_possible_truncation)]
fn copy_to_bytes(dtype: QuantType, values: &[i64]) -> Vec<u8> {
    values
        .iter()
        .map(|&v| encode(dtype, v, 8) as u8)
        .collect()
}

/// Unpack and apply the datatype's scale, yielding logical `f64` values
///
/// Identical to [`unpack`] for integer types; fixed-point values are
/// multiplied by `2^-f`.
///
/// # Errors
///
/// Same failure conditions as [`unpack`].
#[allow(clippy::cast_precision_loss)]
pub fn unpack_scaled(dtype: QuantType, bytes: &[u8], innermost: usize) -> Result<Vec<f64>> {
    let scale = dtype.scale();
    Ok(unpack(dtype, bytes, innermost)?
        .into_iter()
        .map(|v| v as f64 * scale)
        .collect())
}

/// Wire datatypes the integer codec can carry
fn codec_bits(dtype: QuantType) -> Result<u32> {
    if dtype == QuantType::Float32 {
        return Err(QuantError::Unsupported { dtype });
    }
    Ok(dtype.bit_width())
}

/// b-bit wire code of one admitted value
#[allow(clippy::cast_sign_loss)]
fn encode(dtype: QuantType, value: i64, bits: u32) -> u64 {
    let raw = match dtype {
        // -1 -> 0, +1 -> 1
        QuantType::Bipolar => i64::from(value == 1),
        _ => value,
    };
    (raw as u64) & mask(bits)
}

/// Inverse of [`encode`], sign-extending signed codes
#[allow(clippy::cast_possible_wrap)]
fn decode(dtype: QuantType, code: u64, bits: u32) -> i64 {
    match dtype {
        QuantType::Bipolar => {
            if code == 0 {
                -1
            } else {
                1
            }
        }
        _ if dtype.is_signed() => {
            let sign = (code >> (bits - 1)) & 1 == 1;
            if sign {
                (code | !mask(bits)) as i64
            } else {
                code as i64
            }
        }
        _ => code as i64,
    }
}

const fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
