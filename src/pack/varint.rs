//! Variable-length integers of the pack format.
//!
//! Three encodings share the MSB-continuation idea but differ in detail:
//! - the object header packs a 3-bit type and 4 size bits into its first
//!   byte, then 7 size bits per continuation byte, least-significant first;
//! - the offset-delta back-reference is big-endian base-128 with a `+1`
//!   bias on every continuation, so each length has a distinct range;
//! - delta sizes are plain little-endian base-128.

/// Why a varint could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    /// The buffer ended while the continuation bit was still set.
    Truncated,
    /// The value does not fit in 64 bits.
    Overflow,
}

/// Decoded type-and-size header of a packed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Raw 3-bit type tag.
    pub type_tag: u8,
    /// Declared inflated size of the body (or of the delta instructions).
    pub size: u64,
    /// Number of header bytes consumed.
    pub len: usize,
}

pub fn decode_object_header(buf: &[u8]) -> Result<ObjectHeader, VarIntError> {
    let first = *buf.first().ok_or(VarIntError::Truncated)?;
    let type_tag = (first >> 4) & 0x7;
    let mut size = u64::from(first & 0x0f);
    let mut shift = 4u32;
    let mut pos = 1;
    let mut byte = first;

    while byte & 0x80 != 0 {
        byte = *buf.get(pos).ok_or(VarIntError::Truncated)?;
        pos += 1;
        let chunk = u64::from(byte & 0x7f);
        if shift >= 64 || (chunk << shift) >> shift != chunk {
            return Err(VarIntError::Overflow);
        }
        size |= chunk << shift;
        shift += 7;
    }

    Ok(ObjectHeader {
        type_tag,
        size,
        len: pos,
    })
}

/// Decode an offset-delta back-reference, returning `(distance, consumed)`.
pub fn decode_offset_delta(buf: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut byte = *buf.first().ok_or(VarIntError::Truncated)?;
    let mut value = u64::from(byte & 0x7f);
    let mut pos = 1;

    while byte & 0x80 != 0 {
        byte = *buf.get(pos).ok_or(VarIntError::Truncated)?;
        pos += 1;
        value = value
            .checked_add(1)
            .and_then(|v| v.checked_mul(1 << 7))
            .ok_or(VarIntError::Overflow)?
            | u64::from(byte & 0x7f);
    }

    Ok((value, pos))
}

/// Decode a delta header size starting at `pos`, returning
/// `(size, next position)`.
pub fn decode_delta_size(buf: &[u8], mut pos: usize) -> Result<(u64, usize), VarIntError> {
    let mut size = 0u64;
    let mut shift = 0u32;

    loop {
        let byte = *buf.get(pos).ok_or(VarIntError::Truncated)?;
        pos += 1;
        let chunk = u64::from(byte & 0x7f);
        if shift >= 64 || (chunk << shift) >> shift != chunk {
            return Err(VarIntError::Overflow);
        }
        size |= chunk << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((size, pos));
        }
    }
}
