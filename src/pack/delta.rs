//! Git delta application.
//!
//! A delta is two little-endian base-128 sizes (base length, result length)
//! followed by copy and add instructions. Any malformed input fails the
//! whole application; partial output is never returned.

use super::varint::{decode_delta_size, VarIntError};
use crate::error::{PackError, Result};

/// Copy instructions with a zero size copy this many bytes.
const COPY_SIZE_ZERO: usize = 0x10000;
/// Upper bound on the capacity reserved from an untrusted declared size.
pub(crate) const MAX_PREALLOC: u64 = 1 << 24;

/// Apply `delta` to `base`, returning the reconstructed object.
pub fn patch(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let (source_size, pos) = decode_delta_size(delta, 0).map_err(header_error)?;
    if source_size != base.len() as u64 {
        return Err(PackError::corrupt_delta(format!(
            "base is {} bytes, delta expects {}",
            base.len(),
            source_size
        )));
    }
    let (dest_size, mut pos) = decode_delta_size(delta, pos).map_err(header_error)?;

    let mut dest = Vec::with_capacity(dest_size.min(MAX_PREALLOC) as usize);

    while pos < delta.len() {
        let op = delta[pos];
        pos += 1;

        if op & 0x80 != 0 {
            let mut offset = 0usize;
            for (bit, shift) in [(0x01, 0), (0x02, 8), (0x04, 16), (0x08, 24)] {
                if op & bit != 0 {
                    offset |= usize::from(next_byte(delta, &mut pos)?) << shift;
                }
            }

            let mut size = 0usize;
            for (bit, shift) in [(0x10, 0), (0x20, 8), (0x40, 16)] {
                if op & bit != 0 {
                    size |= usize::from(next_byte(delta, &mut pos)?) << shift;
                }
            }
            if size == 0 {
                size = COPY_SIZE_ZERO;
            }

            let chunk = offset
                .checked_add(size)
                .and_then(|end| base.get(offset..end))
                .ok_or_else(|| {
                    PackError::corrupt_delta(format!(
                        "copy of {} bytes at offset {} exceeds base of {} bytes",
                        size,
                        offset,
                        base.len()
                    ))
                })?;
            dest.extend_from_slice(chunk);
        } else if op != 0 {
            let len = usize::from(op);
            let chunk = delta.get(pos..pos + len).ok_or_else(|| {
                PackError::corrupt_delta(format!(
                    "add of {} bytes with {} remaining",
                    len,
                    delta.len() - pos
                ))
            })?;
            dest.extend_from_slice(chunk);
            pos += len;
        } else {
            return Err(PackError::corrupt_delta("zero instruction byte"));
        }

        if dest.len() as u64 > dest_size {
            return Err(PackError::corrupt_delta(format!(
                "result exceeds declared size of {} bytes",
                dest_size
            )));
        }
    }

    if dest.len() as u64 != dest_size {
        return Err(PackError::corrupt_delta(format!(
            "result is {} bytes, delta declares {}",
            dest.len(),
            dest_size
        )));
    }

    Ok(dest)
}

fn next_byte(delta: &[u8], pos: &mut usize) -> Result<u8> {
    let byte = *delta
        .get(*pos)
        .ok_or_else(|| PackError::corrupt_delta("truncated copy instruction"))?;
    *pos += 1;
    Ok(byte)
}

fn header_error(err: VarIntError) -> PackError {
    match err {
        VarIntError::Truncated => PackError::corrupt_delta("truncated delta header"),
        VarIntError::Overflow => PackError::corrupt_delta("delta header size overflows"),
    }
}
