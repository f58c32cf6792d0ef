use std::cmp::Ordering;

use super::{Index, IndexEntry, FANOUT_WIDTH};
use crate::error::Result;

/// Width of the CRC32 accompanying each object in V2.
const CRC_WIDTH: u64 = 4;
/// Width of an offset in the V1 entries and the V2 small offset table.
const SMALL_OFFSET_WIDTH: u64 = 4;
/// Width of an entry in the V2 large offset table.
const LARGE_OFFSET_WIDTH: u64 = 8;
/// MSB of a small offset: the low 31 bits index the large offset table.
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Layout variant of a pack index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexVersion {
    /// Legacy layout: `(offset, name)` pairs after the fanout.
    V1,
    /// Separate name, CRC32, offset and large-offset tables.
    V2,
}

impl IndexVersion {
    pub fn number(self) -> u32 {
        match self {
            IndexVersion::V1 => 1,
            IndexVersion::V2 => 2,
        }
    }

    /// Width of the header preceding the fanout table in files git writes
    /// for this version.
    pub fn width(self) -> u64 {
        match self {
            IndexVersion::V1 => 0,
            IndexVersion::V2 => 8,
        }
    }

    /// Compare `name` with the name stored at position `at`.
    ///
    /// Returns the entry together with `Ordering::Equal` on a match;
    /// otherwise no entry and the ordering of `name` relative to the stored
    /// name, so the caller can narrow its search.
    pub fn search(self, index: &Index, name: &[u8], at: u32) -> Result<(Option<IndexEntry>, Ordering)> {
        match self {
            IndexVersion::V1 => search_v1(index, name, at),
            IndexVersion::V2 => search_v2(index, name, at),
        }
    }
}

fn search_v1(index: &Index, name: &[u8], at: u32) -> Result<(Option<IndexEntry>, Ordering)> {
    let hash_len = index.format().hash_len();
    let entry_width = SMALL_OFFSET_WIDTH + hash_len as u64;
    let mut buf = vec![0u8; entry_width as usize];
    index.read_exact(&mut buf, index.entries_start() + entry_width * u64::from(at))?;

    let (offset, stored) = buf.split_at(SMALL_OFFSET_WIDTH as usize);
    match name.cmp(stored) {
        Ordering::Equal => {
            let pack_offset = u32::from_be_bytes([offset[0], offset[1], offset[2], offset[3]]);
            Ok((
                Some(IndexEntry {
                    pack_offset: u64::from(pack_offset),
                }),
                Ordering::Equal,
            ))
        }
        cmp => Ok((None, cmp)),
    }
}

fn search_v2(index: &Index, name: &[u8], at: u32) -> Result<(Option<IndexEntry>, Ordering)> {
    let hash_len = index.format().hash_len() as u64;
    let total = u64::from(index.count());
    let start = index.entries_start();

    let mut stored = vec![0u8; hash_len as usize];
    index.read_exact(&mut stored, start + hash_len * u64::from(at))?;
    let cmp = name.cmp(&stored[..]);
    if cmp != Ordering::Equal {
        return Ok((None, cmp));
    }

    let small_offsets = start + hash_len * total + CRC_WIDTH * total;
    let mut small = [0u8; SMALL_OFFSET_WIDTH as usize];
    index.read_exact(&mut small, small_offsets + SMALL_OFFSET_WIDTH * u64::from(at))?;
    let loc = u32::from_be_bytes(small);

    let pack_offset = if loc & LARGE_OFFSET_FLAG != 0 {
        let large_offsets = small_offsets + SMALL_OFFSET_WIDTH * total;
        let slot = u64::from(loc & !LARGE_OFFSET_FLAG);
        let mut large = [0u8; LARGE_OFFSET_WIDTH as usize];
        index.read_exact(&mut large, large_offsets + LARGE_OFFSET_WIDTH * slot)?;
        u64::from_be_bytes(large)
    } else {
        u64::from(loc)
    };

    Ok((Some(IndexEntry { pack_offset }), Ordering::Equal))
}

/// Byte offset of the first entry after a header of `header_width` bytes.
pub(super) fn entries_start(header_width: u64) -> u64 {
    header_width + FANOUT_WIDTH as u64
}
