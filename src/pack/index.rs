//! Pack index (`.idx`) decoding and lookup.
//!
//! Only the header and the fanout table are read at decode time; entries
//! are read from the source on demand while searching.

mod version;

use std::cmp::Ordering;
use std::io;

pub use version::IndexVersion;

use super::source::{read_exact_at, SharedSource};
use crate::error::{PackError, Result};
use crate::objects::{ObjectFormat, ObjectId};

/// Leading bytes of index files version 2 and newer.
const INDEX_MAGIC: [u8; 4] = [0xff, 0x74, 0x4f, 0x63];
/// Width of the magic plus the version field.
const INDEX_HEADER_WIDTH: u64 = 8;
const FANOUT_ENTRIES: usize = 256;
const FANOUT_WIDTH: usize = FANOUT_ENTRIES * 4;

/// Location of an object inside its packfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub pack_offset: u64,
}

/// Decoded pack index.
pub struct Index {
    version: IndexVersion,
    /// Bytes preceding the fanout table in this particular file.
    header_width: u64,
    /// `fanout[i]` is the number of objects whose name begins with a byte
    /// `<= i`.
    fanout: [u32; FANOUT_ENTRIES],
    format: ObjectFormat,
    source: SharedSource,
}

impl Index {
    /// Decode the header and fanout table of the index in `source`.
    pub fn decode(source: SharedSource, format: ObjectFormat) -> Result<Self> {
        let (version, header_width) = decode_header(&source)?;
        let fanout = decode_fanout(&source, header_width)?;

        tracing::debug!(
            "decoded pack index v{} with {} objects",
            version.number(),
            fanout[FANOUT_ENTRIES - 1]
        );

        Ok(Index {
            version,
            header_width,
            fanout,
            format,
            source,
        })
    }

    pub fn version(&self) -> IndexVersion {
        self.version
    }

    pub fn format(&self) -> ObjectFormat {
        self.format
    }

    /// Total number of objects in the index.
    pub fn count(&self) -> u32 {
        self.fanout[FANOUT_ENTRIES - 1]
    }

    pub fn fanout(&self) -> &[u32; FANOUT_ENTRIES] {
        &self.fanout
    }

    /// Number of objects whose name begins with `prefix`.
    pub fn prefix_count(&self, prefix: u8) -> u32 {
        let (left, right) = self.bounds(prefix);
        right - left
    }

    /// Find the entry for `name`.
    ///
    /// Runs in O(log n) where n is the number of objects sharing the first
    /// byte of `name`. Fails with [`PackError::NotFound`] when the index does
    /// not contain the name.
    pub fn entry(&self, name: &[u8]) -> Result<IndexEntry> {
        if name.len() != self.format.hash_len() {
            return Err(PackError::InvalidName(format!(
                "{} is {} bytes, expected {}",
                ObjectId::from_bytes(name),
                name.len(),
                self.format.hash_len()
            )));
        }

        let (mut left, mut right) = self.bounds(name[0]);
        while left < right {
            let mid = left + (right - left) / 2;
            match self.version.search(self, name, mid)? {
                (Some(entry), _) => return Ok(entry),
                (None, Ordering::Less) => right = mid,
                (None, _) => left = mid + 1,
            }
        }

        Err(PackError::NotFound)
    }

    pub fn close(&self) -> Result<()> {
        Ok(self.source.close()?)
    }

    /// Half-open range of entry positions whose names begin with `prefix`.
    fn bounds(&self, prefix: u8) -> (u32, u32) {
        let right = self.fanout[prefix as usize];
        let left = match prefix {
            0 => 0,
            _ => self.fanout[prefix as usize - 1],
        };
        (left, right)
    }

    fn entries_start(&self) -> u64 {
        version::entries_start(self.header_width)
    }

    fn read_exact(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        read_exact_at(&*self.source, buf, offset).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => PackError::Truncated { offset },
            _ => PackError::Io(e),
        })
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("version", &self.version)
            .field("format", &self.format)
            .field("count", &self.count())
            .finish()
    }
}

/// Determine the index version and the width of its header.
fn decode_header(source: &SharedSource) -> Result<(IndexVersion, u64)> {
    let mut magic = [0u8; 4];
    read_exact_at(&**source, &mut magic, 0)?;
    if magic != INDEX_MAGIC {
        // Legacy V1 indexes start directly with the fanout table.
        return Ok((IndexVersion::V1, IndexVersion::V1.width()));
    }

    let mut version = [0u8; 4];
    match read_exact_at(&**source, &mut version, 4) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(PackError::MalformedHeader(
                "index header ends inside the version field".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    }
    match u32::from_be_bytes(version) {
        1 => Ok((IndexVersion::V1, INDEX_HEADER_WIDTH)),
        2 => Ok((IndexVersion::V2, INDEX_HEADER_WIDTH)),
        got => Err(PackError::UnsupportedVersion { got }),
    }
}

fn decode_fanout(source: &SharedSource, offset: u64) -> Result<[u32; FANOUT_ENTRIES]> {
    let mut buf = vec![0u8; FANOUT_WIDTH];
    match read_exact_at(&**source, &mut buf, offset) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(PackError::ShortFanout),
        Err(e) => return Err(e.into()),
    }

    let mut fanout = [0u32; FANOUT_ENTRIES];
    for (slot, chunk) in fanout.iter_mut().zip(buf.chunks_exact(4)) {
        *slot = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    if fanout.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(PackError::MalformedHeader(
            "non-monotonic fanout table".to_string(),
        ));
    }

    Ok(fanout)
}
