//! Delta-base chains.
//!
//! A chain is a whole object (`Base`) optionally wrapped by any number of
//! delta hops (`Delta`). Nothing is inflated or patched until `unpack`.

use std::fmt;
use std::io::Read;

use flate2::read::ZlibDecoder;
use gix_object::Kind;

use super::delta::{patch, MAX_PREALLOC};
use super::source::{OffsetReader, ReadAt, SharedSource};
use crate::error::{PackError, Result};

#[derive(Clone)]
pub enum Chain {
    Base(ChainBase),
    Delta(ChainDelta),
}

impl Chain {
    /// Materialise the object: inflate the base, then apply each delta hop
    /// from the innermost outwards.
    pub fn unpack(&self) -> Result<Vec<u8>> {
        let mut hops = Vec::new();
        let mut current = self;
        let base = loop {
            match current {
                Chain::Base(base) => break base,
                Chain::Delta(delta) => {
                    hops.push(&delta.delta);
                    current = &*delta.base;
                }
            }
        };

        let mut data = base.unpack()?;
        for (depth, delta) in hops.iter().rev().enumerate() {
            tracing::trace!("applying delta hop {} of {}", depth + 1, hops.len());
            data = patch(&data, delta)?;
        }
        Ok(data)
    }

    /// Kind of the whole object at the bottom of the chain.
    pub fn kind(&self) -> Kind {
        self.base().kind
    }

    /// Number of delta hops above the base.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Chain::Delta(delta) = current {
            depth += 1;
            current = &*delta.base;
        }
        depth
    }

    fn base(&self) -> &ChainBase {
        let mut current = self;
        loop {
            match current {
                Chain::Base(base) => return base,
                Chain::Delta(delta) => current = &*delta.base,
            }
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("kind", &self.kind())
            .field("depth", &self.depth())
            .finish()
    }
}

/// A whole (non-delta) object: a zlib stream at `offset` inflating to
/// `size` bytes.
#[derive(Clone)]
pub struct ChainBase {
    offset: u64,
    size: u64,
    kind: Kind,
    source: SharedSource,
}

impl ChainBase {
    pub fn new(offset: u64, size: u64, kind: Kind, source: SharedSource) -> Self {
        ChainBase {
            offset,
            size,
            kind,
            source,
        }
    }

    pub fn unpack(&self) -> Result<Vec<u8>> {
        inflate(&*self.source, self.offset, self.size)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// A delta hop: instructions to apply to the unpacked `base`.
#[derive(Clone)]
pub struct ChainDelta {
    base: Box<Chain>,
    delta: Vec<u8>,
}

impl ChainDelta {
    pub fn new(base: Chain, delta: Vec<u8>) -> Self {
        ChainDelta {
            base: Box::new(base),
            delta,
        }
    }

    pub fn unpack(&self) -> Result<Vec<u8>> {
        let base = self.base.unpack()?;
        patch(&base, &self.delta)
    }

    pub fn base(&self) -> &Chain {
        &self.base
    }

    pub fn delta(&self) -> &[u8] {
        &self.delta
    }
}

/// Inflate the zlib stream at `offset`, which must produce exactly `size`
/// bytes.
pub(crate) fn inflate(source: &dyn ReadAt, offset: u64, size: u64) -> Result<Vec<u8>> {
    let decoder = ZlibDecoder::new(OffsetReader::new(source, offset));
    let mut out = Vec::with_capacity(size.min(MAX_PREALLOC) as usize);
    decoder
        .take(size.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|source| PackError::Inflate { offset, source })?;

    if out.len() as u64 != size {
        return Err(PackError::SizeMismatch {
            offset,
            expected: size,
            actual: out.len() as u64,
        });
    }
    Ok(out)
}
