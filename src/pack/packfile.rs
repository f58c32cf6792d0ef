//! Packfile decoding and object resolution.

use std::path::Path;
use std::sync::Arc;

use super::chain::{inflate, Chain, ChainBase, ChainDelta};
use super::index::Index;
use super::object::Object;
use super::object_type::PackedObjectType;
use super::source::{read_up_to, FileSource, SharedSource};
use super::varint::{decode_object_header, decode_offset_delta, VarIntError};
use crate::config::PackConfig;
use crate::error::{PackError, Result};
use crate::objects::{ObjectFormat, ObjectId};

const PACK_MAGIC: &[u8; 4] = b"PACK";
const PACK_HEADER_WIDTH: usize = 12;
/// Enough for the longest object header, offset varint or SHA-256 base
/// name.
const OBJECT_HEADER_WINDOW: usize = 64;

/// Finds delta bases that are not in the packfile holding the delta.
pub(crate) trait BaseResolver {
    /// Build the chain for `name`, allowing at most `budget` more delta hops.
    fn resolve_base(&self, name: &[u8], budget: usize) -> Result<Chain>;
}

/// One pack (`.pack`) together with its index (`.idx`).
pub struct Packfile {
    version: u32,
    object_count: u32,
    index: Index,
    source: SharedSource,
    max_delta_depth: usize,
}

/// Where a delta finds its base.
enum BaseRef {
    Offset(u64),
    Name(Vec<u8>),
}

impl Packfile {
    /// Validate the pack header in `source` and pair it with `index`.
    pub fn decode(source: SharedSource, index: Index, config: &PackConfig) -> Result<Self> {
        let mut header = [0u8; PACK_HEADER_WIDTH];
        let n = read_up_to(&*source, &mut header, 0)?;
        if n < PACK_HEADER_WIDTH {
            return Err(PackError::MalformedHeader(format!(
                "pack header is {} bytes, expected {}",
                n, PACK_HEADER_WIDTH
            )));
        }
        if &header[..4] != PACK_MAGIC {
            return Err(PackError::MalformedHeader(format!(
                "bad pack magic {}",
                hex::encode(&header[..4])
            )));
        }

        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if !matches!(version, 2 | 3) {
            return Err(PackError::UnsupportedPackVersion { got: version });
        }
        let object_count = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);

        if object_count != index.count() {
            tracing::warn!(
                "pack declares {} objects but its index lists {}",
                object_count,
                index.count()
            );
        }
        tracing::debug!("decoded pack v{} with {} objects", version, object_count);

        Ok(Packfile {
            version,
            object_count,
            index,
            source,
            max_delta_depth: config.max_delta_depth,
        })
    }

    /// Open a `.pack` and its `.idx` from disk.
    pub fn open<P: AsRef<Path>, I: AsRef<Path>>(
        pack_path: P,
        index_path: I,
        config: &PackConfig,
    ) -> Result<Self> {
        let index_source: SharedSource = Arc::new(FileSource::open(index_path)?);
        let index = Index::decode(index_source, config.object_format)?;
        let pack_source: SharedSource = Arc::new(FileSource::open(pack_path)?);
        Packfile::decode(pack_source, index, config)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Object count declared by the pack header.
    pub fn object_count(&self) -> u32 {
        self.object_count
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn format(&self) -> ObjectFormat {
        self.index.format()
    }

    pub(crate) fn max_delta_depth(&self) -> usize {
        self.max_delta_depth
    }

    /// Resolve `name` to a lazily unpacked object.
    ///
    /// Fails with [`PackError::NotFound`] if this pack does not index the
    /// name. Reference-delta bases must live in this same pack; use a
    /// [`Set`](super::Set) to resolve bases across packs.
    pub fn object(&self, name: &[u8]) -> Result<Object> {
        let chain = self.lookup(name, None, self.max_delta_depth)?;
        Ok(Object::new(chain))
    }

    pub(crate) fn lookup(
        &self,
        name: &[u8],
        resolver: Option<&dyn BaseResolver>,
        budget: usize,
    ) -> Result<Chain> {
        let entry = self.index.entry(name)?;
        self.chain_at(entry.pack_offset, resolver, budget)
    }

    /// Close the index and then the pack source, reporting the first error.
    pub fn close(self) -> Result<()> {
        let index = self.index.close();
        let pack = self.source.close().map_err(PackError::from);
        index.and(pack)
    }

    /// Walk from the object at `offset` down to its whole base, collecting
    /// delta hops on the way.
    fn chain_at(
        &self,
        offset: u64,
        resolver: Option<&dyn BaseResolver>,
        budget: usize,
    ) -> Result<Chain> {
        let mut deltas = Vec::new();
        let mut offset = offset;

        let bottom = loop {
            let mut window = [0u8; OBJECT_HEADER_WINDOW];
            let n = read_up_to(&*self.source, &mut window, offset)?;
            let window = &window[..n];

            let header = decode_object_header(window).map_err(|e| match e {
                VarIntError::Truncated => PackError::Truncated { offset },
                VarIntError::Overflow => {
                    PackError::MalformedHeader(format!("object header at offset {} overflows", offset))
                }
            })?;
            let typ = PackedObjectType::try_from(header.type_tag)?;

            if let Some(kind) = typ.kind() {
                let data_offset = offset + header.len as u64;
                break Chain::Base(ChainBase::new(
                    data_offset,
                    header.size,
                    kind,
                    Arc::clone(&self.source),
                ));
            }

            if deltas.len() >= budget {
                return Err(PackError::DeltaChainTooDeep {
                    offset,
                    max_depth: self.max_delta_depth,
                });
            }

            let (base, base_ref_len) = self.base_ref(typ, offset, &window[header.len..])?;
            let data_offset = offset + (header.len + base_ref_len) as u64;
            deltas.push(inflate(&*self.source, data_offset, header.size)?);
            tracing::trace!("{} at offset {} has {} byte delta", typ, offset, header.size);

            match base {
                BaseRef::Offset(base_offset) => offset = base_offset,
                BaseRef::Name(base_name) => match self.index.entry(&base_name) {
                    Ok(entry) => offset = entry.pack_offset,
                    Err(PackError::NotFound) => {
                        let id = ObjectId::from_bytes(&base_name);
                        let resolver =
                            resolver.ok_or_else(|| PackError::MissingBase(id.to_hex()))?;
                        break resolver.resolve_base(&base_name, budget - deltas.len())?;
                    }
                    Err(e) => return Err(e),
                },
            }
        };

        Ok(deltas.into_iter().rev().fold(bottom, |chain, delta| {
            Chain::Delta(ChainDelta::new(chain, delta))
        }))
    }

    /// Decode the base reference following a delta's object header.
    fn base_ref(&self, typ: PackedObjectType, offset: u64, buf: &[u8]) -> Result<(BaseRef, usize)> {
        if typ == PackedObjectType::ReferenceDelta {
            let hash_len = self.format().hash_len();
            let name = buf
                .get(..hash_len)
                .ok_or(PackError::Truncated { offset })?;
            return Ok((BaseRef::Name(name.to_vec()), hash_len));
        }

        let (distance, len) = decode_offset_delta(buf).map_err(|e| match e {
            VarIntError::Truncated => PackError::Truncated { offset },
            VarIntError::Overflow => PackError::CorruptOffset { offset },
        })?;
        match offset.checked_sub(distance) {
            Some(base) if distance > 0 && base >= PACK_HEADER_WIDTH as u64 => {
                Ok((BaseRef::Offset(base), len))
            }
            _ => Err(PackError::CorruptOffset { offset }),
        }
    }
}

impl std::fmt::Debug for Packfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packfile")
            .field("version", &self.version)
            .field("object_count", &self.object_count)
            .field("index", &self.index)
            .finish()
    }
}
