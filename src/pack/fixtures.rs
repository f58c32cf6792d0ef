//! In-memory pack and index builders for unit tests.

use std::io::Write;
use std::sync::Arc;

use flate2::{write::ZlibEncoder, Compression};
use gix_object::Kind;

use super::index::Index;
use super::object_type::PackedObjectType;
use super::packfile::Packfile;
use super::source::SharedSource;
use super::varint::encode;
use crate::config::PackConfig;
use crate::objects::ObjectFormat;

pub(crate) fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub(crate) fn source(bytes: Vec<u8>) -> SharedSource {
    Arc::new(bytes)
}

/// A SHA-1 sized name starting with `first` and ending with `last`.
pub(crate) fn name(first: u8, last: u8) -> Vec<u8> {
    let mut name = vec![0u8; 20];
    name[0] = first;
    name[19] = last;
    name
}

/// Delta stream: the two size headers followed by `instructions`.
pub(crate) fn delta(source_size: u64, dest_size: u64, instructions: &[u8]) -> Vec<u8> {
    let mut out = encode::delta_size(source_size);
    out.extend(encode::delta_size(dest_size));
    out.extend_from_slice(instructions);
    out
}

/// Delta replacing all of a base with `data`.
pub(crate) fn replace_delta(source_size: u64, data: &[u8]) -> Vec<u8> {
    let mut instructions = Vec::new();
    for chunk in data.chunks(0x7f) {
        instructions.push(chunk.len() as u8);
        instructions.extend_from_slice(chunk);
    }
    delta(source_size, data.len() as u64, &instructions)
}

fn sorted(entries: &[(Vec<u8>, u64)]) -> Vec<(Vec<u8>, u64)> {
    let mut entries = entries.to_vec();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

fn fanout(entries: &[(Vec<u8>, u64)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1024);
    for byte in 0..=255u8 {
        let count = entries.iter().filter(|(name, _)| name[0] <= byte).count() as u32;
        out.extend_from_slice(&count.to_be_bytes());
    }
    out
}

/// Legacy index: fanout, then `(offset, name)` pairs.
pub(crate) fn index_v1(format: ObjectFormat, entries: &[(Vec<u8>, u64)]) -> Vec<u8> {
    let entries = sorted(entries);
    let mut out = fanout(&entries);
    for (name, offset) in &entries {
        assert_eq!(name.len(), format.hash_len());
        out.extend_from_slice(&(*offset as u32).to_be_bytes());
        out.extend_from_slice(name);
    }
    out
}

/// Version 2 index, spilling offsets at or above 2^31 into the large table.
pub(crate) fn index_v2(format: ObjectFormat, entries: &[(Vec<u8>, u64)]) -> Vec<u8> {
    let entries = sorted(entries);
    let mut out = vec![0xff, 0x74, 0x4f, 0x63];
    out.extend_from_slice(&2u32.to_be_bytes());
    out.extend(fanout(&entries));

    for (name, _) in &entries {
        assert_eq!(name.len(), format.hash_len());
        out.extend_from_slice(name);
    }
    for _ in &entries {
        out.extend_from_slice(&[0u8; 4]);
    }

    let mut large = Vec::new();
    for (_, offset) in &entries {
        if *offset >= 0x8000_0000 {
            let slot = (large.len() / 8) as u32;
            out.extend_from_slice(&(0x8000_0000 | slot).to_be_bytes());
            large.extend_from_slice(&offset.to_be_bytes());
        } else {
            out.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
    }
    out.extend(large);
    out
}

/// Writes a packfile object by object and indexes it as it goes.
pub(crate) struct PackBuilder {
    format: ObjectFormat,
    bytes: Vec<u8>,
    entries: Vec<(Vec<u8>, u64)>,
    count: u32,
}

impl PackBuilder {
    pub(crate) fn new(format: ObjectFormat) -> Self {
        let mut bytes = b"PACK".to_vec();
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        PackBuilder {
            format,
            bytes,
            entries: Vec::new(),
            count: 0,
        }
    }

    pub(crate) fn base(&mut self, name: &[u8], kind: Kind, data: &[u8]) -> u64 {
        let mut object = encode::object_header(PackedObjectType::from(kind) as u8, data.len() as u64);
        object.extend(compress(data));
        self.raw(name, &object)
    }

    pub(crate) fn ofs_delta(&mut self, name: &[u8], base_offset: u64, delta: &[u8]) -> u64 {
        let offset = self.bytes.len() as u64;
        let mut object = encode::object_header(PackedObjectType::OffsetDelta as u8, delta.len() as u64);
        object.extend(encode::offset_delta(offset - base_offset));
        object.extend(compress(delta));
        self.raw(name, &object)
    }

    pub(crate) fn ref_delta(&mut self, name: &[u8], base_name: &[u8], delta: &[u8]) -> u64 {
        let mut object =
            encode::object_header(PackedObjectType::ReferenceDelta as u8, delta.len() as u64);
        object.extend_from_slice(base_name);
        object.extend(compress(delta));
        self.raw(name, &object)
    }

    /// Append an already encoded object and index it under `name`.
    pub(crate) fn raw(&mut self, name: &[u8], object: &[u8]) -> u64 {
        let offset = self.bytes.len() as u64;
        self.bytes.extend_from_slice(object);
        self.entries.push((name.to_vec(), offset));
        self.count += 1;
        offset
    }

    /// The pack and its version 2 index.
    pub(crate) fn finish(mut self) -> (Vec<u8>, Vec<u8>) {
        self.bytes[8..12].copy_from_slice(&self.count.to_be_bytes());
        let index = index_v2(self.format, &self.entries);
        (self.bytes, index)
    }

    pub(crate) fn packfile(self) -> Packfile {
        let config = PackConfig {
            object_format: self.format,
            ..PackConfig::default()
        };
        self.packfile_with(&config)
    }

    pub(crate) fn packfile_with(self, config: &PackConfig) -> Packfile {
        let (pack, index) = self.finish();
        let index = Index::decode(source(index), config.object_format).unwrap();
        Packfile::decode(source(pack), index, config).unwrap()
    }
}

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
