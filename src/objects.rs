//! Object names and fully resolved git objects.

use std::fmt;

use gix_object::Kind;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::error::{PackError, Result};

/// Hash algorithm an object database is addressed by.
///
/// The format fixes the width of every object name stored in an index or
/// referenced by a reference delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFormat {
    #[default]
    Sha1,
    Sha256,
}

impl ObjectFormat {
    /// Width in bytes of an object name.
    pub fn hash_len(self) -> usize {
        match self {
            ObjectFormat::Sha1 => 20,
            ObjectFormat::Sha256 => 32,
        }
    }

    /// Compute the git object name of `data` stored as `kind`.
    pub fn object_id(self, kind: Kind, data: &[u8]) -> ObjectId {
        let header = loose_header(kind, data.len());
        let digest = match self {
            ObjectFormat::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(header.as_bytes());
                hasher.update(data);
                hasher.finalize().to_vec()
            }
            ObjectFormat::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(header.as_bytes());
                hasher.update(data);
                hasher.finalize().to_vec()
            }
        };
        ObjectId(digest)
    }
}

/// Raw object name bytes, displayed as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(Vec<u8>);

impl ObjectId {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        ObjectId(bytes.to_vec())
    }

    /// Parse a hex object name (40 characters for SHA-1, 64 for SHA-256).
    pub fn from_hex(hex_name: &str) -> Result<Self> {
        let bytes = hex::decode(hex_name)
            .map_err(|e| PackError::InvalidName(format!("{}: {}", hex_name, e)))?;
        if bytes.len() != ObjectFormat::Sha1.hash_len()
            && bytes.len() != ObjectFormat::Sha256.hash_len()
        {
            return Err(PackError::InvalidName(format!(
                "{}: unexpected length {}",
                hex_name,
                bytes.len()
            )));
        }
        Ok(ObjectId(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl AsRef<[u8]> for ObjectId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// An unpacked object together with the name its contents hash to
#[derive(Debug, Clone)]
pub struct GitObject {
    pub id: ObjectId,
    pub kind: Kind,
    pub data: Vec<u8>,
}

impl GitObject {
    /// Name `data` with `format`'s hash of its loose encoding.
    pub fn from_raw(format: ObjectFormat, kind: Kind, data: Vec<u8>) -> Self {
        let id = format.object_id(kind, &data);
        Self { id, kind, data }
    }

    /// `<kind> <len>\0` followed by the contents. Hashing this yields `id`.
    pub fn to_loose_format(&self) -> Vec<u8> {
        let mut result = loose_header(self.kind, self.data.len()).into_bytes();
        result.extend_from_slice(&self.data);
        result
    }

    /// Contents after delta resolution.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

pub(crate) fn kind_str(kind: Kind) -> &'static str {
    match kind {
        Kind::Commit => "commit",
        Kind::Tree => "tree",
        Kind::Blob => "blob",
        Kind::Tag => "tag",
    }
}

fn loose_header(kind: Kind, len: usize) -> String {
    format!("{} {}\0", kind_str(kind), len)
}
