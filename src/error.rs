use std::io;

/// Errors produced while decoding pack indexes, packfiles and delta chains.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// The index declares a version this crate cannot decode.
    #[error("unsupported pack index version: {got}")]
    UnsupportedVersion { got: u32 },

    /// The packfile header declares a version this crate cannot decode.
    #[error("unsupported packfile version: {got}")]
    UnsupportedPackVersion { got: u32 },

    /// Fewer than 1024 bytes were available for the index fanout table.
    #[error("too short fanout table")]
    ShortFanout,

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The object is not present in this packfile's index.
    ///
    /// A `Set` treats this as "try the next packfile".
    #[error("object not found in index")]
    NotFound,

    /// No packfile in the set contains the object.
    #[error("no such object: {0}")]
    NoSuchObject(String),

    /// A reference delta names a base that no packfile contains.
    #[error("delta base {0} not found")]
    MissingBase(String),

    #[error("invalid delta data: {0}")]
    CorruptDelta(String),

    #[error("delta chain deeper than {max_depth} levels at offset {offset}")]
    DeltaChainTooDeep { offset: u64, max_depth: usize },

    #[error("unrecognized packed object type: {0}")]
    UnknownObjectType(u8),

    #[error("truncated pack data at offset {offset}")]
    Truncated { offset: u64 },

    #[error("corrupt delta base offset in object at offset {offset}")]
    CorruptOffset { offset: u64 },

    #[error("failed to inflate object at offset {offset}: {source}")]
    Inflate {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("object at offset {offset} inflated to {actual} bytes, expected {expected}")]
    SizeMismatch {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("object id mismatch: expected {expected}, got {actual}")]
    ObjectIdMismatch { expected: String, actual: String },

    #[error("invalid object name: {0}")]
    InvalidName(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PackError {
    /// Whether this is the per-packfile not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PackError::NotFound)
    }

    /// Whether this error reports corrupt delta data, including a chain that
    /// exceeds the depth guard.
    pub fn is_corrupt_delta(&self) -> bool {
        matches!(
            self,
            PackError::CorruptDelta(_) | PackError::DeltaChainTooDeep { .. }
        )
    }

    /// Whether this error means a pack or index header could not be parsed.
    pub fn is_malformed_header(&self) -> bool {
        matches!(
            self,
            PackError::MalformedHeader(_) | PackError::ShortFanout
        )
    }

    pub(crate) fn corrupt_delta(reason: impl Into<String>) -> Self {
        PackError::CorruptDelta(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, PackError>;
