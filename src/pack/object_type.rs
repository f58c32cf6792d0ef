use std::fmt;

use gix_object::Kind;

use crate::error::PackError;

/// Type tag stored in the header of a packed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PackedObjectType {
    Commit = 1,
    Tree = 2,
    Blob = 3,
    Tag = 4,
    /// Delta whose base is found by a backward offset in the same pack.
    OffsetDelta = 6,
    /// Delta whose base is found by object name.
    ReferenceDelta = 7,
}

impl PackedObjectType {
    /// The resolved object kind, or `None` for the two delta types.
    pub fn kind(self) -> Option<Kind> {
        match self {
            PackedObjectType::Commit => Some(Kind::Commit),
            PackedObjectType::Tree => Some(Kind::Tree),
            PackedObjectType::Blob => Some(Kind::Blob),
            PackedObjectType::Tag => Some(Kind::Tag),
            PackedObjectType::OffsetDelta | PackedObjectType::ReferenceDelta => None,
        }
    }

    pub fn is_delta(self) -> bool {
        self.kind().is_none()
    }
}

impl TryFrom<u8> for PackedObjectType {
    type Error = PackError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(PackedObjectType::Commit),
            2 => Ok(PackedObjectType::Tree),
            3 => Ok(PackedObjectType::Blob),
            4 => Ok(PackedObjectType::Tag),
            6 => Ok(PackedObjectType::OffsetDelta),
            7 => Ok(PackedObjectType::ReferenceDelta),
            other => Err(PackError::UnknownObjectType(other)),
        }
    }
}

impl From<Kind> for PackedObjectType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Commit => PackedObjectType::Commit,
            Kind::Tree => PackedObjectType::Tree,
            Kind::Blob => PackedObjectType::Blob,
            Kind::Tag => PackedObjectType::Tag,
        }
    }
}

impl fmt::Display for PackedObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PackedObjectType::Commit => "commit",
            PackedObjectType::Tree => "tree",
            PackedObjectType::Blob => "blob",
            PackedObjectType::Tag => "tag",
            PackedObjectType::OffsetDelta => "obj_ofs_delta",
            PackedObjectType::ReferenceDelta => "obj_ref_delta",
        };
        f.write_str(name)
    }
}
