//! Git packfile storage.
//!
//! An [`Index`] maps object names to offsets in a [`Packfile`]; resolving a
//! name yields an [`Object`] whose [`Chain`] is only inflated and patched
//! when unpacked. A [`Set`] searches several packfiles as one and resolves
//! reference-delta bases across them.

pub mod chain;
pub mod delta;
pub mod index;
pub mod object;
pub mod object_type;
pub mod packfile;
pub mod set;
pub mod source;
pub mod varint;

#[cfg(test)]
pub(crate) mod fixtures;

pub use chain::{Chain, ChainBase, ChainDelta};
pub use index::{Index, IndexEntry, IndexVersion};
pub use object::Object;
pub use object_type::PackedObjectType;
pub use packfile::Packfile;
pub use set::Set;
pub use source::{FileSource, ReadAt, SharedSource};
