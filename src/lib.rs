#![deny(clippy::mod_module_files)]
//! Read-only access to git packfiles.
//!
//! Objects are looked up by name through pack indexes (`.idx`, versions 1
//! and 2), decoded from packfiles (`.pack`) and rebuilt from offset and
//! reference delta chains on demand.

pub mod config;
pub mod error;
pub mod objects;
pub mod pack;
pub mod storage;

pub use config::PackConfig;
pub use error::{PackError, Result};
pub use objects::{GitObject, ObjectFormat, ObjectId};
pub use pack::{Index, Object, Packfile, Set};
pub use storage::{ObjectStore, PackStorage};
