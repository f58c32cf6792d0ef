use crate::error::Result;
use crate::objects::GitObject;

/// Trait for read-only, name-addressed object storage
pub trait ObjectStore {
    /// Read and fully resolve the object called `name`.
    /// Returns error if object doesn't exist.
    fn read_object(&self, name: &[u8]) -> Result<GitObject>;

    /// Check if object exists by name.
    fn object_exists(&self, name: &[u8]) -> Result<bool>;
}
