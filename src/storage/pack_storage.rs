use std::path::Path;

use anyhow::Context;

use super::traits::ObjectStore;
use crate::config::PackConfig;
use crate::error::{PackError, Result};
use crate::objects::{kind_str, GitObject, ObjectId};
use crate::pack::Set;

/// Object storage backed by the packfiles of a git object database
pub struct PackStorage {
    set: Set,
    config: PackConfig,
}

impl PackStorage {
    /// Open every pack under `objects_dir`
    pub fn open<P: AsRef<Path>>(objects_dir: P, config: PackConfig) -> Result<Self> {
        let objects_dir = objects_dir.as_ref();
        let set = Set::open(objects_dir, &config)?;
        tracing::info!("opened {} packfiles under {:?}", set.len(), objects_dir);
        Ok(PackStorage { set, config })
    }

    /// Open the object database named by `config.objects_dir`
    pub fn from_config(config: PackConfig) -> anyhow::Result<Self> {
        let objects_dir = config.objects_dir()?.to_path_buf();
        PackStorage::open(&objects_dir, config)
            .with_context(|| format!("Failed to open packs under {:?}", objects_dir))
    }

    pub fn set(&self) -> &Set {
        &self.set
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// Close every packfile. Later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        self.set.close()
    }
}

impl ObjectStore for PackStorage {
    fn read_object(&self, name: &[u8]) -> Result<GitObject> {
        let object = self
            .set
            .object(name)?
            .to_git_object(self.config.object_format)?;

        if self.config.verify_object_ids && object.id.as_bytes() != name {
            return Err(PackError::ObjectIdMismatch {
                expected: ObjectId::from_bytes(name).to_hex(),
                actual: object.id.to_hex(),
            });
        }

        tracing::debug!(
            "read {} {} ({} bytes)",
            kind_str(object.kind),
            object.id,
            object.data.len()
        );
        Ok(object)
    }

    fn object_exists(&self, name: &[u8]) -> Result<bool> {
        self.set.contains(name)
    }
}
