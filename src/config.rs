use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::objects::ObjectFormat;

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(stripped) = s.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if s == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

/// Configuration for reading packed objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackConfig {
    /// Object database root, usually `.git/objects`
    #[serde(default)]
    pub objects_dir: Option<PathBuf>,
    /// Hash algorithm naming the objects
    #[serde(default)]
    pub object_format: ObjectFormat,
    /// Longest delta chain followed before the data is treated as corrupt
    #[serde(default = "defaults::default_max_delta_depth")]
    pub max_delta_depth: usize,
    /// Leave packs with unreadable headers out of a set instead of failing
    #[serde(default = "defaults::default_skip_malformed_packs")]
    pub skip_malformed_packs: bool,
    /// Recompute the name of every object read and compare it to the
    /// requested one
    #[serde(default)]
    pub verify_object_ids: bool,
}

impl Default for PackConfig {
    fn default() -> Self {
        PackConfig {
            objects_dir: None,
            object_format: ObjectFormat::default(),
            max_delta_depth: defaults::default_max_delta_depth(),
            skip_malformed_packs: defaults::default_skip_malformed_packs(),
            verify_object_ids: false,
        }
    }
}

impl PackConfig {
    /// Configuration for the object database at `objects_dir`
    pub fn for_objects_dir<P: AsRef<Path>>(objects_dir: P) -> Self {
        PackConfig {
            objects_dir: Some(expand_tilde(objects_dir.as_ref())),
            ..PackConfig::default()
        }
    }

    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: PackConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        if let Some(ref objects_dir) = config.objects_dir {
            config.objects_dir = Some(expand_tilde(objects_dir));
        }

        tracing::debug!("loaded pack config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Object database root, failing if none is configured
    pub fn objects_dir(&self) -> Result<&Path> {
        self.objects_dir
            .as_deref()
            .context("objects_dir is not set in pack config")
    }
}

mod defaults {
    pub(crate) fn default_max_delta_depth() -> usize {
        4096
    }

    pub(crate) fn default_skip_malformed_packs() -> bool {
        true
    }
}
