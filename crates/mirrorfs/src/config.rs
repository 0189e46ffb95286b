//! Bridge configuration.
//!
//! Loaded from RON:
//!
//! ```ron
//! (
//!     root: "/srv/data",
//!     read_only: true,
//!     fs_name: "mirrorfs",
//!     subtype: "bindfs",
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VfsError, VfsResult};

fn default_fs_name() -> String {
    "mirrorfs".to_string()
}

fn default_subtype() -> String {
    "bindfs".to_string()
}

/// Mount configuration for a [`crate::MirrorFs`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Host directory to mirror.
    pub root: PathBuf,
    /// Reject every mutating operation with `ReadOnly`.
    #[serde(default)]
    pub read_only: bool,
    /// Filesystem name reported to the transport.
    #[serde(default = "default_fs_name")]
    pub fs_name: String,
    /// Filesystem subtype reported to the transport.
    #[serde(default = "default_subtype")]
    pub subtype: String,
}

impl MirrorConfig {
    /// Writable mirror of `root` with default identity.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: false,
            fs_name: default_fs_name(),
            subtype: default_subtype(),
        }
    }

    /// Set the read-only flag.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Parse a RON document.
    pub fn from_ron(text: &str) -> VfsResult<Self> {
        ron::from_str(text).map_err(|e| VfsError::config(e.to_string()))
    }

    /// Load a RON config file. A relative `root` is taken relative to the
    /// directory holding the file.
    pub fn load(path: &Path) -> VfsResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| VfsError::config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_ron(&text)?;
        if config.root.is_relative() {
            if let Some(dir) = path.parent() {
                config.root = dir.join(&config.root);
            }
        }
        Ok(config)
    }
}
