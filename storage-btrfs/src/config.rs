// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use which::which;

use crate::error::{BtrfsError, Result};

/// Environment variable pointing at a TOML tools configuration file
pub const CONFIG_ENV: &str = "STORAGE_BTRFS_CONFIG";

/// Locations of the external tools the gateway runs.
///
/// ```toml
/// btrfs = "/usr/sbin/btrfs"
/// findmnt = "/usr/bin/findmnt"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub btrfs: Option<PathBuf>,
    pub findmnt: Option<PathBuf>,
}

impl ToolsConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| BtrfsError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading tools configuration from {}", path.display());
        let raw = fs::read_to_string(path).map_err(|e| {
            BtrfsError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load from the file named by [`CONFIG_ENV`], or defaults when it is unset
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn resolve_btrfs(&self) -> Result<PathBuf> {
        resolve_tool(self.btrfs.as_deref(), "btrfs")
    }

    pub fn resolve_findmnt(&self) -> Result<PathBuf> {
        resolve_tool(self.findmnt.as_deref(), "findmnt")
    }
}

fn resolve_tool(configured: Option<&Path>, name: &str) -> Result<PathBuf> {
    match configured {
        Some(path) => Ok(path.to_path_buf()),
        None => which(name).map_err(|_| BtrfsError::ToolNotFound(name.to_string())),
    }
}
