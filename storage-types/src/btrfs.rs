// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Object id of the top-level subvolume (`FS_TREE`) of every BTRFS filesystem
pub const ROOT_SUBVOLUME_ID: u64 = 5;

/// A live mount of one BTRFS subvolume, as reported by `findmnt`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtrfsMountpoint {
    path: PathBuf,
    device: PathBuf,
    subvolume_id: u64,
    subvolume_path: String,
}

impl BtrfsMountpoint {
    /// `subvolume_path` is expected to be normalized already.
    pub fn new(
        path: impl Into<PathBuf>,
        device: impl Into<PathBuf>,
        subvolume_id: u64,
        subvolume_path: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            device: device.into(),
            subvolume_id,
            subvolume_path: subvolume_path.into(),
        }
    }

    /// VFS path the subvolume is mounted at
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block device backing the mount
    pub fn device(&self) -> &Path {
        &self.device
    }

    pub fn subvolume_id(&self) -> u64 {
        self.subvolume_id
    }

    /// Internal path of the mounted subvolume
    pub fn subvolume_path(&self) -> &str {
        &self.subvolume_path
    }
}

impl fmt::Display for BtrfsMountpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[ mountpoint: {}, device: {}, subvolid: {}, subvol: {} ]",
            self.path.display(),
            self.device.display(),
            self.subvolume_id,
            self.subvolume_path
        )
    }
}

/// Criteria used to select exactly one BTRFS filesystem.
///
/// Every criterion that is set must match; unset criteria match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemCriteria {
    pub uuid: Option<String>,
    pub label: Option<String>,
    pub device: Option<PathBuf>,
}

impl FilesystemCriteria {
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.uuid.is_none() && self.label.is_none() && self.device.is_none()
    }
}

impl fmt::Display for FilesystemCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uuid={} label={} device={}",
            self.uuid.as_deref().unwrap_or("-"),
            self.label.as_deref().unwrap_or("-"),
            self.device
                .as_deref()
                .map(|device| device.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        )
    }
}

/// Reporting view of one subvolume and where it is mounted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubvolumeSummary {
    pub id: u64,
    pub path: String,
    pub parent: Option<u64>,
    pub mountpoints: Vec<BtrfsMountpoint>,
}

/// Reporting view of a whole filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemSummary {
    pub uuid: String,
    pub label: Option<String>,
    pub devices: Vec<PathBuf>,
    pub default_subvolume: u64,
    pub subvolumes: Vec<SubvolumeSummary>,
}
