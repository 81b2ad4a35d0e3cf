// SPDX-License-Identifier: GPL-3.0-only

use storage_types::{BtrfsMountpoint, ROOT_SUBVOLUME_ID, SubvolumeSummary};

use crate::error::Result;
use crate::path::{normalize_subvolume_path, path_name, relative_child_path};

/// One subvolume of a BTRFS filesystem.
///
/// The parent is referenced by id only and resolved through the owning
/// [`BtrfsFilesystem`](crate::BtrfsFilesystem).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subvolume {
    id: u64,
    path: String,
    parent_id: Option<u64>,
    mountpoints: Vec<BtrfsMountpoint>,
}

impl Subvolume {
    /// Create a subvolume record; `path` is normalized on the way in
    pub fn new(id: u64, path: &str, parent_id: Option<u64>) -> Self {
        Self {
            id,
            path: normalize_subvolume_path(path),
            parent_id,
            mountpoints: Vec::new(),
        }
    }

    /// The top-level subvolume every filesystem has
    pub fn filesystem_root() -> Self {
        Self::new(ROOT_SUBVOLUME_ID, "/", None)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Internal path, always normalized
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    /// Last segment of the internal path
    pub fn name(&self) -> &str {
        path_name(&self.path)
    }

    /// Live mounts of this subvolume, in `findmnt` order
    pub fn mountpoints(&self) -> &[BtrfsMountpoint] {
        &self.mountpoints
    }

    pub fn is_mounted(&self) -> bool {
        !self.mountpoints.is_empty()
    }

    pub fn is_filesystem_root(&self) -> bool {
        self.id == ROOT_SUBVOLUME_ID
    }

    /// Path of a (normalized) descendant path relative to this subvolume
    pub fn relative_child_path(&self, child: &str) -> Result<String> {
        relative_child_path(&self.path, child)
    }

    pub fn summary(&self) -> SubvolumeSummary {
        SubvolumeSummary {
            id: self.id,
            path: self.path.clone(),
            parent: self.parent_id,
            mountpoints: self.mountpoints.clone(),
        }
    }

    pub(crate) fn set_mountpoints(&mut self, mountpoints: Vec<BtrfsMountpoint>) {
        self.mountpoints = mountpoints;
    }
}
