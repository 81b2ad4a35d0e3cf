// SPDX-License-Identifier: GPL-3.0-only

//! Per-filesystem lookup tables, rebuilt wholesale on every refresh.

use std::collections::{BTreeMap, HashMap};

use storage_types::{BtrfsMountpoint, ROOT_SUBVOLUME_ID};

use crate::subvolume::Subvolume;

/// Live mounts of one filesystem grouped by subvolume id
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    mountpoints: Vec<BtrfsMountpoint>,
    by_subvolume: HashMap<u64, Vec<BtrfsMountpoint>>,
}

impl MountTable {
    pub fn from_mountpoints(mountpoints: Vec<BtrfsMountpoint>) -> Self {
        let mut by_subvolume: HashMap<u64, Vec<BtrfsMountpoint>> = HashMap::new();
        for mountpoint in &mountpoints {
            by_subvolume
                .entry(mountpoint.subvolume_id())
                .or_default()
                .push(mountpoint.clone());
        }

        Self {
            mountpoints,
            by_subvolume,
        }
    }

    /// Mounts of one subvolume; empty if it is not mounted
    pub fn for_subvolume(&self, subvolume_id: u64) -> &[BtrfsMountpoint] {
        self.by_subvolume
            .get(&subvolume_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// First mount in `findmnt` order, usable as a handle into the filesystem
    pub fn any(&self) -> Option<&BtrfsMountpoint> {
        self.mountpoints.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BtrfsMountpoint> {
        self.mountpoints.iter()
    }

    pub fn mounted_subvolume_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.mountpoints
            .iter()
            .map(BtrfsMountpoint::subvolume_id)
    }

    pub fn len(&self) -> usize {
        self.mountpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mountpoints.is_empty()
    }
}

/// Subvolumes of one filesystem keyed by id.
///
/// The top-level subvolume (id 5) is always present.
#[derive(Debug, Clone)]
pub struct SubvolumeTree {
    root: Subvolume,
    others: BTreeMap<u64, Subvolume>,
}

impl Default for SubvolumeTree {
    fn default() -> Self {
        Self {
            root: Subvolume::filesystem_root(),
            others: BTreeMap::new(),
        }
    }
}

impl SubvolumeTree {
    /// Build a tree from a listing. A listed id 5 replaces the implicit root,
    /// but always keeps `/` as path and no parent.
    pub fn from_subvolumes(subvolumes: Vec<Subvolume>) -> Self {
        let mut tree = Self::default();
        for subvolume in subvolumes {
            if subvolume.id() == ROOT_SUBVOLUME_ID {
                let mut root = Subvolume::filesystem_root();
                root.set_mountpoints(subvolume.mountpoints().to_vec());
                tree.root = root;
            } else {
                tree.others.insert(subvolume.id(), subvolume);
            }
        }
        tree
    }

    pub fn root(&self) -> &Subvolume {
        &self.root
    }

    pub fn get(&self, id: u64) -> Option<&Subvolume> {
        if id == ROOT_SUBVOLUME_ID {
            Some(&self.root)
        } else {
            self.others.get(&id)
        }
    }

    /// Exact match on a normalized internal path
    pub fn by_path(&self, path: &str) -> Option<&Subvolume> {
        self.iter().find(|subvolume| subvolume.path() == path)
    }

    pub fn children(&self, parent_id: u64) -> impl Iterator<Item = &Subvolume> {
        self.others
            .values()
            .filter(move |subvolume| subvolume.parent_id() == Some(parent_id))
    }

    /// Root first, then ascending id
    pub fn iter(&self) -> impl Iterator<Item = &Subvolume> {
        std::iter::once(&self.root).chain(self.others.values())
    }

    pub fn len(&self) -> usize {
        self.others.len() + 1
    }

    /// Point every subvolume at its current entry in `mounts`
    pub fn attach_mountpoints(&mut self, mounts: &MountTable) {
        self.root
            .set_mountpoints(mounts.for_subvolume(ROOT_SUBVOLUME_ID).to_vec());
        for (id, subvolume) in &mut self.others {
            subvolume.set_mountpoints(mounts.for_subvolume(*id).to_vec());
        }
    }
}
