// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use storage_types::{BtrfsMountpoint, FilesystemSummary, ROOT_SUBVOLUME_ID};
use tracing::{debug, warn};

use crate::error::{BtrfsError, Result};
use crate::gateway::BtrfsGateway;
use crate::parse::{parse_default_subvolume_id, parse_findmnt, parse_subvolume_list};
use crate::path::{normalize_subvolume_path, parent_path};
use crate::subvolume::Subvolume;
use crate::tree::{MountTable, SubvolumeTree};

/// One BTRFS filesystem: its devices, subvolumes and live mounts.
///
/// The uuid is the identity; everything else is replaced on refresh.
#[derive(Debug, Clone)]
pub struct BtrfsFilesystem {
    uuid: String,
    label: Option<String>,
    devices: BTreeSet<PathBuf>,
    default_subvolume_id: u64,
    mounts: MountTable,
    subvolumes: SubvolumeTree,
}

impl BtrfsFilesystem {
    pub fn new(
        uuid: impl Into<String>,
        label: Option<String>,
        devices: impl IntoIterator<Item = PathBuf>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            label,
            devices: devices.into_iter().collect(),
            default_subvolume_id: ROOT_SUBVOLUME_ID,
            mounts: MountTable::default(),
            subvolumes: SubvolumeTree::default(),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    pub fn devices(&self) -> impl Iterator<Item = &Path> {
        self.devices.iter().map(PathBuf::as_path)
    }

    pub fn contains_device(&self, device: &Path) -> bool {
        self.devices.contains(device)
    }

    pub fn default_subvolume_id(&self) -> u64 {
        self.default_subvolume_id
    }

    pub fn is_default_subvolume(&self, subvolume_id: u64) -> bool {
        self.default_subvolume_id == subvolume_id
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    pub fn subvolumes(&self) -> &SubvolumeTree {
        &self.subvolumes
    }

    pub fn is_mounted(&self) -> bool {
        !self.mounts.is_empty()
    }

    /// Replace the mount table. Mounts of devices outside this filesystem are dropped.
    pub fn update_mountpoints(&mut self, mountpoints: Vec<BtrfsMountpoint>) {
        let (own, foreign): (Vec<_>, Vec<_>) = mountpoints
            .into_iter()
            .partition(|mountpoint| self.devices.contains(mountpoint.device()));
        if !foreign.is_empty() {
            debug!(
                "Ignoring {} mountpoints not backed by devices of {}",
                foreign.len(),
                self.uuid
            );
        }

        self.mounts = MountTable::from_mountpoints(own);
        self.subvolumes.attach_mountpoints(&self.mounts);
    }

    /// Replace the subvolume tree, keeping the links to already known mounts
    pub fn update_subvolumes(&mut self, subvolumes: Vec<Subvolume>) {
        let mut tree = SubvolumeTree::from_subvolumes(subvolumes);
        tree.attach_mountpoints(&self.mounts);
        self.subvolumes = tree;
    }

    /// Refresh mounts, then subvolumes, then the default subvolume id.
    ///
    /// Subvolumes and the default id are queried through a live mount, so
    /// the mounts have to be current first.
    pub fn refresh<G: BtrfsGateway + ?Sized>(&mut self, gateway: &G) -> Result<()> {
        self.refresh_mountpoints(gateway)?;
        self.refresh_subvolumes(gateway)?;
        self.refresh_default_subvolume(gateway)
    }

    pub fn refresh_mountpoints<G: BtrfsGateway + ?Sized>(&mut self, gateway: &G) -> Result<()> {
        let mountpoints = read_mountpoints(gateway)?;
        self.update_mountpoints(mountpoints);
        Ok(())
    }

    /// No-op while the filesystem has no live mount
    pub fn refresh_subvolumes<G: BtrfsGateway + ?Sized>(&mut self, gateway: &G) -> Result<()> {
        let Some(handle) = self.mount_handle() else {
            warn!("Filesystem {} is not mounted, keeping known subvolumes", self.uuid);
            return Ok(());
        };

        let output = gateway.list_subvolumes(&handle)?.into_stdout()?;
        self.update_subvolumes(parse_subvolume_list(&output)?);
        Ok(())
    }

    /// No-op while the filesystem has no live mount
    pub fn refresh_default_subvolume<G: BtrfsGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<()> {
        let Some(handle) = self.mount_handle() else {
            warn!("Filesystem {} is not mounted, keeping default subvolume", self.uuid);
            return Ok(());
        };

        let output = gateway.get_default_subvolume_id(&handle)?.into_stdout()?;
        self.default_subvolume_id = parse_default_subvolume_id(&output)?;
        Ok(())
    }

    fn mount_handle(&self) -> Option<PathBuf> {
        self.any_mountpoint()
            .map(|mountpoint| mountpoint.path().to_path_buf())
    }

    pub fn subvolume(&self, subvolume_id: u64) -> Option<&Subvolume> {
        self.subvolumes.get(subvolume_id)
    }

    pub fn root_subvolume(&self) -> &Subvolume {
        self.subvolumes.root()
    }

    /// Exact match on the normalized internal path
    pub fn subvolume_by_path(&self, internal_path: &str) -> Option<&Subvolume> {
        self.subvolumes
            .by_path(&normalize_subvolume_path(internal_path))
    }

    pub fn contains_subvolume(&self, internal_path: &str) -> bool {
        self.subvolume_by_path(internal_path).is_some()
    }

    pub fn parent_subvolume(&self, subvolume_id: u64) -> Option<&Subvolume> {
        self.subvolume(subvolume_id)
            .and_then(Subvolume::parent_id)
            .and_then(|parent_id| self.subvolume(parent_id))
    }

    pub fn subvolume_children(&self, subvolume_id: u64) -> Vec<&Subvolume> {
        self.subvolumes.children(subvolume_id).collect()
    }

    pub fn mountpoints_for_subvolume(&self, subvolume_id: u64) -> &[BtrfsMountpoint] {
        self.mounts.for_subvolume(subvolume_id)
    }

    /// Any live mount; every path into the filesystem works for metadata queries
    pub fn any_mountpoint(&self) -> Option<&BtrfsMountpoint> {
        self.mounts.any()
    }

    pub fn any_mounted_subvolume(&self) -> Option<&Subvolume> {
        self.mounts
            .mounted_subvolume_ids()
            .find_map(|subvolume_id| self.subvolume(subvolume_id))
    }

    /// The subvolume at `internal_path`, or the closest existing ancestor path.
    ///
    /// Falls back to the top-level subvolume, so it never fails.
    pub fn nearest_subvolume(&self, internal_path: &str) -> &Subvolume {
        let normalized = normalize_subvolume_path(internal_path);
        let mut candidate = normalized.as_str();

        loop {
            if let Some(subvolume) = self.subvolumes.by_path(candidate) {
                return subvolume;
            }
            match parent_path(candidate) {
                Some(parent) => candidate = parent,
                None => return self.subvolumes.root(),
            }
        }
    }

    /// Closest mounted subvolume walking up from `subvolume_id` (itself included),
    /// with its first mount.
    ///
    /// Returns `None` when no ancestor up to the top level is mounted or the
    /// parent chain is broken by a stale listing.
    pub fn mounted_ancestor(&self, subvolume_id: u64) -> Option<(&Subvolume, &BtrfsMountpoint)> {
        let mut current = self.subvolume(subvolume_id);
        let mut remaining = self.subvolumes.len();

        while let Some(subvolume) = current {
            if let Some(mountpoint) = subvolume.mountpoints().first() {
                return Some((subvolume, mountpoint));
            }
            if remaining == 0 {
                warn!("Parent cycle detected at subvolume {}", subvolume.id());
                return None;
            }
            remaining -= 1;
            current = subvolume
                .parent_id()
                .and_then(|parent_id| self.subvolume(parent_id));
        }

        None
    }

    /// VFS path of a subvolume: its own first mount, or the path reached through
    /// the closest mounted ancestor
    pub fn mounted_path(&self, subvolume_id: u64) -> Option<PathBuf> {
        let subvolume = self.subvolume(subvolume_id)?;
        let (ancestor, mountpoint) = self.mounted_ancestor(subvolume_id)?;
        let relative = ancestor.relative_child_path(subvolume.path()).ok()?;
        Some(join_relative(mountpoint.path(), &relative))
    }

    /// VFS path of `internal_path` reached through a mounted ancestor subvolume.
    ///
    /// When `internal_path` is itself a subvolume the search starts at its
    /// parent, so the result is usable for creating or deleting it.
    pub fn mount_path_as_child(&self, internal_path: &str) -> Result<PathBuf> {
        let target = normalize_subvolume_path(internal_path);
        let nearest = self.nearest_subvolume(&target);

        let ancestor = if nearest.path() == target {
            self.parent_subvolume(nearest.id())
        } else {
            Some(nearest)
        };

        let (mounted, mountpoint) = ancestor
            .and_then(|ancestor| self.mounted_ancestor(ancestor.id()))
            .ok_or_else(|| BtrfsError::UnresolvableMountPath(target.clone()))?;

        let relative = mounted.relative_child_path(&target)?;
        Ok(join_relative(mountpoint.path(), &relative))
    }

    /// Subvolume containing a VFS path.
    ///
    /// Uses the mount whose path is the longest prefix of `path`, then looks up
    /// the nearest subvolume below that mount's subvolume. `None` when no mount
    /// of this filesystem contains `path`.
    pub fn subvolume_for_vfs_path(&self, path: &Path) -> Option<&Subvolume> {
        let mountpoint = self
            .mounts
            .iter()
            .filter(|mountpoint| path.starts_with(mountpoint.path()))
            .max_by_key(|mountpoint| mountpoint.path().components().count())?;

        let offset = path.strip_prefix(mountpoint.path()).ok()?;
        let internal = normalize_subvolume_path(&format!(
            "{}/{}",
            mountpoint.subvolume_path(),
            offset.to_string_lossy()
        ));
        Some(self.nearest_subvolume(&internal))
    }

    pub fn summary(&self) -> FilesystemSummary {
        FilesystemSummary {
            uuid: self.uuid.clone(),
            label: self.label.clone(),
            devices: self.devices.iter().cloned().collect(),
            default_subvolume: self.default_subvolume_id,
            subvolumes: self.subvolumes.iter().map(Subvolume::summary).collect(),
        }
    }
}

fn join_relative(base: &Path, relative: &str) -> PathBuf {
    if relative.is_empty() {
        base.to_path_buf()
    } else {
        base.join(relative)
    }
}

/// Live BTRFS mounts on the host.
///
/// `findmnt` exits with 1 and prints nothing when there are no matching mounts;
/// that is an empty result, not a failure.
pub(crate) fn read_mountpoints<G: BtrfsGateway + ?Sized>(
    gateway: &G,
) -> Result<Vec<BtrfsMountpoint>> {
    let output = gateway.list_mountpoints()?;
    if output.status == 1 && output.stdout.trim().is_empty() && output.stderr.trim().is_empty() {
        debug!("No btrfs filesystems are mounted");
        return Ok(Vec::new());
    }

    parse_findmnt(&output.into_stdout()?)
}
