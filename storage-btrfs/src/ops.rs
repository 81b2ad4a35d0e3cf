// SPDX-License-Identifier: GPL-3.0-only

//! Subvolume mutations addressed by internal path.
//!
//! Each operation resolves the internal path to a VFS path through a mounted
//! ancestor, runs the tool and refreshes the filesystem afterwards.

use std::path::PathBuf;

use tracing::info;

use crate::error::{BtrfsError, Result};
use crate::filesystem::BtrfsFilesystem;
use crate::gateway::BtrfsGateway;
use crate::path::normalize_subvolume_path;

/// Create a subvolume at `internal_path`; returns the VFS path used
pub fn create_subvolume<G: BtrfsGateway + ?Sized>(
    filesystem: &mut BtrfsFilesystem,
    gateway: &G,
    internal_path: &str,
) -> Result<PathBuf> {
    let target = filesystem.mount_path_as_child(internal_path)?;
    info!("Creating subvolume {} at {}", internal_path, target.display());
    gateway.create_subvolume(&target)?;
    filesystem.refresh(gateway)?;
    Ok(target)
}

/// Delete the subvolume at `internal_path`; returns the VFS path used
pub fn delete_subvolume<G: BtrfsGateway + ?Sized>(
    filesystem: &mut BtrfsFilesystem,
    gateway: &G,
    internal_path: &str,
) -> Result<PathBuf> {
    require_subvolume(filesystem, internal_path)?;
    let target = filesystem.mount_path_as_child(internal_path)?;
    info!("Deleting subvolume {} at {}", internal_path, target.display());
    gateway.delete_subvolume(&target)?;
    filesystem.refresh(gateway)?;
    Ok(target)
}

/// Snapshot the subvolume at `source` to the internal path `destination`.
///
/// The source is reached through its own mount when it has one.
pub fn snapshot_subvolume<G: BtrfsGateway + ?Sized>(
    filesystem: &mut BtrfsFilesystem,
    gateway: &G,
    source: &str,
    destination: &str,
) -> Result<(PathBuf, PathBuf)> {
    let source_id = require_subvolume(filesystem, source)?;
    let source_path = filesystem
        .mounted_path(source_id)
        .ok_or_else(|| BtrfsError::UnresolvableMountPath(normalize_subvolume_path(source)))?;
    let destination_path = filesystem.mount_path_as_child(destination)?;
    info!(
        "Snapshotting {} to {}",
        source_path.display(),
        destination_path.display()
    );
    gateway.snapshot_subvolume(&source_path, &destination_path)?;
    filesystem.refresh(gateway)?;
    Ok((source_path, destination_path))
}

/// Make the subvolume at `internal_path` the default; returns its id
pub fn set_default_subvolume<G: BtrfsGateway + ?Sized>(
    filesystem: &mut BtrfsFilesystem,
    gateway: &G,
    internal_path: &str,
) -> Result<u64> {
    let subvolume_id = require_subvolume(filesystem, internal_path)?;
    set_default_subvolume_id(filesystem, gateway, subvolume_id)
}

/// Make the subvolume with `subvolume_id` the default.
///
/// The id must belong to a known subvolume; the call goes through any mountpoint.
pub fn set_default_subvolume_id<G: BtrfsGateway + ?Sized>(
    filesystem: &mut BtrfsFilesystem,
    gateway: &G,
    subvolume_id: u64,
) -> Result<u64> {
    let subvolume = filesystem
        .subvolume(subvolume_id)
        .ok_or_else(|| BtrfsError::SubvolumeNotFound(format!("id {subvolume_id}")))?;
    let handle = filesystem
        .any_mountpoint()
        .map(|mountpoint| mountpoint.path().to_path_buf())
        .ok_or_else(|| BtrfsError::UnresolvableMountPath(subvolume.path().to_string()))?;

    info!("Setting default subvolume of {} to {}", filesystem.uuid(), subvolume_id);
    gateway.set_default_subvolume_id(&handle, subvolume_id)?;
    filesystem.refresh(gateway)?;
    Ok(subvolume_id)
}

fn require_subvolume(filesystem: &BtrfsFilesystem, internal_path: &str) -> Result<u64> {
    filesystem
        .subvolume_by_path(internal_path)
        .map(|subvolume| subvolume.id())
        .ok_or_else(|| BtrfsError::SubvolumeNotFound(normalize_subvolume_path(internal_path)))
}
