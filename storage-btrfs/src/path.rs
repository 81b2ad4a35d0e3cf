// SPDX-License-Identifier: GPL-3.0-only

//! Helpers for BTRFS internal subvolume paths.
//!
//! Internal paths live in the filesystem's own namespace (as printed by
//! `btrfs subvolume list`), not in the VFS.

use crate::error::{BtrfsError, Result};

/// Marker `btrfs subvolume list -a` puts in front of paths below the top-level subvolume
pub const FS_TREE_MARKER: &str = "<FS_TREE>";

/// Normalize an internal subvolume path.
///
/// The result has exactly one leading slash, no trailing or repeated slashes
/// and no leading `<FS_TREE>` marker. An empty path becomes `/`.
pub fn normalize_subvolume_path(raw: &str) -> String {
    let stripped = raw.strip_prefix(FS_TREE_MARKER).unwrap_or(raw);
    let segments: Vec<&str> = stripped
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Path of `child` relative to `parent`, without leading slashes.
///
/// `parent` must be a literal prefix of `child`; both are expected to be normalized.
pub fn relative_child_path(parent: &str, child: &str) -> Result<String> {
    child
        .strip_prefix(parent)
        .map(|relative| relative.trim_start_matches('/').to_string())
        .ok_or_else(|| BtrfsError::PathMismatch {
            parent: parent.to_string(),
            child: child.to_string(),
        })
}

/// Drop the last segment of a normalized path. Returns `None` for `/`.
pub(crate) fn parent_path(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) if path.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(index) => Some(&path[..index]),
    }
}

/// Last segment of a normalized path; empty for `/`.
pub(crate) fn path_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}
