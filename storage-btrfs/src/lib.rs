// SPDX-License-Identifier: GPL-3.0-only

//! BTRFS subvolume topology library
//!
//! Builds an in-memory model of the BTRFS filesystems on the host from
//! `btrfs` and `findmnt` output and answers where a subvolume can be reached
//! in the VFS, even when the subvolume itself is not mounted.

pub mod config;
pub mod error;
pub mod filesystem;
pub mod gateway;
pub mod ops;
pub mod parse;
pub mod path;
pub mod registry;
pub mod subvolume;
pub mod tree;

#[cfg(test)]
mod fixtures;

// Re-export commonly used types
pub use config::{CONFIG_ENV, ToolsConfig};
pub use error::{BtrfsError, Result};
pub use filesystem::BtrfsFilesystem;
pub use gateway::{BtrfsCli, BtrfsGateway, CommandOutput};
pub use path::{normalize_subvolume_path, relative_child_path};
pub use registry::{FilesystemMap, FilesystemRegistry, RegistryState, discover_filesystems};
pub use subvolume::Subvolume;
pub use tree::{MountTable, SubvolumeTree};

// Re-export shared models
pub use storage_types::btrfs::*;
