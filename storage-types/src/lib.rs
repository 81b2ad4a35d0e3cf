// SPDX-License-Identifier: GPL-3.0-only

//! Shared data models for the BTRFS topology tooling
//!
//! These types cross crate boundaries: `storage-btrfs` builds them from
//! command output and the CLI serializes them as JSON.

pub mod btrfs;

pub use btrfs::{
    BtrfsMountpoint, FilesystemCriteria, FilesystemSummary, ROOT_SUBVOLUME_ID, SubvolumeSummary,
};
