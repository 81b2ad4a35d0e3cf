// SPDX-License-Identifier: GPL-3.0-only

//! Execution of the `btrfs` and `findmnt` tools.
//!
//! The topology model only talks to [`BtrfsGateway`]; [`BtrfsCli`] is the
//! implementation that runs the real binaries.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::config::ToolsConfig;
use crate::error::{BtrfsError, Result};

/// Captured result of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub command: String,
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Stdout of a successful run; a non-zero exit becomes [`BtrfsError::CommandFailed`]
    pub fn into_stdout(self) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(self.into_error())
        }
    }

    pub fn into_error(self) -> BtrfsError {
        BtrfsError::CommandFailed {
            command: self.command,
            status: self.status,
            stderr: self.stderr.trim().to_string(),
        }
    }
}

/// Inspection and mutation calls against BTRFS filesystems
pub trait BtrfsGateway {
    /// `btrfs filesystem show -d`
    fn list_filesystems(&self) -> Result<CommandOutput>;

    /// `findmnt -t btrfs -nvP`
    fn list_mountpoints(&self) -> Result<CommandOutput>;

    /// `btrfs subvolume list -tap <mounted_path>`
    fn list_subvolumes(&self, mounted_path: &Path) -> Result<CommandOutput>;

    /// `btrfs subvolume get-default <mounted_path>`
    fn get_default_subvolume_id(&self, mounted_path: &Path) -> Result<CommandOutput>;

    fn set_default_subvolume_id(&self, mounted_path: &Path, subvolume_id: u64) -> Result<()>;

    fn create_subvolume(&self, path: &Path) -> Result<()>;

    fn delete_subvolume(&self, path: &Path) -> Result<()>;

    fn snapshot_subvolume(&self, source: &Path, destination: &Path) -> Result<()>;

    /// Canonical form of a device path, following symlinks.
    ///
    /// Paths that cannot be resolved are returned unchanged.
    fn canonical_device(&self, device: &Path) -> PathBuf {
        fs::canonicalize(device).unwrap_or_else(|_| device.to_path_buf())
    }
}

/// Gateway running the `btrfs` and `findmnt` binaries
#[derive(Debug, Clone)]
pub struct BtrfsCli {
    btrfs: PathBuf,
    findmnt: PathBuf,
}

impl BtrfsCli {
    /// Locate both tools on `PATH`
    pub fn new() -> Result<Self> {
        Self::from_config(&ToolsConfig::default())
    }

    pub fn from_config(config: &ToolsConfig) -> Result<Self> {
        let btrfs = config.resolve_btrfs()?;
        let findmnt = config.resolve_findmnt()?;
        debug!("Using btrfs at {:?}, findmnt at {:?}", btrfs, findmnt);
        Ok(Self { btrfs, findmnt })
    }

    fn run(&self, program: &Path, args: &[&OsStr]) -> Result<CommandOutput> {
        let command = render(program, args);
        debug!("Running {}", command);

        let output = Command::new(program).args(args).output()?;
        let status = output.status.code().unwrap_or(-1);
        if status != 0 {
            warn!("{} exited with status {}", command, status);
        }

        Ok(CommandOutput {
            command,
            status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn run_btrfs(&self, args: &[&OsStr]) -> Result<()> {
        let output = self.run(&self.btrfs, args)?;
        if output.success() {
            Ok(())
        } else {
            Err(output.into_error())
        }
    }
}

impl BtrfsGateway for BtrfsCli {
    fn list_filesystems(&self) -> Result<CommandOutput> {
        self.run(&self.btrfs, &[OsStr::new("filesystem"), OsStr::new("show"), OsStr::new("-d")])
    }

    fn list_mountpoints(&self) -> Result<CommandOutput> {
        self.run(&self.findmnt, &[OsStr::new("-t"), OsStr::new("btrfs"), OsStr::new("-nvP")])
    }

    fn list_subvolumes(&self, mounted_path: &Path) -> Result<CommandOutput> {
        self.run(
            &self.btrfs,
            &[
                OsStr::new("subvolume"),
                OsStr::new("list"),
                OsStr::new("-tap"),
                mounted_path.as_os_str(),
            ],
        )
    }

    fn get_default_subvolume_id(&self, mounted_path: &Path) -> Result<CommandOutput> {
        self.run(
            &self.btrfs,
            &[
                OsStr::new("subvolume"),
                OsStr::new("get-default"),
                mounted_path.as_os_str(),
            ],
        )
    }

    fn set_default_subvolume_id(&self, mounted_path: &Path, subvolume_id: u64) -> Result<()> {
        let id = subvolume_id.to_string();
        self.run_btrfs(&[
            OsStr::new("subvolume"),
            OsStr::new("set-default"),
            OsStr::new(&id),
            mounted_path.as_os_str(),
        ])
    }

    fn create_subvolume(&self, path: &Path) -> Result<()> {
        self.run_btrfs(&[OsStr::new("subvolume"), OsStr::new("create"), path.as_os_str()])
    }

    fn delete_subvolume(&self, path: &Path) -> Result<()> {
        self.run_btrfs(&[OsStr::new("subvolume"), OsStr::new("delete"), path.as_os_str()])
    }

    fn snapshot_subvolume(&self, source: &Path, destination: &Path) -> Result<()> {
        self.run_btrfs(&[
            OsStr::new("subvolume"),
            OsStr::new("snapshot"),
            source.as_os_str(),
            destination.as_os_str(),
        ])
    }
}

fn render(program: &Path, args: &[&OsStr]) -> String {
    let mut rendered = program.display().to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}
