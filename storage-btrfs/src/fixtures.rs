// SPDX-License-Identifier: GPL-3.0-only

//! Scripted gateway and captured tool output shared by unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::gateway::{BtrfsGateway, CommandOutput};

pub(crate) const ROOT_UUID: &str = "2bdcd61d-079f-5f3d-b79e-05b15cc58a46";
pub(crate) const DATA_UUID: &str = "0e9ad6b0-4bd3-45c4-a4a7-2b0bf6a15c85";
pub(crate) const SPARE_UUID: &str = "41658c57-0fce-4281-a1f5-649207d7d3de";

pub(crate) const FILESYSTEM_SHOW: &str = "Label: 'ROOT'  uuid: 2bdcd61d-079f-5f3d-b79e-05b15cc58a46
\tTotal devices 1 FS bytes used 8.03GiB
\tdevid    1 size 20.00GiB used 10.02GiB path /dev/sda2

Label: 'DATA'  uuid: 0e9ad6b0-4bd3-45c4-a4a7-2b0bf6a15c85
\tTotal devices 2 FS bytes used 1.00TiB
\tdevid    1 size 2.00TiB used 1.01TiB path /dev/sdb
\tdevid    2 size 2.00TiB used 1.01TiB path /dev/sdc

Label: none  uuid: 41658c57-0fce-4281-a1f5-649207d7d3de
\tTotal devices 1 FS bytes used 144.00KiB
\tdevid    1 size 8.00GiB used 536.00MiB path /dev/sdd

";

pub(crate) const FINDMNT: &str = r#"TARGET="/" SOURCE="/dev/sda2" FSTYPE="btrfs" OPTIONS="rw,relatime,ssd,space_cache=v2,subvolid=256,subvol=/@"
TARGET="/home" SOURCE="/dev/sda2" FSTYPE="btrfs" OPTIONS="rw,relatime,ssd,space_cache=v2,subvolid=257,subvol=/@home"
TARGET="/srv" SOURCE="/dev/sdb" FSTYPE="btrfs" OPTIONS="rw,relatime,space_cache=v2,subvolid=5,subvol=/"
"#;

pub(crate) const ROOT_SUBVOLUMES: &str = "ID\tgen\tparent\ttop level\t\tpath\t
--\t---\t------\t---------\t\t----\t
256\t1200\t5\t\t5\t<FS_TREE>/@
257\t1201\t5\t\t5\t<FS_TREE>/@home
258\t1190\t5\t\t5\t<FS_TREE>/@snapshots
300\t1100\t256\t\t256\t<FS_TREE>/@/var/lib/portables
";

pub(crate) const DATA_SUBVOLUMES: &str = "ID\tgen\tparent\ttop level\t\tpath\t
--\t---\t------\t---------\t\t----\t
256\t90\t5\t\t5\t<FS_TREE>/backups
260\t95\t5\t\t5\t<FS_TREE>/media
";

/// Gateway replaying captured output and recording what was asked of it
pub(crate) struct FakeGateway {
    filesystems: String,
    mountpoints: CommandOutput,
    subvolumes: HashMap<PathBuf, String>,
    defaults: HashMap<PathBuf, String>,
    device_links: HashMap<PathBuf, PathBuf>,
    fail_subvolume_list: bool,
    queried: RefCell<Vec<PathBuf>>,
    mutations: RefCell<Vec<String>>,
    filesystem_listings: Cell<usize>,
}

impl FakeGateway {
    /// Three filesystems: ROOT mounted at `/` and `/home`, DATA at `/srv`, one unmounted
    pub(crate) fn host() -> Self {
        Self {
            filesystems: FILESYSTEM_SHOW.to_string(),
            mountpoints: output("findmnt -t btrfs -nvP", 0, FINDMNT, ""),
            subvolumes: HashMap::from([
                (PathBuf::from("/"), ROOT_SUBVOLUMES.to_string()),
                (PathBuf::from("/srv"), DATA_SUBVOLUMES.to_string()),
            ]),
            defaults: HashMap::from([
                (PathBuf::from("/"), "ID 256 gen 1200 top level 5 path @\n".to_string()),
                (PathBuf::from("/srv"), "ID 5 (FS_TREE)\n".to_string()),
            ]),
            device_links: HashMap::new(),
            fail_subvolume_list: false,
            queried: RefCell::new(Vec::new()),
            mutations: RefCell::new(Vec::new()),
            filesystem_listings: Cell::new(0),
        }
    }

    /// Same filesystems, nothing mounted (`findmnt` exits 1 without output)
    pub(crate) fn without_mounts() -> Self {
        Self {
            mountpoints: output("findmnt -t btrfs -nvP", 1, "", ""),
            ..Self::host()
        }
    }

    /// Replace the `findmnt` result with the given exit status and output
    pub(crate) fn with_mountpoints(mut self, status: i32, stdout: &str, stderr: &str) -> Self {
        self.mountpoints = output("findmnt -t btrfs -nvP", status, stdout, stderr);
        self
    }

    pub(crate) fn failing_subvolume_list(mut self) -> Self {
        self.fail_subvolume_list = true;
        self
    }

    pub(crate) fn with_filesystems(mut self, filesystems: &str) -> Self {
        self.filesystems = filesystems.to_string();
        self
    }

    pub(crate) fn with_device_link(mut self, link: &str, target: &str) -> Self {
        self.device_links
            .insert(PathBuf::from(link), PathBuf::from(target));
        self
    }

    /// Paths handed to subvolume list and get-default queries, in order
    pub(crate) fn queried_paths(&self) -> Vec<PathBuf> {
        self.queried.borrow().clone()
    }

    pub(crate) fn mutations(&self) -> Vec<String> {
        self.mutations.borrow().clone()
    }

    pub(crate) fn filesystem_listings(&self) -> usize {
        self.filesystem_listings.get()
    }

    fn record(&self, mutation: String) -> Result<()> {
        self.mutations.borrow_mut().push(mutation);
        Ok(())
    }
}

fn output(command: &str, status: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        command: command.to_string(),
        status,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

impl BtrfsGateway for FakeGateway {
    fn list_filesystems(&self) -> Result<CommandOutput> {
        self.filesystem_listings.set(self.filesystem_listings.get() + 1);
        Ok(output("btrfs filesystem show -d", 0, &self.filesystems, ""))
    }

    fn list_mountpoints(&self) -> Result<CommandOutput> {
        Ok(self.mountpoints.clone())
    }

    fn list_subvolumes(&self, mounted_path: &Path) -> Result<CommandOutput> {
        self.queried.borrow_mut().push(mounted_path.to_path_buf());
        let command = format!("btrfs subvolume list -tap {}", mounted_path.display());
        match self.subvolumes.get(mounted_path) {
            Some(listing) if !self.fail_subvolume_list => Ok(output(&command, 0, listing, "")),
            _ => Ok(output(&command, 1, "", "ERROR: not a btrfs filesystem\n")),
        }
    }

    fn get_default_subvolume_id(&self, mounted_path: &Path) -> Result<CommandOutput> {
        self.queried.borrow_mut().push(mounted_path.to_path_buf());
        let command = format!("btrfs subvolume get-default {}", mounted_path.display());
        match self.defaults.get(mounted_path) {
            Some(default) => Ok(output(&command, 0, default, "")),
            None => Ok(output(&command, 1, "", "ERROR: not a btrfs filesystem\n")),
        }
    }

    fn set_default_subvolume_id(&self, mounted_path: &Path, subvolume_id: u64) -> Result<()> {
        self.record(format!("set-default {} {}", subvolume_id, mounted_path.display()))
    }

    fn create_subvolume(&self, path: &Path) -> Result<()> {
        self.record(format!("create {}", path.display()))
    }

    fn delete_subvolume(&self, path: &Path) -> Result<()> {
        self.record(format!("delete {}", path.display()))
    }

    fn snapshot_subvolume(&self, source: &Path, destination: &Path) -> Result<()> {
        self.record(format!("snapshot {} {}", source.display(), destination.display()))
    }

    fn canonical_device(&self, device: &Path) -> PathBuf {
        self.device_links
            .get(device)
            .cloned()
            .unwrap_or_else(|| device.to_path_buf())
    }
}
