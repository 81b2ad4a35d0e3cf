// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeMap;
use std::path::Path;

use storage_types::FilesystemCriteria;
use tracing::{debug, info};

use crate::error::{BtrfsError, Result};
use crate::filesystem::{BtrfsFilesystem, read_mountpoints};
use crate::gateway::BtrfsGateway;
use crate::parse::parse_filesystem_show;

/// Discovered filesystems keyed by uuid
pub type FilesystemMap = BTreeMap<String, BtrfsFilesystem>;

/// Cache state of a [`FilesystemRegistry`]
#[derive(Debug, Clone, Default)]
pub enum RegistryState {
    #[default]
    NotLoaded,
    Loaded(FilesystemMap),
}

/// All BTRFS filesystems visible on the host, discovered once on first use.
///
/// Nothing invalidates the cache except [`FilesystemRegistry::invalidate`].
#[derive(Debug, Clone, Default)]
pub struct FilesystemRegistry {
    state: RegistryState,
}

impl FilesystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, RegistryState::Loaded(_))
    }

    /// Drop the cache; the next query rediscovers
    pub fn invalidate(&mut self) {
        debug!("Invalidating btrfs filesystem registry");
        self.state = RegistryState::NotLoaded;
    }

    /// Discover on first call, then serve the cached map
    pub fn discover_all<G: BtrfsGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<&mut FilesystemMap> {
        match self.state {
            RegistryState::Loaded(ref mut filesystems) => Ok(filesystems),
            RegistryState::NotLoaded => {
                self.state = RegistryState::Loaded(discover_filesystems(gateway)?);
                self.discover_all(gateway)
            }
        }
    }

    pub fn filesystems<G: BtrfsGateway + ?Sized>(
        &mut self,
        gateway: &G,
    ) -> Result<Vec<&BtrfsFilesystem>> {
        Ok(self.discover_all(gateway)?.values().collect())
    }

    pub fn get<G: BtrfsGateway + ?Sized>(
        &mut self,
        gateway: &G,
        uuid: &str,
    ) -> Result<Option<&mut BtrfsFilesystem>> {
        Ok(self.discover_all(gateway)?.get_mut(uuid))
    }

    /// The single filesystem matching every criterion that is set.
    ///
    /// The device is compared in canonical form. Zero matches is
    /// [`BtrfsError::NoMatch`], more than one [`BtrfsError::AmbiguousMatch`].
    pub fn find_by_criteria<G: BtrfsGateway + ?Sized>(
        &mut self,
        gateway: &G,
        criteria: &FilesystemCriteria,
    ) -> Result<&mut BtrfsFilesystem> {
        let mut criteria = criteria.clone();
        criteria.device = criteria
            .device
            .as_deref()
            .map(|device| gateway.canonical_device(device));

        let filesystems = self.discover_all(gateway)?;
        let matching: Vec<String> = filesystems
            .values()
            .filter(|filesystem| matches_criteria(filesystem, &criteria))
            .map(|filesystem| filesystem.uuid().to_string())
            .collect();

        match matching.as_slice() {
            [uuid] => filesystems
                .get_mut(uuid)
                .ok_or_else(|| BtrfsError::NoMatch(criteria.to_string())),
            [] => Err(BtrfsError::NoMatch(criteria.to_string())),
            many => Err(BtrfsError::AmbiguousMatch {
                count: many.len(),
                criteria: criteria.to_string(),
            }),
        }
    }

    /// Filesystem owning `device`, if any
    pub fn find_by_device<G: BtrfsGateway + ?Sized>(
        &mut self,
        gateway: &G,
        device: &Path,
    ) -> Result<Option<&mut BtrfsFilesystem>> {
        let device = gateway.canonical_device(device);
        Ok(self
            .discover_all(gateway)?
            .values_mut()
            .find(|filesystem| filesystem.contains_device(&device)))
    }
}

fn matches_criteria(filesystem: &BtrfsFilesystem, criteria: &FilesystemCriteria) -> bool {
    criteria
        .uuid
        .as_deref()
        .is_none_or(|uuid| filesystem.uuid() == uuid)
        && criteria
            .label
            .as_deref()
            .is_none_or(|label| filesystem.label() == Some(label))
        && criteria
            .device
            .as_deref()
            .is_none_or(|device| filesystem.contains_device(device))
}

/// Build every filesystem from one `filesystem show` and one `findmnt` run,
/// then load subvolumes and the default id of those that are mounted
pub fn discover_filesystems<G: BtrfsGateway + ?Sized>(gateway: &G) -> Result<FilesystemMap> {
    let shown = parse_filesystem_show(&gateway.list_filesystems()?.into_stdout()?)?;
    let mountpoints = read_mountpoints(gateway)?;

    let mut filesystems = FilesystemMap::new();
    for record in shown {
        let mut filesystem = BtrfsFilesystem::new(record.uuid, record.label, record.devices);
        filesystem.update_mountpoints(mountpoints.clone());
        filesystem.refresh_subvolumes(gateway)?;
        filesystem.refresh_default_subvolume(gateway)?;

        debug!(
            "Discovered filesystem {} with {} subvolumes and {} mounts",
            filesystem.uuid(),
            filesystem.subvolumes().len(),
            filesystem.mounts().len()
        );
        filesystems.insert(filesystem.uuid().to_string(), filesystem);
    }

    info!("Discovered {} btrfs filesystems", filesystems.len());
    Ok(filesystems)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::fixtures::{DATA_UUID, FakeGateway, ROOT_UUID, SPARE_UUID};

    #[test]
    fn discovers_every_filesystem_once() {
        let gateway = FakeGateway::host();
        let mut registry = FilesystemRegistry::new();
        assert!(!registry.is_loaded());

        assert_eq!(registry.filesystems(&gateway).unwrap().len(), 3);
        assert_eq!(registry.filesystems(&gateway).unwrap().len(), 3);
        assert!(registry.is_loaded());
        assert_eq!(gateway.filesystem_listings(), 1);
    }

    #[test]
    fn invalidate_forces_rediscovery() {
        let gateway = FakeGateway::host();
        let mut registry = FilesystemRegistry::new();

        registry.discover_all(&gateway).unwrap();
        registry.invalidate();
        assert!(matches!(registry.state(), RegistryState::NotLoaded));
        registry.discover_all(&gateway).unwrap();
        assert_eq!(gateway.filesystem_listings(), 2);
    }

    #[test]
    fn failed_discovery_leaves_registry_unloaded() {
        let gateway = FakeGateway::host().with_filesystems("Label: 'ROOT'\n");
        let mut registry = FilesystemRegistry::new();

        assert!(registry.discover_all(&gateway).is_err());
        assert!(!registry.is_loaded());
    }

    #[test]
    fn discovery_loads_mounted_filesystems() {
        let gateway = FakeGateway::host();
        let filesystems = discover_filesystems(&gateway).unwrap();

        let root = &filesystems[ROOT_UUID];
        assert_eq!(root.label(), Some("ROOT"));
        assert_eq!(root.default_subvolume_id(), 256);
        assert_eq!(root.subvolumes().len(), 5);
        assert_eq!(root.mounts().len(), 2);

        let data = &filesystems[DATA_UUID];
        assert_eq!(data.devices().count(), 2);
        assert_eq!(data.subvolume_by_path("/media").map(|s| s.id()), Some(260));
        assert_eq!(data.default_subvolume_id(), 5);

        let spare = &filesystems[SPARE_UUID];
        assert_eq!(spare.label(), None);
        assert!(!spare.is_mounted());
        assert_eq!(spare.subvolumes().len(), 1);
    }

    #[test]
    fn discovery_tolerates_hosts_without_mounts() {
        let gateway = FakeGateway::without_mounts();
        let filesystems = discover_filesystems(&gateway).unwrap();

        assert_eq!(filesystems.len(), 3);
        assert!(filesystems.values().all(|fs| !fs.is_mounted()));
        assert!(gateway.queried_paths().is_empty());
    }

    #[test]
    fn discovery_fails_on_malformed_listing() {
        let gateway = FakeGateway::host().with_filesystems("Label: 'ROOT'\n");
        assert!(matches!(
            discover_filesystems(&gateway),
            Err(BtrfsError::Parse { .. })
        ));
    }

    #[test]
    fn finds_by_uuid_only() {
        let gateway = FakeGateway::host();
        let mut registry = FilesystemRegistry::new();

        let criteria = FilesystemCriteria::default().with_uuid(DATA_UUID);
        let filesystem = registry.find_by_criteria(&gateway, &criteria).unwrap();
        assert_eq!(filesystem.label(), Some("DATA"));
    }

    #[test]
    fn finds_by_label_and_device() {
        let gateway = FakeGateway::host();
        let mut registry = FilesystemRegistry::new();

        let criteria = FilesystemCriteria::default()
            .with_label("DATA")
            .with_device("/dev/sdc");
        assert_eq!(
            registry.find_by_criteria(&gateway, &criteria).unwrap().uuid(),
            DATA_UUID
        );
    }

    #[test]
    fn device_criterion_follows_links() {
        let gateway =
            FakeGateway::host().with_device_link("/dev/disk/by-label/ROOT", "/dev/sda2");
        let mut registry = FilesystemRegistry::new();

        let criteria = FilesystemCriteria::default().with_device("/dev/disk/by-label/ROOT");
        assert_eq!(
            registry.find_by_criteria(&gateway, &criteria).unwrap().uuid(),
            ROOT_UUID
        );
    }

    #[test]
    fn empty_criteria_are_ambiguous() {
        let gateway = FakeGateway::host();
        let mut registry = FilesystemRegistry::new();

        let err = registry
            .find_by_criteria(&gateway, &FilesystemCriteria::default())
            .unwrap_err();
        assert!(matches!(err, BtrfsError::AmbiguousMatch { count: 3, .. }));
    }

    #[test]
    fn conflicting_criteria_match_nothing() {
        let gateway = FakeGateway::host();
        let mut registry = FilesystemRegistry::new();

        let criteria = FilesystemCriteria::default()
            .with_uuid(ROOT_UUID)
            .with_label("DATA");
        let err = registry.find_by_criteria(&gateway, &criteria).unwrap_err();
        assert!(matches!(err, BtrfsError::NoMatch(_)));
    }

    #[test]
    fn find_by_device_returns_none_when_unknown() {
        let gateway = FakeGateway::host().with_device_link("/dev/root", "/dev/sda2");
        let mut registry = FilesystemRegistry::new();

        assert_eq!(
            registry
                .find_by_device(&gateway, &PathBuf::from("/dev/root"))
                .unwrap()
                .map(|fs| fs.uuid().to_string()),
            Some(ROOT_UUID.to_string())
        );
        assert!(registry
            .find_by_device(&gateway, &PathBuf::from("/dev/nvme9n1"))
            .unwrap()
            .is_none());
    }
}
