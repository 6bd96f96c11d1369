//! A single compute site.

use std::collections::BTreeMap;
use std::path::Path;

use crate::directory::{Directory, DirectoryType};
use crate::file_server::{FileServer, Operation};
use crate::grid::{GridGateway, JobType};
use crate::profile::{Namespace, Profile, Profiles};
use crate::replica::ReplicaCatalog;
use crate::sysinfo::{Architecture, Os, SysInfo};
use crate::{Error, Result};

pub const PEGASUS_HOME: &str = "PEGASUS_HOME";
pub const VDS_HOME: &str = "VDS_HOME";
pub const PEGASUS_BIN_DIR: &str = "PEGASUS_BIN_DIR";
/// `pegasus` profile marking a site whose files the submit host can read directly.
pub const LOCAL_VISIBLE_KEY: &str = "auxillary.local";

/// Install directory named by `variable`, else the parent of `PEGASUS_BIN_DIR`.
///
/// Empty values count as unset.
pub(crate) fn install_home<'a>(
    variable: &str,
    lookup: impl Fn(&str) -> Option<&'a str>,
) -> Option<String> {
    let set = |name: &str| lookup(name).filter(|value| !value.is_empty());
    if let Some(home) = set(variable) {
        return Some(home.to_string());
    }
    let bin_dir = Path::new(set(PEGASUS_BIN_DIR)?);
    match bin_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Some(parent.display().to_string()),
        _ => Some(bin_dir.join("..").display().to_string()),
    }
}

/// A named compute resource and everything the planner needs to reach it.
///
/// Directories are unique per [`DirectoryType`] and gateways are unique per
/// [`JobType`]. `Clone` is a deep copy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Site {
    handle: String,
    pub sysinfo: SysInfo,
    directories: BTreeMap<DirectoryType, Directory>,
    grid_gateways: BTreeMap<JobType, GridGateway>,
    replica_catalogs: Vec<ReplicaCatalog>,
    profiles: Profiles,
}

impl Site {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            ..Self::default()
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn set_handle(&mut self, handle: impl Into<String>) {
        self.handle = handle.into();
    }

    pub fn arch(&self) -> Architecture {
        self.sysinfo.arch
    }

    pub fn os(&self) -> Os {
        self.sysinfo.os
    }

    /// Add a directory, failing if one of the same type is already present.
    pub fn add_directory(&mut self, directory: Directory) -> Result<()> {
        if self.directories.contains_key(&directory.kind) {
            return Err(Error::DuplicateDirectoryType {
                site: self.handle.clone(),
                directory_type: directory.kind,
            });
        }
        self.directories.insert(directory.kind, directory);
        Ok(())
    }

    /// Insert or replace the directory of this type, returning the previous one.
    pub fn set_directory(&mut self, directory: Directory) -> Option<Directory> {
        self.directories.insert(directory.kind, directory)
    }

    pub fn directory(&self, kind: DirectoryType) -> Option<&Directory> {
        self.directories.get(&kind)
    }

    pub fn directory_mut(&mut self, kind: DirectoryType) -> Option<&mut Directory> {
        self.directories.get_mut(&kind)
    }

    pub fn remove_directory(&mut self, kind: DirectoryType) -> Option<Directory> {
        self.directories.remove(&kind)
    }

    pub fn directories(&self) -> impl Iterator<Item = &Directory> {
        self.directories.values()
    }

    /// Local storage if declared, shared storage otherwise.
    pub fn head_node_storage_directory(&self) -> Option<&Directory> {
        self.directory(DirectoryType::LocalStorage)
            .or_else(|| self.directory(DirectoryType::SharedStorage))
    }

    pub fn work_directory_mount_point(&self) -> Option<&str> {
        self.directory(DirectoryType::SharedScratch)
            .and_then(Directory::mount_point)
    }

    pub fn select_shared_scratch_file_server(&self, operation: Operation) -> Option<&FileServer> {
        self.directory(DirectoryType::SharedScratch)?
            .select_file_server(operation)
    }

    pub fn select_storage_file_server_for_stageout(
        &self,
        operation: Operation,
    ) -> Option<&FileServer> {
        self.head_node_storage_directory()?
            .select_file_server(operation)
    }

    /// Insert or replace the gateway for its job type.
    pub fn add_grid_gateway(&mut self, gateway: GridGateway) -> Option<GridGateway> {
        self.grid_gateways.insert(gateway.job_type, gateway)
    }

    pub fn grid_gateway(&self, job_type: JobType) -> Option<&GridGateway> {
        self.grid_gateways.get(&job_type)
    }

    pub fn grid_gateways(&self) -> impl Iterator<Item = &GridGateway> {
        self.grid_gateways.values()
    }

    /// Gateway for `job_type`, falling back transfer/cleanup/register → auxiliary → compute.
    pub fn select_grid_gateway(&self, job_type: JobType) -> Option<&GridGateway> {
        match self.grid_gateway(job_type) {
            Some(gateway) => Some(gateway),
            None => match job_type {
                JobType::Transfer | JobType::Cleanup | JobType::Register => {
                    self.select_grid_gateway(JobType::Auxiliary)
                }
                JobType::Auxiliary => self.select_grid_gateway(JobType::Compute),
                JobType::Compute => None,
            },
        }
    }

    /// Remove the gateway with this contact. Returns whether one was removed.
    pub fn remove_grid_gateway(&mut self, contact: &str) -> bool {
        let key = self
            .grid_gateways
            .iter()
            .find(|(_, g)| g.contact == contact)
            .map(|(k, _)| *k);
        match key {
            Some(k) => self.grid_gateways.remove(&k).is_some(),
            None => false,
        }
    }

    pub fn add_replica_catalog(&mut self, catalog: ReplicaCatalog) {
        self.replica_catalogs.push(catalog);
    }

    pub fn replica_catalogs(&self) -> &[ReplicaCatalog] {
        &self.replica_catalogs
    }

    pub fn select_replica_catalog(&self) -> Option<&ReplicaCatalog> {
        self.replica_catalogs.first()
    }

    pub fn add_profile(&mut self, profile: Profile) {
        self.profiles.add(profile);
    }

    pub fn set_profiles(&mut self, profiles: Profiles) {
        self.profiles = profiles;
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    pub fn profiles_mut(&mut self) -> &mut Profiles {
        &mut self.profiles
    }

    /// Value of an `env` profile on this site.
    pub fn environment_variable(&self, variable: &str) -> Option<&str> {
        self.profiles.get(Namespace::Env, variable)
    }

    pub fn pegasus_home(&self) -> Option<String> {
        install_home(PEGASUS_HOME, |name| self.environment_variable(name))
    }

    pub fn vds_home(&self) -> Option<String> {
        install_home(VDS_HOME, |name| self.environment_variable(name))
    }

    /// True when the `pegasus` profile `auxillary.local` is set to a true value.
    pub fn is_visible_to_local_site(&self) -> bool {
        self.profiles
            .get(Namespace::Pegasus, LOCAL_VISIBLE_KEY)
            .is_some_and(|value| {
                ["true", "yes", "on"]
                    .iter()
                    .any(|t| value.trim().eq_ignore_ascii_case(t))
            })
    }

    /// Remove the file server with this full URL from every directory.
    pub fn remove_file_server(&mut self, url: &str) -> bool {
        let mut removed = false;
        for directory in self.directories.values_mut() {
            removed |= directory.remove_file_server(url);
        }
        removed
    }

    /// Mount point of the shared-scratch server picked for `operation`.
    pub fn external_work_directory(&self, operation: Operation) -> Option<&str> {
        self.select_shared_scratch_file_server(operation)
            .map(|server| server.mount_point.as_str())
    }

    /// URL of the shared-scratch server picked for `operation`: prefix plus mount point.
    pub fn external_work_directory_url(&self, operation: Operation) -> Option<String> {
        self.select_shared_scratch_file_server(operation)
            .map(FileServer::url)
    }

    /// Mount point of the stage-out storage server for `put`, without a trailing `/`.
    pub fn external_storage_directory(&self) -> Option<&str> {
        let mount_point = self
            .select_storage_file_server_for_stageout(Operation::Put)?
            .mount_point
            .as_str();
        match mount_point.strip_suffix('/') {
            Some(trimmed) if !trimmed.is_empty() => Some(trimmed),
            _ => Some(mount_point),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GatewayType, SchedulerType};
    use crate::replica::Connection;

    fn compute_gateway() -> GridGateway {
        GridGateway::new(
            GatewayType::Gt5,
            "smarty.isi.edu/jobmanager-pbs",
            SchedulerType::Pbs,
        )
    }

    #[test]
    fn test_gateway_fallback_to_compute() {
        let mut site = Site::new("isi");
        site.add_grid_gateway(compute_gateway());

        for job_type in [
            JobType::Auxiliary,
            JobType::Transfer,
            JobType::Cleanup,
            JobType::Register,
        ] {
            let selected = site.select_grid_gateway(job_type).unwrap();
            assert_eq!(selected, &compute_gateway());
        }
        assert!(site.grid_gateway(JobType::Transfer).is_none());
    }

    #[test]
    fn test_gateway_fallback_prefers_auxiliary() {
        let mut site = Site::new("isi");
        site.add_grid_gateway(compute_gateway());
        site.add_grid_gateway(
            GridGateway::new(GatewayType::Gt5, "smarty.isi.edu/jobmanager-fork", SchedulerType::Fork)
                .with_job_type(JobType::Auxiliary),
        );

        let selected = site.select_grid_gateway(JobType::Cleanup).unwrap();
        assert_eq!(selected.job_type, JobType::Auxiliary);
    }

    #[test]
    fn test_gateway_none() {
        let site = Site::new("empty");
        assert!(site.select_grid_gateway(JobType::Transfer).is_none());
    }

    #[test]
    fn test_duplicate_directory_type() {
        let mut site = Site::new("isi");
        site.add_directory(Directory::with_path(DirectoryType::SharedScratch, "/a"))
            .unwrap();

        let result = site.add_directory(Directory::with_path(DirectoryType::SharedScratch, "/b"));
        assert!(matches!(
            result,
            Err(Error::DuplicateDirectoryType {
                directory_type: DirectoryType::SharedScratch,
                ..
            })
        ));
        assert_eq!(site.work_directory_mount_point(), Some("/a"));

        let previous = site.set_directory(Directory::with_path(DirectoryType::SharedScratch, "/b"));
        assert!(previous.is_some());
        assert_eq!(site.work_directory_mount_point(), Some("/b"));
    }

    #[test]
    fn test_remove_grid_gateway() {
        let mut site = Site::new("isi");
        site.add_grid_gateway(compute_gateway());
        assert!(!site.remove_grid_gateway("elsewhere/jobmanager"));
        assert!(site.remove_grid_gateway("smarty.isi.edu/jobmanager-pbs"));
        assert_eq!(site.grid_gateways().count(), 0);
    }

    #[test]
    fn test_head_node_storage_fallback() {
        let mut site = Site::new("isi");
        site.add_directory(Directory::with_path(DirectoryType::SharedStorage, "/shared"))
            .unwrap();
        assert_eq!(
            site.head_node_storage_directory().unwrap().mount_point(),
            Some("/shared")
        );
        site.add_directory(Directory::with_path(DirectoryType::LocalStorage, "/local"))
            .unwrap();
        assert_eq!(
            site.head_node_storage_directory().unwrap().mount_point(),
            Some("/local")
        );
    }

    #[test]
    fn test_clone_is_deep() {
        let mut site = Site::new("isi");
        let mut dir = Directory::with_path(DirectoryType::SharedScratch, "/lustre");
        dir.add_file_server(
            FileServer::from_url("gsiftp://smarty.isi.edu/lustre", Operation::All).unwrap(),
        );
        site.add_directory(dir).unwrap();
        site.add_grid_gateway(compute_gateway());
        let mut rc = ReplicaCatalog::new("rls://replica.isi.edu", "RLS");
        rc.add_connection(Connection::new("timeout", "30"));
        site.add_replica_catalog(rc);
        site.add_profile(Profile::new(Namespace::Env, "PATH", "/bin"));

        let mut copy = site.clone();
        copy.set_handle("copy");
        copy.directory_mut(DirectoryType::SharedScratch)
            .unwrap()
            .add_file_server(FileServer::new("file", "file://", "/lustre").with_operation(Operation::Get));
        copy.profiles_mut().insert(Namespace::Env, "PATH", "/usr/bin");
        copy.remove_grid_gateway("smarty.isi.edu/jobmanager-pbs");
        copy.sysinfo.arch = Architecture::Ppc;

        assert_eq!(site.handle(), "isi");
        assert_eq!(
            site.directory(DirectoryType::SharedScratch)
                .unwrap()
                .file_server_count(),
            1
        );
        assert_eq!(site.environment_variable("PATH"), Some("/bin"));
        assert!(site.grid_gateway(JobType::Compute).is_some());
        assert_eq!(site.arch(), Architecture::X86_64);
        assert_ne!(site, copy);
    }

    #[test]
    fn test_select_storage_for_stageout() {
        let mut site = Site::new("isi");
        assert!(site.select_storage_file_server_for_stageout(Operation::Put).is_none());

        let mut dir = Directory::with_path(DirectoryType::SharedStorage, "/data");
        dir.add_file_server(FileServer::from_url("gsiftp://isi.edu/data", Operation::All).unwrap());
        site.add_directory(dir).unwrap();

        let fs = site.select_storage_file_server_for_stageout(Operation::Put).unwrap();
        assert_eq!(fs.url(), "gsiftp://isi.edu/data");
    }
}
