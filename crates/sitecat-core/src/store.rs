//! In-memory collection of sites keyed by handle.

use std::collections::{BTreeMap, HashMap};

use crate::file_server::Operation;
use crate::site::{PEGASUS_HOME, Site, VDS_HOME, install_home};
use crate::sysinfo::SysInfo;

/// Handle of the submit-host site; the only site that may read the host environment.
pub const LOCAL_SITE: &str = "local";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SiteStore {
    sites: BTreeMap<String, Site>,
    host_environment: HashMap<String, String>,
}

impl SiteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment consulted for the `local` site when it has no matching `env` profile.
    pub fn with_host_environment(mut self, env: HashMap<String, String>) -> Self {
        self.host_environment = env;
        self
    }

    /// Add a site, replacing and returning any site with the same handle.
    pub fn add_entry(&mut self, site: Site) -> Option<Site> {
        self.sites.insert(site.handle().to_string(), site)
    }

    pub fn lookup(&self, handle: &str) -> Option<&Site> {
        self.sites.get(handle)
    }

    pub fn lookup_mut(&mut self, handle: &str) -> Option<&mut Site> {
        self.sites.get_mut(handle)
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.sites.contains_key(handle)
    }

    pub fn remove(&mut self, handle: &str) -> Option<Site> {
        self.sites.remove(handle)
    }

    /// Handles in sorted order.
    pub fn list(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Site> {
        self.sites.values()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// System information for each listed handle that exists in the store.
    pub fn sysinfos<S: AsRef<str>>(&self, handles: &[S]) -> HashMap<String, SysInfo> {
        handles
            .iter()
            .filter_map(|h| self.lookup(h.as_ref()))
            .map(|site| (site.handle().to_string(), site.sysinfo.clone()))
            .collect()
    }

    /// Keep only the listed handles; `*` keeps everything.
    pub fn retain_handles<S: AsRef<str>>(&mut self, handles: &[S]) {
        if handles.iter().any(|h| h.as_ref() == "*") {
            return;
        }
        self.sites
            .retain(|handle, _| handles.iter().any(|h| h.as_ref() == handle));
    }

    pub fn remove_grid_gateway(&mut self, handle: &str, contact: &str) -> bool {
        self.lookup_mut(handle)
            .is_some_and(|site| site.remove_grid_gateway(contact))
    }

    pub fn remove_file_server(&mut self, handle: &str, url: &str) -> bool {
        self.lookup_mut(handle)
            .is_some_and(|site| site.remove_file_server(url))
    }

    /// `PEGASUS_HOME` of the site, else the parent of its `PEGASUS_BIN_DIR`.
    pub fn pegasus_home(&self, handle: &str) -> Option<String> {
        self.lookup(handle)?;
        install_home(PEGASUS_HOME, |name| self.environment_variable(handle, name))
    }

    /// `VDS_HOME` of the site, else the parent of its `PEGASUS_BIN_DIR`.
    pub fn vds_home(&self, handle: &str) -> Option<String> {
        self.lookup(handle)?;
        install_home(VDS_HOME, |name| self.environment_variable(handle, name))
    }

    pub fn is_visible_to_local_site(&self, handle: &str) -> bool {
        self.lookup(handle).is_some_and(Site::is_visible_to_local_site)
    }

    pub fn external_work_directory(&self, handle: &str, operation: Operation) -> Option<&str> {
        self.lookup(handle)?.external_work_directory(operation)
    }

    pub fn external_work_directory_url(&self, handle: &str, operation: Operation) -> Option<String> {
        self.lookup(handle)?.external_work_directory_url(operation)
    }

    pub fn external_storage_directory(&self, handle: &str) -> Option<&str> {
        self.lookup(handle)?.external_storage_directory()
    }

    /// `env` profile of the site; the `local` site falls back to the host environment.
    pub fn environment_variable(&self, handle: &str, variable: &str) -> Option<&str> {
        let site = self.lookup(handle)?;
        site.environment_variable(variable).or_else(|| {
            if handle == LOCAL_SITE {
                self.host_environment.get(variable).map(String::as_str)
            } else {
                None
            }
        })
    }
}

impl FromIterator<Site> for SiteStore {
    fn from_iter<I: IntoIterator<Item = Site>>(iter: I) -> Self {
        let mut store = SiteStore::new();
        for site in iter {
            store.add_entry(site);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Namespace, Profile};
    use crate::sysinfo::Architecture;

    #[test]
    fn test_add_replaces_same_handle() {
        let mut store = SiteStore::new();
        assert!(store.add_entry(Site::new("isi")).is_none());
        let mut other = Site::new("isi");
        other.sysinfo.arch = Architecture::Ppc;
        assert!(store.add_entry(other).is_some());
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("isi").unwrap().arch(), Architecture::Ppc);
    }

    #[test]
    fn test_retain_handles() {
        let mut store: SiteStore = ["local", "isi", "ufl"].into_iter().map(Site::new).collect();
        store.retain_handles(&["*"]);
        assert_eq!(store.len(), 3);
        store.retain_handles(&["isi", "missing"]);
        assert_eq!(store.list().collect::<Vec<_>>(), vec!["isi"]);
    }

    #[test]
    fn test_environment_variable_local_fallback() {
        let mut local = Site::new(LOCAL_SITE);
        local.add_profile(Profile::new(Namespace::Env, "PEGASUS_HOME", "/opt/pegasus"));
        let store: SiteStore = [local, Site::new("isi")].into_iter().collect();
        let store = store.with_host_environment(HashMap::from([
            ("HOME".to_string(), "/home/user".to_string()),
            ("PEGASUS_HOME".to_string(), "/usr".to_string()),
        ]));

        assert_eq!(store.environment_variable("local", "PEGASUS_HOME"), Some("/opt/pegasus"));
        assert_eq!(store.environment_variable("local", "HOME"), Some("/home/user"));
        assert_eq!(store.environment_variable("isi", "HOME"), None);
        assert_eq!(store.environment_variable("missing", "HOME"), None);
    }

    #[test]
    fn test_sysinfos() {
        let store: SiteStore = ["local", "isi"].into_iter().map(Site::new).collect();
        let infos = store.sysinfos(&["isi", "nowhere"]);
        assert_eq!(infos.len(), 1);
        assert!(infos.contains_key("isi"));
    }

    #[test]
    fn test_pegasus_home_falls_back_to_bin_dir() {
        let mut isi = Site::new("isi");
        isi.add_profile(Profile::new(Namespace::Env, "PEGASUS_HOME", "/opt/pegasus"));
        isi.add_profile(Profile::new(Namespace::Env, "PEGASUS_BIN_DIR", "/usr/local/bin"));
        let mut ufl = Site::new("ufl");
        ufl.add_profile(Profile::new(Namespace::Env, "PEGASUS_HOME", ""));
        ufl.add_profile(Profile::new(Namespace::Env, "PEGASUS_BIN_DIR", "/usr/pegasus/bin"));
        let store: SiteStore = [isi, ufl, Site::new(LOCAL_SITE)].into_iter().collect();
        let store = store.with_host_environment(HashMap::from([(
            "PEGASUS_BIN_DIR".to_string(),
            "/home/user/pegasus/bin/".to_string(),
        )]));

        assert_eq!(store.pegasus_home("isi").as_deref(), Some("/opt/pegasus"));
        assert_eq!(store.vds_home("isi").as_deref(), Some("/usr/local"));
        assert_eq!(store.pegasus_home("ufl").as_deref(), Some("/usr/pegasus"));
        assert_eq!(store.pegasus_home("local").as_deref(), Some("/home/user/pegasus"));
        assert_eq!(store.pegasus_home("missing"), None);
    }

    #[test]
    fn test_external_directories() {
        use crate::directory::{Directory, DirectoryType};
        use crate::file_server::FileServer;

        let mut site = Site::new("isi");
        let mut scratch = Directory::with_path(DirectoryType::SharedScratch, "/lustre/scratch");
        scratch.add_file_server(
            FileServer::from_url("gsiftp://smarty.isi.edu/lustre/scratch", Operation::Get).unwrap(),
        );
        site.add_directory(scratch).unwrap();
        let mut storage = Directory::with_path(DirectoryType::SharedStorage, "/data/");
        storage.add_file_server(FileServer::from_url("gsiftp://isi.edu/data/", Operation::All).unwrap());
        site.add_directory(storage).unwrap();
        let mut store: SiteStore = [site].into_iter().collect();

        assert_eq!(store.external_work_directory("isi", Operation::Get), Some("/lustre/scratch"));
        assert_eq!(
            store.external_work_directory_url("isi", Operation::Get).as_deref(),
            Some("gsiftp://smarty.isi.edu/lustre/scratch")
        );
        assert_eq!(store.external_work_directory("isi", Operation::Put), None);
        assert_eq!(store.external_storage_directory("isi"), Some("/data"));

        assert!(store.remove_file_server("isi", "gsiftp://smarty.isi.edu/lustre/scratch"));
        assert!(!store.remove_file_server("isi", "gsiftp://smarty.isi.edu/lustre/scratch"));
        assert!(!store.remove_file_server("missing", "gsiftp://isi.edu/data/"));
        assert_eq!(store.external_work_directory_url("isi", Operation::Get), None);
    }

    #[test]
    fn test_visible_to_local_site() {
        let mut visible = Site::new("isi");
        visible.add_profile(Profile::new(Namespace::Pegasus, "auxillary.local", "True"));
        let mut hidden = Site::new("ufl");
        hidden.add_profile(Profile::new(Namespace::Pegasus, "auxillary.local", "false"));
        let store: SiteStore = [visible, hidden, Site::new("ucsd")].into_iter().collect();

        assert!(store.is_visible_to_local_site("isi"));
        assert!(!store.is_visible_to_local_site("ufl"));
        assert!(!store.is_visible_to_local_site("ucsd"));
        assert!(!store.is_visible_to_local_site("missing"));
    }
}
