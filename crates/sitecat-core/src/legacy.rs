//! The legacy "pool config" site model.
//!
//! This is the shape produced by the brace-delimited text format and by MDS
//! queries. Convert it to a [`Site`](crate::Site) with
//! [`adapter::pool_site_to_site`](crate::adapter::pool_site_to_site).

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::warn;

use crate::profile::Profile;

/// Universe of job managers that run compute jobs.
pub const VANILLA_UNIVERSE: &str = "vanilla";
/// Universe of job managers that run transfer and other auxiliary jobs.
pub const TRANSFER_UNIVERSE: &str = "transfer";

/// A job manager contact for one universe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobManager {
    pub universe: String,
    pub url: String,
    pub globus_version: String,
    pub jobmanager_type: Option<String>,
    pub idle_nodes: Option<String>,
    pub total_nodes: Option<String>,
    pub free_mem: Option<String>,
    pub total_mem: Option<String>,
    pub jobs_in_queue: Option<String>,
    pub running_jobs: Option<String>,
    pub max_count: Option<String>,
    pub max_cpu_time: Option<String>,
    pub os_type: Option<String>,
    pub arch_type: Option<String>,
}

impl JobManager {
    pub fn new(
        universe: impl Into<String>,
        url: impl Into<String>,
        globus_version: impl Into<String>,
    ) -> Self {
        Self {
            universe: universe.into(),
            url: url.into(),
            globus_version: globus_version.into(),
            ..Self::default()
        }
    }
}

/// Measured transfer rates from a GridFTP server to one destination subnet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridFtpBandwidth {
    pub dest_subnet: String,
    pub avg_bandwidth: Option<String>,
    pub max_bandwidth: Option<String>,
    pub min_bandwidth: Option<String>,
    /// Averages over the four measurement windows, shortest first.
    pub avg_bandwidth_ranges: [Option<String>; 4],
}

/// A GridFTP server, already split into `scheme://host` and storage directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridFtpServer {
    pub url: String,
    pub storage_dir: String,
    pub globus_version: String,
    pub total_size: Option<String>,
    pub free_size: Option<String>,
    pub bandwidths: Vec<GridFtpBandwidth>,
}

impl GridFtpServer {
    /// Split a full URL on `/`: the first two segments form the prefix, the rest the storage dir.
    ///
    /// Empty segments are skipped, so `gsiftp://host/a/b` yields `gsiftp://host` and `/a/b`.
    pub fn from_url(full_url: &str, globus_version: impl Into<String>) -> Option<Self> {
        let mut segments = full_url.split('/').filter(|s| !s.is_empty());
        let scheme = segments.next()?;
        let host = segments.next()?;
        let storage_dir: String = segments.map(|s| format!("/{}", s)).collect();

        Some(Self {
            url: format!("{}//{}", scheme, host),
            storage_dir,
            globus_version: globus_version.into(),
            ..Self::default()
        })
    }

    pub fn full_url(&self) -> String {
        format!("{}{}", self.url, self.storage_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkDir {
    pub path: String,
    pub total_size: Option<String>,
    pub free_size: Option<String>,
}

impl WorkDir {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// A local replica catalog contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lrc {
    pub url: String,
}

impl Lrc {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// One `pool` block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolSite {
    pub handle: String,
    /// Opaque VDS sysinfo string, e.g. `INTEL32::LINUX`.
    pub sysinfo: Option<String>,
    /// Path to the kickstart launcher.
    pub grid_launch: Option<String>,
    pub work_dir: Option<WorkDir>,
    pub gridftp_servers: Vec<GridFtpServer>,
    pub job_managers: Vec<JobManager>,
    pub lrcs: Vec<Lrc>,
    pub profiles: Vec<Profile>,
}

impl PoolSite {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            ..Self::default()
        }
    }

    pub fn job_managers_for(&self, universe: &str) -> impl Iterator<Item = &JobManager> {
        self.job_managers
            .iter()
            .filter(move |jm| jm.universe == universe)
    }

    pub fn select_job_manager(&self, universe: &str) -> Option<&JobManager> {
        self.job_managers_for(universe).next()
    }

    pub fn select_gridftp(&self) -> Option<&GridFtpServer> {
        self.gridftp_servers.first()
    }

    pub fn select_lrc(&self) -> Option<&Lrc> {
        self.lrcs.first()
    }

    pub fn exec_mount_point(&self) -> Option<&str> {
        self.work_dir.as_ref().map(|w| w.path.as_str())
    }

    pub fn remove_job_manager(&mut self, universe: &str, url: &str) -> bool {
        let before = self.job_managers.len();
        self.job_managers
            .retain(|jm| !(jm.universe == universe && jm.url == url));
        self.job_managers.len() != before
    }

    pub fn remove_gridftp(&mut self, url_prefix: &str) -> bool {
        let before = self.gridftp_servers.len();
        self.gridftp_servers.retain(|s| s.url != url_prefix);
        self.gridftp_servers.len() != before
    }
}

/// A parsed pool config: handle → pool site.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PoolConfig {
    sites: BTreeMap<String, PoolSite>,
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `site` under `handle`. An existing handle is not replaced: the new
    /// site is stored under `<handle>-<epoch millis>` instead, and that key is returned.
    pub fn add(&mut self, handle: &str, mut site: PoolSite) -> String {
        let key = if self.sites.contains_key(handle) {
            let mut stamp = Utc::now().timestamp_millis();
            while self.sites.contains_key(&format!("{}-{}", handle, stamp)) {
                stamp += 1;
            }
            let alternate = format!("{}-{}", handle, stamp);
            warn!(
                handle = %handle,
                alternate = %alternate,
                "duplicate pool handle; storing under a synthetic key"
            );
            alternate
        } else {
            handle.to_string()
        };
        site.handle = key.clone();
        self.sites.insert(key.clone(), site);
        key
    }

    pub fn get(&self, handle: &str) -> Option<&PoolSite> {
        self.sites.get(handle)
    }

    pub fn get_mut(&mut self, handle: &str) -> Option<&mut PoolSite> {
        self.sites.get_mut(handle)
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.sites.contains_key(handle)
    }

    pub fn sites(&self) -> impl Iterator<Item = &PoolSite> {
        self.sites.values()
    }

    pub fn sites_mut(&mut self) -> impl Iterator<Item = &mut PoolSite> {
        self.sites.values_mut()
    }

    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gridftp_split() {
        let server = GridFtpServer::from_url("gsiftp://pollux.isi.edu/data/storage", "2.4.3").unwrap();
        assert_eq!(server.url, "gsiftp://pollux.isi.edu");
        assert_eq!(server.storage_dir, "/data/storage");
        assert_eq!(server.full_url(), "gsiftp://pollux.isi.edu/data/storage");
    }

    #[test]
    fn test_gridftp_split_without_path() {
        let server = GridFtpServer::from_url("gsiftp://pollux.isi.edu", "2.4.3").unwrap();
        assert_eq!(server.url, "gsiftp://pollux.isi.edu");
        assert_eq!(server.storage_dir, "");
        assert!(GridFtpServer::from_url("pollux", "2.4.3").is_none());
    }

    #[test]
    fn test_duplicate_handle_gets_synthetic_key() {
        let mut config = PoolConfig::new();
        assert_eq!(config.add("isi", PoolSite::new("isi")), "isi");
        let second = config.add("isi", PoolSite::new("isi"));
        let third = config.add("isi", PoolSite::new("isi"));

        assert!(second.starts_with("isi-"));
        assert_ne!(second, third);
        assert_eq!(config.len(), 3);
        assert_eq!(config.get(&second).unwrap().handle, second);
    }

    #[test]
    fn test_job_manager_selection() {
        let mut site = PoolSite::new("isi");
        site.job_managers.push(JobManager::new(TRANSFER_UNIVERSE, "isi.edu/jobmanager-fork", "2.4"));
        site.job_managers.push(JobManager::new(VANILLA_UNIVERSE, "isi.edu/jobmanager-pbs", "2.4"));

        assert_eq!(
            site.select_job_manager(VANILLA_UNIVERSE).unwrap().url,
            "isi.edu/jobmanager-pbs"
        );
        assert!(site.select_job_manager("globus").is_none());
        assert!(site.remove_job_manager(VANILLA_UNIVERSE, "isi.edu/jobmanager-pbs"));
        assert!(!site.remove_job_manager(VANILLA_UNIVERSE, "isi.edu/jobmanager-pbs"));
    }
}
