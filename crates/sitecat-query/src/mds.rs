//! Pool configuration published through an MDS (LDAP) information service.
//!
//! Pool entries live under DNs starting with `Gvds-Vo-name` or
//! `Gvds-Software-deployment` and carry `@`-separated attribute values.
//! Job-queue entries (`Mds-Job-Queue-name`, `Mds-Software-deployment=jobmanager`)
//! add resource figures to the job managers already read.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use sitecat_core::Namespace;
use sitecat_core::Profile;
use sitecat_core::legacy::{GridFtpServer, JobManager, Lrc, PoolConfig, PoolSite, WorkDir};

use crate::QueryResult;

pub const DEFAULT_MDS_PORT: u16 = 2135;
pub const DEFAULT_BASE_DN: &str = "Mds-Vo-name=local, o=Grid";
pub const DEFAULT_FILTER: &str = "(objectclass=*)";

/// One search result. `name` is relative to the search base.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LdapEntry {
    pub name: String,
    /// Attribute id and value; multi-valued attributes repeat the id.
    pub attributes: Vec<(String, String)>,
}

impl LdapEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((attribute.into(), value.into()));
        self
    }

    /// Full DN of the entry under `base_dn`.
    pub fn dn(&self, base_dn: &str) -> String {
        if self.name.trim().is_empty() {
            base_dn.to_string()
        } else {
            format!("{}, {}", self.name, base_dn)
        }
    }
}

/// Subtree search against an LDAP server.
#[async_trait]
pub trait LdapSearch: Send + Sync {
    async fn search(
        &self,
        provider_url: &str,
        base_dn: &str,
        filter: &str,
    ) -> QueryResult<Vec<LdapEntry>>;
}

/// Attributes read from MDS entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MdsAttribute {
    PoolId,
    Universe,
    WorkDir,
    Lrc,
    GridLaunch,
    Storage,
    Profile,
    FreeNodeCount,
    TotalNodeCount,
    QueueMaxCount,
    QueueMaxCpuTime,
    QueueMaxRunningJobs,
    QueueMaxJobsInQueue,
    RamTotalSize,
    RamFreeSize,
    SchedulerType,
    ComputerIsa,
    OsName,
}

impl MdsAttribute {
    fn from_id(id: &str) -> Option<Self> {
        let attribute = match id {
            "Gvds-Pool-Id" => Self::PoolId,
            "Gvds-Pool-Universe" => Self::Universe,
            "Gvds-Pool-WorkDir" => Self::WorkDir,
            "Gvds-Pool-Lrc" => Self::Lrc,
            "Gvds-Pool-GridLaunch" => Self::GridLaunch,
            "Gvds-Pool-Storage" => Self::Storage,
            "Gvds-Pool-Profile" => Self::Profile,
            "Mds-Computer-Total-Free-nodeCount" => Self::FreeNodeCount,
            "Mds-Computer-Total-nodeCount" => Self::TotalNodeCount,
            "Mds-Gram-Job-Queue-maxcount" => Self::QueueMaxCount,
            "Mds-Gram-Job-Queue-maxcputime" => Self::QueueMaxCpuTime,
            "Mds-Gram-Job-Queue-maxrunningjobs" => Self::QueueMaxRunningJobs,
            "Mds-Gram-Job-Queue-maxjobsinqueue" => Self::QueueMaxJobsInQueue,
            "Mds-Memory-Ram-Total-sizeMB" => Self::RamTotalSize,
            "Mds-Memory-Ram-sizeMB" => Self::RamFreeSize,
            "Mds-Service-Gram-schedulertype" => Self::SchedulerType,
            "Mds-Computer-isa" => Self::ComputerIsa,
            "Mds-Os-name" => Self::OsName,
            _ => return None,
        };
        Some(attribute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdsQuery {
    pub host: String,
    pub port: u16,
    pub base_dn: String,
    pub filter: String,
}

impl MdsQuery {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            base_dn: DEFAULT_BASE_DN.to_string(),
            filter: DEFAULT_FILTER.to_string(),
        }
    }

    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.base_dn = base_dn.into();
        self
    }

    pub fn provider_url(&self) -> String {
        format!("ldap://{}:{}", self.host, self.port)
    }

    /// Search the server and map the results into a pool config.
    ///
    /// A failed search is logged and yields an empty config.
    pub async fn query(&self, searcher: &dyn LdapSearch) -> PoolConfig {
        let url = self.provider_url();
        let mut config = PoolConfig::new();
        match searcher.search(&url, &self.base_dn, &self.filter).await {
            Ok(entries) => {
                store_entries(&entries, &self.base_dn, &mut config);
                info!(provider = %url, pools = config.len(), "read pool config from MDS");
            }
            Err(e) => warn!(provider = %url, error = %e, "MDS search failed"),
        }
        config
    }
}

/// Map search results into `config`, in the order the server returned them.
pub fn store_entries(entries: &[LdapEntry], base_dn: &str, config: &mut PoolConfig) {
    for entry in entries {
        let dn = entry.dn(base_dn);
        if dn.starts_with("Gvds-Vo-name") || dn.starts_with("Gvds-Software-deployment") {
            store_pool_entry(entry, &dn, config);
        } else if dn.starts_with("Mds-Job-Queue-name")
            || dn.starts_with("Mds-Software-deployment=jobmanager")
        {
            store_job_queue_entry(entry, &dn, config);
        } else {
            debug!(dn = %dn, "ignoring MDS entry");
        }
    }
}

fn tokens(value: &str) -> Vec<&str> {
    value.split('@').filter(|t| !t.is_empty()).collect()
}

fn store_pool_entry(entry: &LdapEntry, dn: &str, config: &mut PoolConfig) {
    let mut handle = None;
    let mut site = PoolSite::default();

    for (id, value) in &entry.attributes {
        let Some(attribute) = MdsAttribute::from_id(id) else {
            continue;
        };
        match attribute {
            MdsAttribute::PoolId => handle = Some(value.clone()),
            MdsAttribute::Universe => match tokens(value).as_slice() {
                [universe, url, version, ..] => site
                    .job_managers
                    .push(JobManager::new(*universe, *url, *version)),
                _ => warn!(dn = %dn, value = %value, "malformed universe attribute"),
            },
            MdsAttribute::WorkDir => match tokens(value).as_slice() {
                [path] => site.work_dir = Some(WorkDir::new(*path)),
                [path, total, free, ..] => {
                    site.work_dir = Some(WorkDir {
                        path: path.to_string(),
                        total_size: Some(total.to_string()),
                        free_size: Some(free.to_string()),
                    })
                }
                _ => warn!(dn = %dn, value = %value, "malformed workdir attribute"),
            },
            MdsAttribute::Lrc => site.lrcs.push(Lrc::new(value.as_str())),
            MdsAttribute::GridLaunch => site.grid_launch = Some(value.clone()),
            MdsAttribute::Storage => {
                let parts = tokens(value);
                let server = match parts.as_slice() {
                    [url, version] => GridFtpServer::from_url(url, *version),
                    [url, version, total, free, ..] => {
                        GridFtpServer::from_url(url, *version).map(|mut server| {
                            server.total_size = Some(total.to_string());
                            server.free_size = Some(free.to_string());
                            server
                        })
                    }
                    _ => None,
                };
                match server {
                    Some(server) => site.gridftp_servers.push(server),
                    None => warn!(dn = %dn, value = %value, "malformed storage attribute"),
                }
            }
            MdsAttribute::Profile => match tokens(value).as_slice() {
                [namespace, key, value, ..] => match namespace.parse::<Namespace>() {
                    Ok(namespace) => site.profiles.push(Profile::new(namespace, *key, *value)),
                    Err(e) => warn!(dn = %dn, error = %e, "skipping profile"),
                },
                _ => warn!(dn = %dn, value = %value, "malformed profile attribute"),
            },
            // resource figures only appear on job-queue entries
            _ => {}
        }
    }

    match handle {
        Some(handle) => {
            let key = config.add(&handle, site);
            debug!(dn = %dn, pool = %key, "stored MDS pool entry");
        }
        None => warn!(dn = %dn, "MDS pool entry without Gvds-Pool-Id"),
    }
}

/// `host/jobmanager` contact named by a job-queue DN.
fn job_queue_contact(dn: &str) -> Option<String> {
    let mut parts = dn.split(',').map(str::trim);
    if dn.starts_with("Mds-Job-Queue-name") {
        parts.next();
    }
    let manager = parts.next()?;
    let host = parts.next()?;
    let value = |rdn: &str| rdn.split_once('=').map(|(_, v)| v.trim().to_string());
    Some(format!("{}/{}", value(host)?, value(manager)?))
}

fn store_job_queue_entry(entry: &LdapEntry, dn: &str, config: &mut PoolConfig) {
    let Some(contact) = job_queue_contact(dn) else {
        warn!(dn = %dn, "cannot derive a job manager contact from DN");
        return;
    };

    let mut matched = 0;
    for site in config.sites_mut() {
        for manager in site
            .job_managers
            .iter_mut()
            .filter(|m| m.url.eq_ignore_ascii_case(&contact))
        {
            apply_resources(manager, &entry.attributes);
            matched += 1;
        }
    }
    debug!(contact = %contact, matched, "applied MDS job queue entry");
}

fn apply_resources(manager: &mut JobManager, attributes: &[(String, String)]) {
    for (id, value) in attributes {
        let field = match MdsAttribute::from_id(id) {
            Some(MdsAttribute::FreeNodeCount) => &mut manager.idle_nodes,
            Some(MdsAttribute::TotalNodeCount) => &mut manager.total_nodes,
            Some(MdsAttribute::QueueMaxCount) => &mut manager.max_count,
            Some(MdsAttribute::QueueMaxCpuTime) => &mut manager.max_cpu_time,
            Some(MdsAttribute::QueueMaxRunningJobs) => &mut manager.running_jobs,
            Some(MdsAttribute::QueueMaxJobsInQueue) => &mut manager.jobs_in_queue,
            Some(MdsAttribute::RamTotalSize) => &mut manager.total_mem,
            Some(MdsAttribute::RamFreeSize) => &mut manager.free_mem,
            Some(MdsAttribute::SchedulerType) => &mut manager.jobmanager_type,
            Some(MdsAttribute::ComputerIsa) => &mut manager.arch_type,
            Some(MdsAttribute::OsName) => &mut manager.os_type,
            _ => continue,
        };
        *field = Some(value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueryError;

    struct FakeSearch {
        entries: Vec<LdapEntry>,
    }

    #[async_trait]
    impl LdapSearch for FakeSearch {
        async fn search(
            &self,
            provider_url: &str,
            _base_dn: &str,
            _filter: &str,
        ) -> QueryResult<Vec<LdapEntry>> {
            assert_eq!(provider_url, "ldap://mds.example.org:2135");
            Ok(self.entries.clone())
        }
    }

    struct FailingSearch;

    #[async_trait]
    impl LdapSearch for FailingSearch {
        async fn search(&self, _: &str, _: &str, _: &str) -> QueryResult<Vec<LdapEntry>> {
            Err(QueryError::Ldap("connection refused".to_string()))
        }
    }

    fn pool_entry(id: &str) -> LdapEntry {
        LdapEntry::new(format!("Gvds-Vo-name={}", id))
            .with("Gvds-Pool-Id", id)
            .with("Gvds-Pool-Universe", "vanilla@isi.edu/jobmanager-condor@2.4.3")
            .with("Gvds-Pool-Universe", "transfer@isi.edu/jobmanager-fork@2.4.3")
            .with("Gvds-Pool-WorkDir", "/scratch@100G@40G")
            .with("Gvds-Pool-Lrc", "rls://rls.isi.edu")
            .with("Gvds-Pool-GridLaunch", "/opt/pegasus/bin/kickstart")
            .with("Gvds-Pool-Storage", "gsiftp://isi.edu/data/storage@2.4.3")
            .with("Gvds-Pool-Profile", "env@GLOBUS_LOCATION@/opt/globus")
            .with("objectclass", "Gvds-Pool")
    }

    #[tokio::test]
    async fn test_query_pool_entry() {
        let searcher = FakeSearch {
            entries: vec![pool_entry("isi")],
        };
        let config = MdsQuery::new("mds.example.org", DEFAULT_MDS_PORT)
            .query(&searcher)
            .await;

        let site = config.get("isi").unwrap();
        assert_eq!(site.job_managers.len(), 2);
        assert_eq!(site.job_managers[0].universe, "vanilla");
        assert_eq!(site.job_managers[0].url, "isi.edu/jobmanager-condor");

        let work_dir = site.work_dir.as_ref().unwrap();
        assert_eq!(work_dir.path, "/scratch");
        assert_eq!(work_dir.total_size.as_deref(), Some("100G"));
        assert_eq!(work_dir.free_size.as_deref(), Some("40G"));

        assert_eq!(site.gridftp_servers[0].url, "gsiftp://isi.edu");
        assert_eq!(site.gridftp_servers[0].storage_dir, "/data/storage");
        assert_eq!(site.lrcs[0].url, "rls://rls.isi.edu");
        assert_eq!(site.grid_launch.as_deref(), Some("/opt/pegasus/bin/kickstart"));
        assert_eq!(site.profiles[0].namespace, Namespace::Env);
        assert_eq!(site.profiles[0].value, "/opt/globus");
    }

    #[tokio::test]
    async fn test_failed_search_is_empty() {
        let config = MdsQuery::new("mds.example.org", DEFAULT_MDS_PORT)
            .query(&FailingSearch)
            .await;
        assert!(config.is_empty());
    }

    #[test]
    fn test_duplicate_pool_ids() {
        let mut config = PoolConfig::new();
        store_entries(
            &[pool_entry("isi"), pool_entry("isi")],
            DEFAULT_BASE_DN,
            &mut config,
        );
        assert_eq!(config.len(), 2);
        assert!(config.contains("isi"));
        assert!(config.handles().any(|h| h.starts_with("isi-")));
    }

    #[test]
    fn test_job_queue_enriches_job_manager() {
        let queue = LdapEntry::new(
            "Mds-Job-Queue-name=default, Mds-Software-deployment=jobmanager-condor, Mds-Host-hn=ISI.EDU",
        )
        .with("Mds-Computer-Total-Free-nodeCount", "12")
        .with("Mds-Computer-Total-nodeCount", "64")
        .with("Mds-Service-Gram-schedulertype", "condor")
        .with("Mds-Os-name", "Linux");

        let mut config = PoolConfig::new();
        store_entries(&[pool_entry("isi"), queue], DEFAULT_BASE_DN, &mut config);

        let site = config.get("isi").unwrap();
        let condor = &site.job_managers[0];
        assert_eq!(condor.idle_nodes.as_deref(), Some("12"));
        assert_eq!(condor.total_nodes.as_deref(), Some("64"));
        assert_eq!(condor.jobmanager_type.as_deref(), Some("condor"));
        assert_eq!(condor.os_type.as_deref(), Some("Linux"));
        assert!(site.job_managers[1].idle_nodes.is_none());
    }

    #[test]
    fn test_job_queue_contact() {
        assert_eq!(
            job_queue_contact("Mds-Software-deployment=jobmanager-fork, Mds-Host-hn=isi.edu, o=Grid"),
            Some("isi.edu/jobmanager-fork".to_string())
        );
        assert_eq!(job_queue_contact("Mds-Job-Queue-name=q"), None);
    }

    #[test]
    fn test_malformed_values_are_skipped() {
        let entry = LdapEntry::new("Gvds-Vo-name=bad")
            .with("Gvds-Pool-Id", "bad")
            .with("Gvds-Pool-Universe", "vanilla")
            .with("Gvds-Pool-Profile", "nosuch@key@value");
        let mut config = PoolConfig::new();
        store_entries(&[entry], DEFAULT_BASE_DN, &mut config);

        let site = config.get("bad").unwrap();
        assert!(site.job_managers.is_empty());
        assert!(site.profiles.is_empty());
    }

    #[test]
    fn test_entry_without_id_is_dropped() {
        let entry = LdapEntry::new("Gvds-Vo-name=anon").with("Gvds-Pool-Lrc", "rls://x");
        let mut config = PoolConfig::new();
        store_entries(&[entry], DEFAULT_BASE_DN, &mut config);
        assert!(config.is_empty());
    }
}
