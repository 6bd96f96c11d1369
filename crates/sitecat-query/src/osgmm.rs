//! Sites advertised to an OSG matchmaker (OSGMM) Condor collector.
//!
//! `condor_status` is asked for one `;`-separated row per compute element.
//! Rows become pool sites and are converted into site entries. A second query
//! yields the SRM service URL and mount point of each storage element as
//! `pegasus.transfer.srm.<site>.*` properties.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::process::Command;
use tracing::{debug, info, warn};

use sitecat_config::OsgmmSettings;
use sitecat_core::adapter::pool_config_to_store;
use sitecat_core::legacy::{
    GridFtpServer, JobManager, PoolConfig, PoolSite, TRANSFER_UNIVERSE, VANILLA_UNIVERSE, WorkDir,
};
use sitecat_core::store::LOCAL_SITE;
use sitecat_core::{Namespace, Profile, Site, SiteStore};

use crate::vors::{VoSite, local_site_info, to_site};
use crate::{QueryError, QueryResult};

pub const CONDOR_STATUS: &str = "condor_status";
pub const DEFAULT_CONDOR_COLLECTOR: &str = "engage-central.renci.org";
pub const DEFAULT_LIGO_CONDOR_COLLECTOR: &str = "ligo-osgmm.renci.org";
pub const ENGAGE_VO: &str = "engage";
pub const LIGO_VO: &str = "ligo";
pub const SRM_PROPERTY_PREFIX: &str = "pegasus.transfer.srm";

/// Globus version recorded for job managers found through the collector.
const OSG_GLOBUS_VERSION: &str = "2.4.3";

/// Attributes printed per compute element, in row order.
const SITE_ATTRIBUTES: [&str; 10] = [
    "GlueSiteName",
    "GlueClusterUniqueID",
    "OSGMM_Globus_Location_Fork",
    "GlueCEInfoContactString",
    "GlueClusterTmpDir",
    "GlueCEInfoHostName",
    "GlueCEInfoApplicationDir",
    "GlueCEInfoDataDir",
    "GlueClusterTmpDir",
    "GlueClusterWNTmpDir",
];

const SRM_CONSTRAINT: &str = "regexp(\"file://\",GlueSEAccessProtocolEndpoint) \
    && GlueSAPath=!=UNDEFINED && GlueSEControlProtocolEndpoint=!=UNDEFINED";

/// Exit status and captured streams of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs an external program to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> QueryResult<CommandOutput>;
}

/// Runs commands as child processes.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> QueryResult<CommandOutput> {
        debug!(program = %program, args = ?args, "running command");
        let output = Command::new(program).args(args).output().await?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Collector serving a VO when none is configured.
pub fn collector_for_vo(vo: &str) -> &'static str {
    if vo == LIGO_VO {
        DEFAULT_LIGO_CONDOR_COLLECTOR
    } else {
        DEFAULT_CONDOR_COLLECTOR
    }
}

/// One compute element row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OsgSite {
    pub name: String,
    pub cluster: Option<String>,
    pub globus_location: Option<String>,
    /// Contact of the compute job manager, e.g. `gw.edu:2119/jobmanager-condor`.
    pub contact: Option<String>,
    pub tmp_dir: Option<String>,
    pub host_name: Option<String>,
    pub app_dir: Option<String>,
    pub data_dir: Option<String>,
    pub wntmp_dir: Option<String>,
}

impl OsgSite {
    /// Gatekeeper host: the CE host name, else the cluster id, else the contact's host.
    pub fn gatekeeper_host(&self) -> Option<&str> {
        self.host_name
            .as_deref()
            .or(self.cluster.as_deref())
            .or_else(|| {
                let contact = self.contact.as_deref()?;
                contact.split(['/', ':']).next().filter(|h| !h.is_empty())
            })
    }
}

/// Parse one row of the compute element query.
///
/// Returns `None` for rows without a site name or with fewer than ten fields.
pub fn parse_site_row(line: &str) -> Option<OsgSite> {
    let fields: Vec<&str> = line.trim().split(';').map(str::trim).collect();
    if fields.len() < SITE_ATTRIBUTES.len() {
        debug!(line = %line, "skipping short condor_status row");
        return None;
    }
    let field = |i: usize| Some(fields[i].to_string()).filter(|v| !v.is_empty());
    let name = field(0)?;
    Some(OsgSite {
        name,
        cluster: field(1),
        globus_location: field(2),
        contact: field(3),
        tmp_dir: field(4),
        host_name: field(5),
        app_dir: field(6),
        data_dir: field(7),
        wntmp_dir: field(9),
    })
}

/// Pool site for a compute element: fork and vanilla job managers, a GridFTP
/// server on the data directory, the tmp directory as work directory and
/// `env` profiles for the advertised locations.
///
/// Returns `None` when the row lacks a globus location or a compute contact.
pub fn to_pool_site(site: &OsgSite) -> Option<PoolSite> {
    let (Some(globus), Some(contact)) = (&site.globus_location, &site.contact) else {
        info!(site = %site.name, "skipping site without globus location or job manager");
        return None;
    };
    let host = site.gatekeeper_host().unwrap_or_default();

    let mut pool = PoolSite::new(site.name.as_str());
    pool.job_managers.push(JobManager::new(
        TRANSFER_UNIVERSE,
        format!("{}/jobmanager-fork", host),
        OSG_GLOBUS_VERSION,
    ));
    pool.job_managers
        .push(JobManager::new(VANILLA_UNIVERSE, contact.as_str(), OSG_GLOBUS_VERSION));
    pool.gridftp_servers.push(GridFtpServer {
        url: format!("gsiftp://{}", host),
        storage_dir: site.data_dir.clone().unwrap_or_default(),
        globus_version: OSG_GLOBUS_VERSION.to_string(),
        ..GridFtpServer::default()
    });
    pool.work_dir = site.tmp_dir.as_deref().map(WorkDir::new);

    let env = |key: &str, value: &str| Profile::new(Namespace::Env, key, value);
    let locations = [
        ("app", &site.app_dir),
        ("data", &site.data_dir),
        ("tmp", &site.tmp_dir),
        ("wntmp", &site.wntmp_dir),
    ];
    for (key, value) in locations {
        if let Some(value) = value {
            pool.profiles.push(env(key, value));
        }
    }
    pool.profiles.push(env("GLOBUS_LOCATION", globus));
    pool.profiles
        .push(env("LD_LIBRARY_PATH", &format!("{}/lib", globus)));
    Some(pool)
}

/// Split on `separator`, dropping trailing empty fields.
fn split_trimmed(text: &str, separator: char) -> Vec<&str> {
    let mut fields: Vec<&str> = text.split(separator).collect();
    while fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    fields
}

/// SRM endpoint of one storage element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrmMapping {
    pub site: String,
    pub service_url: String,
    pub mount_point: String,
}

impl SrmMapping {
    pub fn service_url_key(&self) -> String {
        format!("{}.{}.service.url", SRM_PROPERTY_PREFIX, self.site)
    }

    pub fn mount_point_key(&self) -> String {
        format!("{}.{}.service.mountpoint", SRM_PROPERTY_PREFIX, self.site)
    }
}

/// Parse one row of the storage element query:
/// `site;srm-url-prefix;sa-path;vo-path[;bind-mount]`.
///
/// The VO path is the mount point. A bind mount `from,to` rewrites it. Rows
/// with fewer than four fields or several comma-separated SRM prefixes are skipped.
pub fn parse_srm_row(line: &str) -> Option<SrmMapping> {
    let fields = split_trimmed(line.trim(), ';');
    let site = fields.first().filter(|s| !s.is_empty())?;
    let [_, service_url, _sa_path, vo_path, rest @ ..] = fields.as_slice() else {
        warn!(line = %line, "ignoring short SRM row");
        return None;
    };

    let mut mount_point = vo_path.to_string();
    if let [bind_mount] = rest {
        if let [from, to] = split_trimmed(bind_mount, ',').as_slice() {
            debug!(site = %site, from = %from, to = %to, "applying bind mount to SRM path");
            mount_point = mount_point.replace(from, to);
        }
    }

    if split_trimmed(service_url, ',').len() > 1 {
        warn!(line = %line, "ignoring SRM row with several service urls");
        return None;
    }

    Some(SrmMapping {
        site: site.to_string(),
        service_url: service_url.to_string(),
        mount_point,
    })
}

/// A configured OSGMM collector query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsgmmQuery {
    pub collector: String,
    pub vo: String,
    pub grid: String,
    pub validated_only: bool,
}

impl OsgmmQuery {
    pub fn new(settings: &OsgmmSettings) -> Self {
        let vo = settings.vo.to_lowercase();
        let collector = settings
            .collector
            .clone()
            .unwrap_or_else(|| collector_for_vo(&vo).to_string());
        Self {
            collector,
            vo,
            grid: settings.grid.clone(),
            validated_only: settings.validated_only,
        }
    }

    /// VO named in the constraint; the default collector only knows `engage`.
    pub fn query_vo(&self) -> &str {
        if self.collector == DEFAULT_CONDOR_COLLECTOR {
            ENGAGE_VO
        } else {
            &self.vo
        }
    }

    pub fn site_constraint(&self) -> String {
        let mut constraint = format!(
            "StringlistIMember(\"VO:{}\";GlueCEAccessControlBaseRule)",
            self.query_vo()
        );
        if self.validated_only {
            constraint.push_str(" && SiteVerified==True");
        }
        constraint
    }

    /// `condor_status` arguments printing one row per compute element.
    pub fn site_arguments(&self) -> Vec<String> {
        let mut args = vec![
            "-any".to_string(),
            "-pool".to_string(),
            self.collector.clone(),
            "-constraint".to_string(),
            self.site_constraint(),
        ];
        for (i, attribute) in SITE_ATTRIBUTES.into_iter().enumerate() {
            let separator = if i + 1 == SITE_ATTRIBUTES.len() { ";\\n" } else { ";" };
            // the constant separator is printed even when the attribute is undefined
            args.extend(["-format", "%s", attribute, "-format", separator, "1"].map(String::from));
        }
        args
    }

    /// `condor_status` arguments printing one row per storage element.
    pub fn srm_arguments(&self) -> Vec<String> {
        [
            "-pool",
            self.collector.as_str(),
            "-constraint",
            SRM_CONSTRAINT,
            "-format",
            "%s",
            "GlueSiteName",
            "-format",
            ";",
            "1",
            "-format",
            "srm://%s?SFN=",
            "substr(GlueSEControlProtocolEndpoint, 8)",
            "-format",
            "%s",
            "ifThenElse(GlueVOInfoPath =!= UNDEFINED, GlueVOInfoPath, GlueSAPath)",
            "-format",
            ";",
            "1",
            "-format",
            "%s",
            "GlueSAPath",
            "-format",
            ";",
            "1",
            "-format",
            "%s",
            "GlueVOInfoPath",
            "-format",
            ";",
            "1",
            "-format",
            "%s",
            "GlueCESEBindMountInfo",
            "-format",
            ";\\n",
            "1",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    /// Compute element rows. A non-zero exit is logged and whatever was printed is used.
    pub async fn sites(&self, runner: &dyn CommandRunner) -> QueryResult<Vec<OsgSite>> {
        let output = runner.run(CONDOR_STATUS, &self.site_arguments()).await?;
        if !output.success() {
            warn!(
                collector = %self.collector,
                status = ?output.status,
                stderr = %output.stderr.trim(),
                "condor_status exited with an error"
            );
        }
        Ok(output.stdout.lines().filter_map(parse_site_row).collect())
    }

    /// Site entries for the listed handles (`*` for all), plus the local site.
    ///
    /// The first usable row of each site wins.
    pub async fn catalog(
        &self,
        runner: &dyn CommandRunner,
        handles: &[String],
        local: Site,
    ) -> QueryResult<SiteStore> {
        let all = handles.iter().any(|h| h == "*");
        let mut config = PoolConfig::new();
        for site in self.sites(runner).await? {
            if !all && !handles.contains(&site.name) {
                continue;
            }
            if config.contains(&site.name) {
                debug!(site = %site.name, "keeping first compute element");
                continue;
            }
            if let Some(pool) = to_pool_site(&site) {
                info!(site = %site.name, "adding site");
                config.add(&site.name, pool);
            }
        }

        let mut store = pool_config_to_store(&config);
        store.add_entry(local);
        info!(
            collector = %self.collector,
            vo = %self.vo,
            sites = store.len(),
            "loaded sites from OSGMM"
        );
        Ok(store)
    }

    /// Local site entry for the submit host, tagged with this query's grid.
    pub fn local_site(&self, env: &HashMap<String, String>, hostname: &str) -> Option<Site> {
        let listing = VoSite {
            name: LOCAL_SITE.to_string(),
            grid: self.grid.clone(),
            ..VoSite::default()
        };
        to_site(&local_site_info(&self.vo, env, hostname), Some(&listing))
    }

    /// SRM properties for every storage element the collector knows.
    ///
    /// Fails when `condor_status` exits with an error.
    pub async fn srm_properties(
        &self,
        runner: &dyn CommandRunner,
    ) -> QueryResult<BTreeMap<String, String>> {
        let output = runner.run(CONDOR_STATUS, &self.srm_arguments()).await?;
        if !output.success() {
            return Err(QueryError::Command {
                program: CONDOR_STATUS.to_string(),
                status: output.status.unwrap_or(-1),
                stderr: output.stderr.trim().to_string(),
            });
        }

        let mut properties = BTreeMap::new();
        for mapping in output.stdout.lines().filter_map(parse_srm_row) {
            debug!(site = %mapping.site, url = %mapping.service_url, "created SRM properties");
            properties.insert(mapping.service_url_key(), mapping.service_url.clone());
            properties.insert(mapping.mount_point_key(), mapping.mount_point);
        }
        Ok(properties)
    }
}
