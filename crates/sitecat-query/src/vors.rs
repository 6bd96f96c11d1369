//! Sites published by a VORS (VO resource selector) server.
//!
//! The server answers two queries on `/cgi-bin/tindex.cgi`: a CSV listing of
//! the sites available to a VO, and a `key=value` description of one site.

use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use sitecat_config::VorsSettings;
use sitecat_core::adapter::apply_layout;
use sitecat_core::layout::{Area, FileSystemLayout, LayoutDirectory, LayoutSlot, Node, Visibility};
use sitecat_core::store::LOCAL_SITE;
use sitecat_core::{
    FileServer, GatewayType, GridGateway, InternalMountPoint, JobType, Namespace, Profile,
    ReplicaCatalog, SchedulerType, Site, SiteStore,
};

use crate::QueryResult;

pub const DEFAULT_GSIFTP_PORT: &str = "2811";
pub const DEFAULT_REPLICA_CATALOG: &str = "rls://replica.isi.edu";

/// One row of the site listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoSite {
    pub id: String,
    pub name: String,
    /// `host:port` of the gatekeeper.
    pub gatekeeper: String,
    pub site_type: String,
    pub grid: String,
    pub status: String,
    pub last_test_date: String,
}

impl VoSite {
    pub fn gatekeeper_host(&self) -> &str {
        self.gatekeeper.split(':').next().unwrap_or_default()
    }
}

/// Description of a single site.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VorsSiteInfo {
    pub shortname: Option<String>,
    pub gatekeeper: Option<String>,
    pub gk_port: Option<String>,
    pub gsiftp_port: Option<String>,
    pub app_loc: Option<String>,
    pub data_loc: Option<String>,
    pub osg_grid: Option<String>,
    pub tmp_loc: Option<String>,
    pub wntmp_loc: Option<String>,
    pub vdt_version: Option<String>,
    pub sponsor_vo: Option<String>,
    pub app_space: Option<String>,
    pub data_space: Option<String>,
    pub tmp_space: Option<String>,
    pub exec_jm: Option<String>,
    pub util_jm: Option<String>,
    pub globus_loc: Option<String>,
    pub grid_services: Option<String>,
}

fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Parse the CSV listing `ID,Name,Gatekeeper,Type,Grid,Status,Last Test Date`.
///
/// Comment lines and rows with fewer than seven columns are skipped.
pub fn parse_vo_sites(text: &str) -> Vec<VoSite> {
    content_lines(text)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split(',').map(str::trim).collect();
            match columns.as_slice() {
                [id, name, gatekeeper, site_type, grid, status, last_test_date, ..] => {
                    Some(VoSite {
                        id: id.to_string(),
                        name: name.to_string(),
                        gatekeeper: gatekeeper.to_string(),
                        site_type: site_type.to_string(),
                        grid: grid.to_string(),
                        status: status.to_string(),
                        last_test_date: last_test_date.to_string(),
                    })
                }
                _ => {
                    debug!(line = %line, "skipping short VORS row");
                    None
                }
            }
        })
        .collect()
}

/// Parse a `key=value` site description. Unknown keys are ignored.
pub fn parse_site_info(text: &str) -> VorsSiteInfo {
    let values: HashMap<&str, &str> = content_lines(text)
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(_, value)| !value.is_empty())
        .collect();
    let get = |key: &str| values.get(key).map(|v| v.to_string());

    VorsSiteInfo {
        shortname: get("shortname"),
        gatekeeper: get("gatekeeper"),
        gk_port: get("gk_port"),
        gsiftp_port: get("gsiftp_port"),
        app_loc: get("app_loc"),
        data_loc: get("data_loc"),
        osg_grid: get("osg_grid"),
        tmp_loc: get("tmp_loc"),
        wntmp_loc: get("wntmp_loc"),
        vdt_version: get("vdt_version"),
        sponsor_vo: get("sponsor_vo"),
        app_space: get("app_space"),
        data_space: get("data_space"),
        tmp_space: get("tmp_space"),
        exec_jm: get("exec_jm"),
        util_jm: get("util_jm"),
        globus_loc: get("globus_loc"),
        grid_services: get("grid_services"),
    }
}

/// Description of the submit host, built from its environment.
pub fn local_site_info(vo: &str, env: &HashMap<String, String>, hostname: &str) -> VorsSiteInfo {
    let osg_grid = env
        .get("PEGASUS_HOME")
        .and_then(|home| Path::new(home).parent())
        .map(|parent| parent.display().to_string());
    let work = env
        .get("HOME")
        .map(|home| Path::new(home).join("pegasus").display().to_string());

    VorsSiteInfo {
        shortname: Some(LOCAL_SITE.to_string()),
        osg_grid,
        globus_loc: env.get("GLOBUS_LOCATION").cloned(),
        data_loc: work.clone(),
        tmp_loc: work,
        wntmp_loc: Some("/tmp".to_string()),
        gatekeeper: Some(hostname.to_string()),
        gsiftp_port: Some(DEFAULT_GSIFTP_PORT.to_string()),
        util_jm: Some(format!("{}/jobmanager-fork", hostname)),
        exec_jm: Some(format!("{}/jobmanager-condor", hostname)),
        sponsor_vo: Some(vo.to_string()),
        ..VorsSiteInfo::default()
    }
}

/// GridFTP prefix of a site; the port is omitted when it is the default.
pub fn gsiftp_url(info: &VorsSiteInfo, vo_site: Option<&VoSite>) -> String {
    let host = match info.gatekeeper.as_deref().filter(|h| !h.is_empty()) {
        Some(host) => host,
        None => {
            debug!("gridftp host missing; using the gatekeeper entry");
            vo_site.map(VoSite::gatekeeper_host).unwrap_or_default()
        }
    };
    let port = info
        .gsiftp_port
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_GSIFTP_PORT);

    if port == DEFAULT_GSIFTP_PORT {
        format!("gsiftp://{}", host)
    } else {
        format!("gsiftp://{}:{}", host, port)
    }
}

fn scheduler_for(contact: Option<&str>) -> SchedulerType {
    contact.map(SchedulerType::from_contact).unwrap_or_default()
}

fn layout_directory(
    server: Option<FileServer>,
    mount_point: &str,
    free_size: &str,
) -> LayoutDirectory {
    LayoutDirectory {
        file_servers: server.into_iter().collect(),
        internal_mount_point: InternalMountPoint::with_sizes(mount_point, free_size, "100G"),
    }
}

/// Head node: shared areas on `data_loc`, local areas on `tmp_loc`, all over GridFTP.
/// Worker node: shared areas on `data_loc`, local areas on `wntmp_loc`.
fn site_layout(info: &VorsSiteInfo, gsiftp: &str) -> FileSystemLayout {
    let data_loc = info.data_loc.as_deref().unwrap_or("/");
    let tmp_loc = info.tmp_loc.as_deref().unwrap_or("/");
    let wntmp_loc = info.wntmp_loc.as_deref().unwrap_or("/");
    let gridftp = |dir: &str| Some(FileServer::new("gsiftp", gsiftp, dir));
    let file = |dir: &str| Some(FileServer::new("file", "file://", dir));

    let mut layout = FileSystemLayout::default();
    let slot = LayoutSlot::new;
    layout.set(
        slot(Node::Head, Area::Scratch, Visibility::Local),
        layout_directory(gridftp(tmp_loc), tmp_loc, "50G"),
    );
    layout.set(
        slot(Node::Head, Area::Scratch, Visibility::Shared),
        layout_directory(gridftp(data_loc), data_loc, "50G"),
    );
    layout.set(
        slot(Node::Head, Area::Storage, Visibility::Local),
        layout_directory(gridftp(tmp_loc), tmp_loc, "30G"),
    );
    layout.set(
        slot(Node::Head, Area::Storage, Visibility::Shared),
        layout_directory(gridftp(data_loc), data_loc, "50G"),
    );
    layout.set(
        slot(Node::Worker, Area::Scratch, Visibility::Local),
        layout_directory(file(wntmp_loc), wntmp_loc, "50G"),
    );
    layout.set(
        slot(Node::Worker, Area::Scratch, Visibility::Shared),
        layout_directory(None, data_loc, "50G"),
    );
    layout.set(
        slot(Node::Worker, Area::Storage, Visibility::Local),
        layout_directory(file(wntmp_loc), wntmp_loc, "50G"),
    );
    layout.set(
        slot(Node::Worker, Area::Storage, Visibility::Shared),
        layout_directory(None, data_loc, "50G"),
    );
    layout
}

/// Build a site entry from a VORS description.
///
/// Returns `None` when neither the description nor the listing row names the site.
pub fn to_site(info: &VorsSiteInfo, vo_site: Option<&VoSite>) -> Option<Site> {
    let Some(handle) = info
        .shortname
        .clone()
        .or_else(|| vo_site.map(|v| v.name.clone()))
        .filter(|h| !h.is_empty())
    else {
        warn!("VORS site description has no name");
        return None;
    };

    let mut site = Site::new(handle.as_str());
    apply_layout(&mut site, &site_layout(info, &gsiftp_url(info, vo_site)));

    let mut catalog = ReplicaCatalog::new(DEFAULT_REPLICA_CATALOG, "RLS");
    catalog.add_alias(handle.as_str());
    site.add_replica_catalog(catalog);

    let or_root = |value: &Option<String>| value.clone().unwrap_or_else(|| "/".to_string());
    let env = |key: &str, value: String| Profile::new(Namespace::Env, key, value);
    site.add_profile(env(
        "PEGASUS_HOME",
        format!("{}/pegasus", info.osg_grid.as_deref().unwrap_or_default()),
    ));
    site.add_profile(env("app_loc", or_root(&info.app_loc)));
    site.add_profile(env("data_loc", or_root(&info.data_loc)));
    site.add_profile(env("osg_grid", or_root(&info.osg_grid)));
    site.add_profile(env("tmp_loc", or_root(&info.tmp_loc)));
    site.add_profile(env("wntmp_loc", or_root(&info.wntmp_loc)));
    site.add_profile(Profile::new(
        Namespace::Pegasus,
        "grid",
        vo_site.map(|v| v.grid.clone()).unwrap_or_default(),
    ));

    let fallback_contact =
        || format!("{}/jobmanager-fork", vo_site.map(VoSite::gatekeeper_host).unwrap_or_default());

    let auxiliary = GridGateway::new(
        GatewayType::Gt2,
        info.util_jm.clone().unwrap_or_else(fallback_contact),
        scheduler_for(info.util_jm.as_deref()),
    )
    .with_job_type(JobType::Auxiliary);

    // globus on the head node when the auxiliary gateway forks, else under OSG_GRID
    let globus = if auxiliary.scheduler == SchedulerType::Fork {
        site.add_profile(env("GLOBUS_LOCATION", or_root(&info.globus_loc)));
        format!("{}/lib", info.globus_loc.as_deref().unwrap_or_default())
    } else {
        let location = format!("{}/globus", info.osg_grid.as_deref().unwrap_or_default());
        site.add_profile(env("GLOBUS_LOCATION", location.clone()));
        format!("{}/lib", location)
    };
    site.add_profile(env("LD_LIBRARY_PATH", globus));
    site.add_grid_gateway(auxiliary);

    site.add_grid_gateway(
        GridGateway::new(
            GatewayType::Gt2,
            info.exec_jm.clone().unwrap_or_else(fallback_contact),
            scheduler_for(info.exec_jm.as_deref()),
        )
        .with_job_type(JobType::Compute),
    );

    Some(site)
}

/// HTTP client for one VORS server, VO and grid.
pub struct VorsClient {
    client: Client,
    base_url: String,
    vo: String,
    grid: String,
}

impl VorsClient {
    pub fn new(settings: &VorsSettings) -> QueryResult<Self> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("http://{}:{}/cgi-bin/tindex.cgi", settings.host, settings.port),
            vo: settings.vo.clone(),
            grid: settings.grid.clone(),
        })
    }

    pub fn listing_url(&self) -> String {
        format!("{}?VO={}&grid={}", self.base_url, self.vo, self.grid)
    }

    pub fn site_url(&self, id: &str) -> String {
        format!("{}&res={}", self.listing_url(), id)
    }

    async fn fetch(&self, url: &str) -> QueryResult<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Sites listed for the VO; empty when the server cannot be reached.
    pub async fn sites(&self) -> Vec<VoSite> {
        let url = self.listing_url();
        match self.fetch(&url).await {
            Ok(text) => parse_vo_sites(&text),
            Err(e) => {
                warn!(url = %url, error = %e, "VORS site listing failed");
                Vec::new()
            }
        }
    }

    /// Description of one site; empty when the server cannot be reached.
    pub async fn site_info(&self, id: &str) -> VorsSiteInfo {
        let url = self.site_url(id);
        match self.fetch(&url).await {
            Ok(text) => parse_site_info(&text),
            Err(e) => {
                warn!(url = %url, error = %e, "VORS site query failed");
                VorsSiteInfo::default()
            }
        }
    }

    /// Every listed site, converted to site entries.
    pub async fn catalog(&self) -> SiteStore {
        let mut store = SiteStore::new();
        for vo_site in self.sites().await {
            let info = self.site_info(&vo_site.id).await;
            if let Some(site) = to_site(&info, Some(&vo_site)) {
                store.add_entry(site);
            }
        }
        info!(vo = %self.vo, grid = %self.grid, sites = store.len(), "loaded sites from VORS");
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitecat_core::{DirectoryType, Operation};
    use std::time::Duration;

    const LISTING: &str = "\
#columns=ID,Name,Gatekeeper,Type,Grid,Status,Last Test Date
233,UCSDT2,osg-gw-2.t2.ucsd.edu:2119,compute,OSG,PASS,2008-03-12 13:40:49

12,broken,row
301,Nebraska,red.unl.edu:2119,compute,OSG,FAIL,2008-03-12 12:01:02
";

    const SITE_INFO: &str = "\
# site description
shortname=UCSDT2
gatekeeper=osg-gw-2.t2.ucsd.edu
gk_port=2119
gsiftp_port=2812
app_loc=/code/osgcode/app
data_loc=/data/tmp
osg_grid=/code/osgcode/osg
tmp_loc=/tmp/head
wntmp_loc=/state/partition1
exec_jm=osg-gw-2.t2.ucsd.edu/jobmanager-condor
util_jm=osg-gw-2.t2.ucsd.edu/jobmanager-fork
globus_loc=/opt/globus
garbage line
";

    #[test]
    fn test_parse_vo_sites() {
        let sites = parse_vo_sites(LISTING);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].id, "233");
        assert_eq!(sites[0].gatekeeper_host(), "osg-gw-2.t2.ucsd.edu");
        assert_eq!(sites[1].name, "Nebraska");
        assert_eq!(sites[1].status, "FAIL");
    }

    #[test]
    fn test_parse_site_info() {
        let info = parse_site_info(SITE_INFO);
        assert_eq!(info.shortname.as_deref(), Some("UCSDT2"));
        assert_eq!(info.gsiftp_port.as_deref(), Some("2812"));
        assert_eq!(info.wntmp_loc.as_deref(), Some("/state/partition1"));
        assert!(info.sponsor_vo.is_none());
    }

    #[test]
    fn test_gsiftp_url() {
        let info = parse_site_info(SITE_INFO);
        assert_eq!(gsiftp_url(&info, None), "gsiftp://osg-gw-2.t2.ucsd.edu:2812");

        let listed = &parse_vo_sites(LISTING)[1];
        let bare = VorsSiteInfo::default();
        assert_eq!(gsiftp_url(&bare, Some(listed)), "gsiftp://red.unl.edu");
    }

    #[test]
    fn test_scheduler_for_contact() {
        assert_eq!(scheduler_for(Some("gw.edu/jobmanager-condor")), SchedulerType::Condor);
        assert_eq!(scheduler_for(Some("gw.edu/jobmanager-fork")), SchedulerType::Fork);
        assert_eq!(scheduler_for(Some("gw.edu/jobmanager-pbs")), SchedulerType::Pbs);
        assert_eq!(scheduler_for(None), SchedulerType::Fork);
    }

    #[test]
    fn test_to_site() {
        let listed = &parse_vo_sites(LISTING)[0];
        let site = to_site(&parse_site_info(SITE_INFO), Some(listed)).unwrap();

        assert_eq!(site.handle(), "UCSDT2");
        assert_eq!(site.work_directory_mount_point(), Some("/data/tmp"));

        let scratch = site.directory(DirectoryType::SharedScratch).unwrap();
        let server = scratch.select_file_server(Operation::All).unwrap();
        assert_eq!(server.url(), "gsiftp://osg-gw-2.t2.ucsd.edu:2812/data/tmp");
        assert_eq!(scratch.internal_mount_point.free_size.as_deref(), Some("50G"));
        assert_eq!(scratch.internal_mount_point.total_size.as_deref(), Some("100G"));

        let local_storage = site.directory(DirectoryType::LocalStorage).unwrap();
        assert_eq!(local_storage.mount_point(), Some("/tmp/head"));
        assert_eq!(local_storage.internal_mount_point.free_size.as_deref(), Some("30G"));

        let local_scratch = site.directory(DirectoryType::LocalScratch).unwrap();
        assert_eq!(
            local_scratch.select_file_server(Operation::All).unwrap().url(),
            "file:///state/partition1"
        );

        assert_eq!(site.environment_variable("PEGASUS_HOME"), Some("/code/osgcode/osg/pegasus"));
        assert_eq!(site.environment_variable("GLOBUS_LOCATION"), Some("/opt/globus"));
        assert_eq!(site.environment_variable("LD_LIBRARY_PATH"), Some("/opt/globus/lib"));
        assert_eq!(site.profiles().get(Namespace::Pegasus, "grid"), Some("OSG"));

        let compute = site.grid_gateway(JobType::Compute).unwrap();
        assert_eq!(compute.scheduler, SchedulerType::Condor);
        let auxiliary = site.grid_gateway(JobType::Auxiliary).unwrap();
        assert_eq!(auxiliary.scheduler, SchedulerType::Fork);

        let catalog = site.select_replica_catalog().unwrap();
        assert_eq!(catalog.url, DEFAULT_REPLICA_CATALOG);
    }

    #[test]
    fn test_globus_under_osg_grid() {
        let info = VorsSiteInfo {
            shortname: Some("pbs-site".to_string()),
            osg_grid: Some("/osg".to_string()),
            util_jm: Some("gk.example.org/jobmanager-pbs".to_string()),
            ..VorsSiteInfo::default()
        };
        let site = to_site(&info, None).unwrap();
        assert_eq!(site.environment_variable("GLOBUS_LOCATION"), Some("/osg/globus"));
        assert_eq!(site.environment_variable("LD_LIBRARY_PATH"), Some("/osg/globus/lib"));
        assert_eq!(
            site.grid_gateway(JobType::Compute).unwrap().contact,
            "/jobmanager-fork"
        );
    }

    #[test]
    fn test_unnamed_site() {
        assert!(to_site(&VorsSiteInfo::default(), None).is_none());
    }

    #[test]
    fn test_local_site_info() {
        let env = HashMap::from([
            ("PEGASUS_HOME".to_string(), "/opt/osg/pegasus".to_string()),
            ("HOME".to_string(), "/home/alice".to_string()),
            ("GLOBUS_LOCATION".to_string(), "/opt/globus".to_string()),
        ]);
        let info = local_site_info("ligo", &env, "submit.example.org");
        assert_eq!(info.shortname.as_deref(), Some(LOCAL_SITE));
        assert_eq!(info.osg_grid.as_deref(), Some("/opt/osg"));
        assert_eq!(info.data_loc.as_deref(), Some("/home/alice/pegasus"));
        assert_eq!(info.exec_jm.as_deref(), Some("submit.example.org/jobmanager-condor"));
        assert_eq!(info.sponsor_vo.as_deref(), Some("ligo"));

        let site = to_site(&info, None).unwrap();
        assert_eq!(
            site.grid_gateway(JobType::Auxiliary).unwrap().contact,
            "submit.example.org/jobmanager-fork"
        );
    }

    #[test]
    fn test_client_urls() {
        let settings = VorsSettings {
            timeout: Duration::from_secs(1),
            ..VorsSettings::default()
        };
        let client = VorsClient::new(&settings).unwrap();
        assert_eq!(
            client.listing_url(),
            "http://vors.grid.iu.edu:80/cgi-bin/tindex.cgi?VO=ligo&grid=osg"
        );
        assert_eq!(
            client.site_url("233"),
            "http://vors.grid.iu.edu:80/cgi-bin/tindex.cgi?VO=ligo&grid=osg&res=233"
        );
    }
}
