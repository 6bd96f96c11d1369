//! Reader for version 2 (`sc-2.0.xsd`) site catalogs.
//!
//! Version 2 documents carry the pool config model in XML form: `<site>`
//! elements hold `<jobmanager>`, `<gridftp>`, `<lrc>`, `<workdirectory>` and
//! `<profile>` children. They are read into a [`PoolConfig`].

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use sitecat_core::Profile;
use sitecat_core::legacy::{GridFtpBandwidth, GridFtpServer, JobManager, Lrc, PoolConfig, PoolSite, WorkDir};
use tracing::{debug, warn};

use super::reader::{attributes, required};
use crate::{ConfigError, ConfigResult};

pub const POOL_SCHEMA_LOCATION: &str = "http://pegasus.isi.edu/schema/sc-2.0.xsd";

enum Element {
    Catalog,
    Site(PoolSite),
    GridFtp(GridFtpServer),
    Bandwidth(GridFtpBandwidth),
    JobManager(JobManager),
    Lrc(Lrc),
    WorkDir(WorkDir),
    Profile { namespace: String, key: String, value: String },
}

impl Element {
    fn name(&self) -> &'static str {
        match self {
            Element::Catalog => "sitecatalog",
            Element::Site(_) => "site",
            Element::GridFtp(_) => "gridftp",
            Element::Bandwidth(_) => "bandwidth",
            Element::JobManager(_) => "jobmanager",
            Element::Lrc(_) => "lrc",
            Element::WorkDir(_) => "workdirectory",
            Element::Profile { .. } => "profile",
        }
    }
}

/// True when the root element declares schema version 2.
///
/// Looks at the `version` attribute first and then at `xsi:schemaLocation`.
pub fn is_pool_xml(input: &str) -> ConfigResult<bool> {
    let mut reader = Reader::from_str(input);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => return declares_version_two(&e),
            Event::Eof => return Ok(false),
            _ => {}
        }
        buf.clear();
    }
}

fn declares_version_two(root: &BytesStart) -> ConfigResult<bool> {
    if root.name().as_ref() != b"sitecatalog" {
        return Ok(false);
    }
    let mut schema_location = None;
    for attr in root.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"version" => return Ok(attr.unescape_value()?.trim().starts_with('2')),
            b"xsi:schemaLocation" => schema_location = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }
    Ok(schema_location.is_some_and(|location| location.contains("sc-2.0")))
}

/// Parse a version 2 site catalog document.
///
/// Unknown elements and attributes are rejected with
/// [`ConfigError::UnsupportedKey`]. Profiles in an unknown namespace are
/// skipped with a warning.
pub fn parse_pool_xml(input: &str) -> ConfigResult<PoolConfig> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<Element> = Vec::new();
    let mut config = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let element = open(&e, stack.last())?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = open(&e, stack.last())?;
                close(element, &mut stack, &mut config);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    close(element, &mut stack, &mut config);
                }
            }
            Event::Text(t) => push_text(stack.last_mut(), &t.unescape()?),
            Event::CData(t) => push_text(stack.last_mut(), &String::from_utf8_lossy(&t)),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let config = config.ok_or_else(|| ConfigError::MissingField("sitecatalog".to_string()))?;
    debug!(pools = config.len(), "parsed version 2 XML site catalog");
    Ok(config)
}

fn push_text(element: Option<&mut Element>, text: &str) {
    match element {
        Some(Element::Profile { value, .. }) => value.push_str(text),
        Some(Element::WorkDir(work_dir)) => work_dir.path.push_str(text),
        _ => {}
    }
}

fn accepts(parent: Option<&Element>, child: &str) -> bool {
    match parent {
        None => child == "sitecatalog",
        Some(Element::Catalog) => child == "site",
        Some(Element::Site(_)) => {
            matches!(child, "lrc" | "jobmanager" | "gridftp" | "workdirectory" | "profile")
        }
        Some(Element::GridFtp(_)) => child == "bandwidth",
        Some(_) => false,
    }
}

fn open(e: &BytesStart, parent: Option<&Element>) -> ConfigResult<Element> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    if !accepts(parent, &name) {
        let container = parent.map(Element::name).unwrap_or("document");
        return Err(ConfigError::unsupported(name, container));
    }
    let attrs = attributes(e)?;
    match name.as_str() {
        "sitecatalog" => catalog_element(attrs),
        "site" => site_element(attrs),
        "lrc" => lrc_element(attrs),
        "jobmanager" => job_manager_element(attrs),
        "gridftp" => gridftp_element(attrs),
        "bandwidth" => bandwidth_element(attrs),
        "workdirectory" => work_dir_element(attrs),
        "profile" => profile_element(attrs),
        _ => Err(ConfigError::unsupported(name, "sitecatalog")),
    }
}

fn catalog_element(attrs: Vec<(String, String)>) -> ConfigResult<Element> {
    for (key, _) in attrs {
        if key != "version" {
            return Err(ConfigError::unsupported(key, "sitecatalog"));
        }
    }
    Ok(Element::Catalog)
}

fn site_element(attrs: Vec<(String, String)>) -> ConfigResult<Element> {
    let mut handle = None;
    let mut site = PoolSite::default();
    for (key, value) in attrs {
        match key.as_str() {
            "handle" => handle = Some(value),
            "gridlaunch" => {
                site.grid_launch =
                    Some(value).filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"));
            }
            "sysinfo" => site.sysinfo = Some(value),
            _ => return Err(ConfigError::unsupported(key, "site")),
        }
    }
    site.handle = required("site handle", handle)?;
    Ok(Element::Site(site))
}

fn lrc_element(attrs: Vec<(String, String)>) -> ConfigResult<Element> {
    let mut url = None;
    for (key, value) in attrs {
        match key.as_str() {
            "url" => url = Some(value),
            _ => return Err(ConfigError::unsupported(key, "lrc")),
        }
    }
    Ok(Element::Lrc(Lrc::new(required("lrc url", url)?)))
}

/// `major`, `minor` and `patch` attributes joined as `M.m.p`.
#[derive(Default)]
struct GlobusVersion {
    major: Option<String>,
    minor: Option<String>,
    patch: Option<String>,
}

impl GlobusVersion {
    fn set(&mut self, key: &str, value: String) -> bool {
        match key {
            "major" => self.major = Some(value),
            "minor" => self.minor = Some(value),
            "patch" => self.patch = Some(value),
            _ => return false,
        }
        true
    }

    fn render(self, element: &str) -> ConfigResult<String> {
        let part = |name: &str, value: Option<String>| -> ConfigResult<u32> {
            let field = format!("{} {}", element, name);
            let value = required(&field, value)?;
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(field, format!("'{}' is not a version number", value)))
        };
        Ok(format!(
            "{}.{}.{}",
            part("major", self.major)?,
            part("minor", self.minor)?,
            part("patch", self.patch)?
        ))
    }
}

fn job_manager_element(attrs: Vec<(String, String)>) -> ConfigResult<Element> {
    let mut universe = None;
    let mut url = None;
    let mut version = GlobusVersion::default();
    let mut jm = JobManager::default();
    for (key, value) in attrs {
        if version.set(&key, value.clone()) {
            continue;
        }
        match key.as_str() {
            "universe" => universe = Some(value),
            "url" => url = Some(value),
            "free-mem" => jm.free_mem = Some(value),
            "total-mem" => jm.total_mem = Some(value),
            "max-count" => jm.max_count = Some(value),
            "max-cpu-time" => jm.max_cpu_time = Some(value),
            "running-jobs" => jm.running_jobs = Some(value),
            "jobs-in-queue" => jm.jobs_in_queue = Some(value),
            "idle-nodes" => jm.idle_nodes = Some(value),
            "total-nodes" => jm.total_nodes = Some(value),
            "os" => jm.os_type = Some(value),
            "arch" => jm.arch_type = Some(value),
            "type" => jm.jobmanager_type = Some(value),
            _ => return Err(ConfigError::unsupported(key, "jobmanager")),
        }
    }
    jm.universe = required("jobmanager universe", universe)?;
    jm.url = required("jobmanager url", url)?;
    jm.globus_version = version.render("jobmanager")?;
    Ok(Element::JobManager(jm))
}

fn gridftp_element(attrs: Vec<(String, String)>) -> ConfigResult<Element> {
    let mut url = None;
    let mut version = GlobusVersion::default();
    let mut server = GridFtpServer::default();
    for (key, value) in attrs {
        if version.set(&key, value.clone()) {
            continue;
        }
        match key.as_str() {
            "url" => url = Some(value),
            "storage" => server.storage_dir = value,
            "total-size" => server.total_size = Some(value),
            "free-size" => server.free_size = Some(value),
            _ => return Err(ConfigError::unsupported(key, "gridftp")),
        }
    }
    server.url = required("gridftp url", url)?;
    server.globus_version = version.render("gridftp")?;
    Ok(Element::GridFtp(server))
}

fn bandwidth_element(attrs: Vec<(String, String)>) -> ConfigResult<Element> {
    let mut dest_subnet = None;
    let mut bandwidth = GridFtpBandwidth::default();
    for (key, value) in attrs {
        match key.as_str() {
            "dest-subnet" => dest_subnet = Some(value),
            "avg-bandwidth" => bandwidth.avg_bandwidth = Some(value),
            "max-bandwidth" => bandwidth.max_bandwidth = Some(value),
            "min-bandwidth" => bandwidth.min_bandwidth = Some(value),
            "avg-bandwidth-range1" => bandwidth.avg_bandwidth_ranges[0] = Some(value),
            "avg-bandwidth-range2" => bandwidth.avg_bandwidth_ranges[1] = Some(value),
            "avg-bandwidth-range3" => bandwidth.avg_bandwidth_ranges[2] = Some(value),
            "avg-bandwidth-range4" => bandwidth.avg_bandwidth_ranges[3] = Some(value),
            _ => return Err(ConfigError::unsupported(key, "bandwidth")),
        }
    }
    bandwidth.dest_subnet = required("bandwidth dest-subnet", dest_subnet)?;
    Ok(Element::Bandwidth(bandwidth))
}

fn work_dir_element(attrs: Vec<(String, String)>) -> ConfigResult<Element> {
    let mut work_dir = WorkDir::default();
    for (key, value) in attrs {
        match key.as_str() {
            "total-size" => work_dir.total_size = Some(value),
            "free-size" => work_dir.free_size = Some(value),
            _ => return Err(ConfigError::unsupported(key, "workdirectory")),
        }
    }
    Ok(Element::WorkDir(work_dir))
}

fn profile_element(attrs: Vec<(String, String)>) -> ConfigResult<Element> {
    let mut namespace = None;
    let mut profile_key = None;
    for (key, value) in attrs {
        match key.as_str() {
            "namespace" => namespace = Some(value),
            "key" => profile_key = Some(value),
            _ => return Err(ConfigError::unsupported(key, "profile")),
        }
    }
    Ok(Element::Profile {
        namespace: required("profile namespace", namespace)?,
        key: required("profile key", profile_key)?,
        value: String::new(),
    })
}

fn close(element: Element, stack: &mut [Element], config: &mut Option<PoolConfig>) {
    let parent = stack.last_mut();
    match (element, parent) {
        (Element::Catalog, None) => {
            config.get_or_insert_with(PoolConfig::new);
        }
        (Element::Site(site), Some(Element::Catalog)) => {
            let handle = site.handle.clone();
            config.get_or_insert_with(PoolConfig::new).add(&handle, site);
        }
        (Element::GridFtp(server), Some(Element::Site(site))) => site.gridftp_servers.push(server),
        (Element::Bandwidth(bandwidth), Some(Element::GridFtp(server))) => {
            server.bandwidths.push(bandwidth)
        }
        (Element::JobManager(jm), Some(Element::Site(site))) => site.job_managers.push(jm),
        (Element::Lrc(lrc), Some(Element::Site(site))) => site.lrcs.push(lrc),
        (Element::WorkDir(mut work_dir), Some(Element::Site(site))) => {
            work_dir.path = work_dir.path.trim().to_string();
            site.work_dir = Some(work_dir);
        }
        (Element::Profile { namespace, key, value }, Some(Element::Site(site))) => {
            match namespace.parse() {
                Ok(namespace) => site.profiles.push(Profile::new(namespace, key, value.trim())),
                Err(_) => warn!(
                    site = %site.handle,
                    namespace = %namespace,
                    key = %key,
                    "skipping profile in unknown namespace"
                ),
            }
        }
        _ => {}
    }
}
