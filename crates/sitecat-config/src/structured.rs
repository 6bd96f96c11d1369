//! YAML and JSON site catalogs.
//!
//! ```yaml
//! pegasus: "5.0"
//! sites:
//!   - name: condorpool
//!     arch: x86_64
//!     os.type: linux
//!     directories:
//!       - type: sharedScratch
//!         path: /lustre
//!         fileServers:
//!           - url: gsiftp://smarty.isi.edu/lustre
//!             operation: all
//!     grids:
//!       - type: gt5
//!         contact: smarty.isi.edu/jobmanager-pbs
//!         scheduler: pbs
//!         jobtype: compute
//!     profiles:
//!       env:
//!         PATH: /usr/bin
//! ```
//!
//! Keys are checked against a fixed set per container. Keys starting with
//! `x-` are extension keys and are skipped. Replica catalogs and per-gateway
//! OS overrides have no structured form and are not written.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

use sitecat_core::{
    Directory, DirectoryType, FileServer, GridGateway, Namespace, Operation, Profiles,
    SchedulerType, Site, SiteStore,
};

use crate::{ConfigError, ConfigResult};

/// Catalog format version written to the `pegasus` key.
pub const CATALOG_VERSION: &str = "5.0";

const EXTENSION_PREFIX: &str = "x-";

pub const CATALOG_KEYS: &[&str] = &["pegasus", "sites"];
pub const SITE_KEYS: &[&str] = &[
    "name",
    "arch",
    "os.type",
    "os.release",
    "os.version",
    "directories",
    "grids",
    "profiles",
];
pub const DIRECTORY_KEYS: &[&str] = &[
    "type",
    "path",
    "sharedFileSystem",
    "fileServers",
    "freeSize",
    "totalSize",
];
pub const FILE_SERVER_KEYS: &[&str] = &["url", "operation", "profiles"];
pub const GRID_KEYS: &[&str] = &["type", "contact", "scheduler", "jobtype"];

#[derive(Serialize)]
struct CatalogDoc {
    pegasus: &'static str,
    sites: Vec<SiteDoc>,
}

type ProfilesDoc = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Serialize)]
struct SiteDoc {
    name: String,
    arch: String,
    #[serde(rename = "os.type")]
    os_type: String,
    #[serde(rename = "os.release", skip_serializing_if = "Option::is_none")]
    os_release: Option<String>,
    #[serde(rename = "os.version", skip_serializing_if = "Option::is_none")]
    os_version: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    directories: Vec<DirectoryDoc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    grids: Vec<GridDoc>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    profiles: ProfilesDoc,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryDoc {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    shared_file_system: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    file_servers: Vec<FileServerDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    free_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_size: Option<String>,
}

#[derive(Serialize)]
struct FileServerDoc {
    url: String,
    operation: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    profiles: ProfilesDoc,
}

#[derive(Serialize)]
struct GridDoc {
    #[serde(rename = "type")]
    gateway_type: String,
    contact: String,
    scheduler: String,
    jobtype: String,
}

fn profiles_doc(profiles: &Profiles) -> ProfilesDoc {
    let mut doc = ProfilesDoc::new();
    for profile in profiles.iter() {
        doc.entry(profile.namespace.to_string())
            .or_default()
            .insert(profile.key, profile.value);
    }
    doc
}

fn directory_doc(directory: &Directory) -> DirectoryDoc {
    let mount = &directory.internal_mount_point;
    DirectoryDoc {
        kind: directory.kind.camel_name(),
        path: mount.mount_point.clone(),
        shared_file_system: directory.shared_file_system,
        file_servers: directory
            .all_file_servers()
            .map(|server| FileServerDoc {
                url: server.url(),
                operation: server.operation.to_string(),
                profiles: profiles_doc(&server.profiles),
            })
            .collect(),
        free_size: mount.free_size.clone(),
        total_size: mount.total_size.clone(),
    }
}

fn grid_doc(gateway: &GridGateway) -> GridDoc {
    GridDoc {
        gateway_type: gateway.gateway_type.to_string(),
        contact: gateway.contact.clone(),
        scheduler: gateway.scheduler.to_string(),
        jobtype: gateway.job_type.to_string(),
    }
}

fn site_doc(site: &Site) -> SiteDoc {
    SiteDoc {
        name: site.handle().to_string(),
        arch: site.arch().to_string(),
        os_type: site.os().to_string(),
        os_release: site.sysinfo.os_release.clone(),
        os_version: site.sysinfo.os_version.clone(),
        directories: site.directories().map(directory_doc).collect(),
        grids: site.grid_gateways().map(grid_doc).collect(),
        profiles: profiles_doc(site.profiles()),
    }
}

fn catalog_doc(store: &SiteStore) -> CatalogDoc {
    CatalogDoc {
        pegasus: CATALOG_VERSION,
        sites: store.entries().map(site_doc).collect(),
    }
}

pub fn write_yaml(store: &SiteStore) -> ConfigResult<String> {
    Ok(serde_yaml::to_string(&catalog_doc(store))?)
}

pub fn write_json(store: &SiteStore) -> ConfigResult<String> {
    Ok(serde_json::to_string_pretty(&catalog_doc(store))?)
}

/// Parse a `{pegasus, sites}` YAML catalog.
pub fn parse_yaml(input: &str) -> ConfigResult<SiteStore> {
    let value: Value = serde_yaml::from_str(input)?;
    read_catalog(&value)
}

/// Parse a `{pegasus, sites}` JSON catalog.
pub fn parse_json(input: &str) -> ConfigResult<SiteStore> {
    let value: Value = serde_json::from_str(input)?;
    read_catalog(&value)
}

/// Parse a single YAML site object.
pub fn parse_yaml_site(input: &str) -> ConfigResult<Site> {
    let value: Value = serde_yaml::from_str(input)?;
    read_site(&value)
}

fn is_extension(key: &str) -> bool {
    key.starts_with(EXTENSION_PREFIX)
}

/// Entries of a mapping whose keys are all known or extension keys.
fn checked_entries<'a>(
    value: &'a Value,
    container: &str,
    known: &[&str],
) -> ConfigResult<Vec<(&'a str, &'a Value)>> {
    let mapping = as_mapping(value, container)?;
    let mut entries = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let key = key_str(key, container)?;
        if is_extension(key) {
            debug!(key = %key, container = %container, "skipping extension key");
            continue;
        }
        if !known.contains(&key) {
            return Err(ConfigError::unsupported(key, container));
        }
        entries.push((key, value));
    }
    Ok(entries)
}

fn as_mapping<'a>(value: &'a Value, container: &str) -> ConfigResult<&'a Mapping> {
    value
        .as_mapping()
        .ok_or_else(|| ConfigError::invalid(container, "expected a mapping"))
}

fn as_sequence<'a>(value: &'a Value, field: &str) -> ConfigResult<&'a [Value]> {
    value
        .as_sequence()
        .map(Vec::as_slice)
        .ok_or_else(|| ConfigError::invalid(field, "expected a list"))
}

fn key_str<'a>(key: &'a Value, container: &str) -> ConfigResult<&'a str> {
    key.as_str()
        .ok_or_else(|| ConfigError::invalid(container, format!("non-string key {:?}", key)))
}

/// Scalars are accepted in any YAML form, e.g. `os.version: 7`.
fn scalar(value: &Value, field: &str) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ConfigError::invalid(field, "expected a scalar value")),
    }
}

fn parse_scalar<T>(value: &Value, field: &str) -> ConfigResult<T>
where
    T: FromStr<Err = sitecat_core::Error>,
{
    Ok(scalar(value, field)?.parse()?)
}

fn read_catalog(value: &Value) -> ConfigResult<SiteStore> {
    let mut store = SiteStore::new();
    for (key, value) in checked_entries(value, "catalog", CATALOG_KEYS)? {
        match key {
            "pegasus" => debug!(version = %scalar(value, key)?, "structured catalog version"),
            "sites" => {
                for site in as_sequence(value, key)? {
                    let site = read_site(site)?;
                    if store.add_entry(site).is_some() {
                        debug!("replacing earlier site with the same handle");
                    }
                }
            }
            other => return Err(ConfigError::unsupported(other, "catalog")),
        }
    }
    debug!(sites = store.len(), "parsed structured site catalog");
    Ok(store)
}

fn read_site(value: &Value) -> ConfigResult<Site> {
    let entries = checked_entries(value, "site", SITE_KEYS)?;
    let name = entries
        .iter()
        .find(|(k, _)| *k == "name")
        .map(|(_, v)| scalar(v, "name"))
        .transpose()?
        .ok_or_else(|| ConfigError::MissingField("site name".to_string()))?;

    let mut site = Site::new(name);
    for (key, value) in entries {
        match key {
            "name" => {}
            "arch" => site.sysinfo.arch = parse_scalar(value, key)?,
            "os.type" => site.sysinfo.os = parse_scalar(value, key)?,
            "os.release" => site.sysinfo.os_release = Some(scalar(value, key)?),
            "os.version" => site.sysinfo.os_version = Some(scalar(value, key)?),
            "directories" => {
                for directory in as_sequence(value, key)? {
                    site.add_directory(read_directory(directory)?)?;
                }
            }
            "grids" => {
                for grid in as_sequence(value, key)? {
                    site.add_grid_gateway(read_grid(grid)?);
                }
            }
            "profiles" => site.profiles_mut().merge(&read_profiles(value)?),
            other => return Err(ConfigError::unsupported(other, "site")),
        }
    }
    Ok(site)
}

fn read_directory(value: &Value) -> ConfigResult<Directory> {
    let entries = checked_entries(value, "directory", DIRECTORY_KEYS)?;
    let kind: DirectoryType = entries
        .iter()
        .find(|(k, _)| *k == "type")
        .map(|(_, v)| parse_scalar(v, "type"))
        .transpose()?
        .ok_or_else(|| ConfigError::MissingField("directory type".to_string()))?;

    let mut directory = Directory::new(kind);
    for (key, value) in entries {
        match key {
            "type" => {}
            "path" => directory.internal_mount_point.mount_point = Some(scalar(value, key)?),
            "sharedFileSystem" => {
                directory.shared_file_system = value
                    .as_bool()
                    .ok_or_else(|| ConfigError::invalid(key, "expected true or false"))?;
            }
            "fileServers" => {
                for server in as_sequence(value, key)? {
                    directory.add_file_server(read_file_server(server)?);
                }
            }
            "freeSize" => directory.internal_mount_point.free_size = Some(scalar(value, key)?),
            "totalSize" => directory.internal_mount_point.total_size = Some(scalar(value, key)?),
            other => return Err(ConfigError::unsupported(other, "directory")),
        }
    }
    Ok(directory)
}

fn read_file_server(value: &Value) -> ConfigResult<FileServer> {
    let mut url = None;
    let mut operation = Operation::All;
    let mut profiles = Profiles::new();
    for (key, value) in checked_entries(value, "fileServer", FILE_SERVER_KEYS)? {
        match key {
            "url" => url = Some(scalar(value, key)?),
            "operation" => operation = parse_scalar(value, key)?,
            "profiles" => profiles = read_profiles(value)?,
            other => return Err(ConfigError::unsupported(other, "fileServer")),
        }
    }
    let url = url.ok_or_else(|| ConfigError::MissingField("file server url".to_string()))?;
    let mut server = FileServer::from_url(&url, operation)?;
    server.profiles = profiles;
    Ok(server)
}

fn read_grid(value: &Value) -> ConfigResult<GridGateway> {
    let mut gateway = GridGateway::default();
    let mut contact = None;
    let mut scheduler = None;
    for (key, value) in checked_entries(value, "grid", GRID_KEYS)? {
        match key {
            "type" => gateway.gateway_type = parse_scalar(value, key)?,
            "contact" => contact = Some(scalar(value, key)?),
            "scheduler" => scheduler = Some(SchedulerType::parse_lenient(&scalar(value, key)?)),
            "jobtype" => gateway.job_type = parse_scalar(value, key)?,
            other => return Err(ConfigError::unsupported(other, "grid")),
        }
    }
    gateway.contact =
        contact.ok_or_else(|| ConfigError::MissingField("grid contact".to_string()))?;
    gateway.scheduler = scheduler.unwrap_or_else(|| SchedulerType::from_contact(&gateway.contact));
    Ok(gateway)
}

fn read_profiles(value: &Value) -> ConfigResult<Profiles> {
    let mut profiles = Profiles::new();
    for (namespace, entries) in as_mapping(value, "profiles")? {
        let name = key_str(namespace, "profiles")?;
        if is_extension(name) {
            continue;
        }
        let namespace: Namespace = name
            .parse()
            .map_err(|_| ConfigError::unsupported(name, "profiles"))?;
        for (key, value) in as_mapping(entries, name)? {
            let key = key_str(key, name)?;
            profiles.insert(namespace, key, scalar(value, key)?);
        }
    }
    Ok(profiles)
}
