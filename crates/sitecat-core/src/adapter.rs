//! Conversions between the schema generations.
//!
//! All functions here are pure: they read one shape and build the other.
//!
//! Layout slots and directory types correspond as follows:
//!
//! | directory type   | layout slot            |
//! |------------------|------------------------|
//! | `shared-scratch` | head / scratch / shared |
//! | `shared-storage` | head / storage / shared |
//! | `local-scratch`  | worker / scratch / local |
//! | `local-storage`  | head / storage / local  |
//!
//! The remaining four layout slots have no flat counterpart and are dropped
//! when converting a layout into directories.

use tracing::{debug, warn};

use crate::directory::{Directory, DirectoryType, InternalMountPoint};
use crate::file_server::FileServer;
use crate::grid::{GatewayType, GridGateway, JobType, SchedulerType};
use crate::layout::{Area, FileSystemLayout, LayoutDirectory, LayoutSlot, Node, Visibility};
use crate::legacy::{
    GridFtpServer, JobManager, Lrc, PoolConfig, PoolSite, TRANSFER_UNIVERSE, VANILLA_UNIVERSE,
    WorkDir,
};
use crate::profile::{Namespace, Profile};
use crate::replica::ReplicaCatalog;
use crate::site::Site;
use crate::store::SiteStore;
use crate::sysinfo::SysInfo;

/// Pegasus profile key holding the kickstart path of a legacy pool.
pub const GRIDSTART_PATH_KEY: &str = "gridstart.path";

/// Replica catalog type given to legacy `lrc` entries.
pub const LRC_CATALOG_TYPE: &str = "LRC";

const DEFAULT_GLOBUS_VERSION: &str = "2.4.3";

pub fn directory_slot(kind: DirectoryType) -> LayoutSlot {
    match kind {
        DirectoryType::SharedScratch => {
            LayoutSlot::new(Node::Head, Area::Scratch, Visibility::Shared)
        }
        DirectoryType::SharedStorage => {
            LayoutSlot::new(Node::Head, Area::Storage, Visibility::Shared)
        }
        DirectoryType::LocalScratch => {
            LayoutSlot::new(Node::Worker, Area::Scratch, Visibility::Local)
        }
        DirectoryType::LocalStorage => {
            LayoutSlot::new(Node::Head, Area::Storage, Visibility::Local)
        }
    }
}

pub fn slot_directory_type(slot: LayoutSlot) -> Option<DirectoryType> {
    DirectoryType::ALL
        .into_iter()
        .find(|kind| directory_slot(*kind) == slot)
}

fn layout_directory(directory: &Directory) -> LayoutDirectory {
    LayoutDirectory {
        file_servers: directory.all_file_servers().cloned().collect(),
        internal_mount_point: directory.internal_mount_point.clone(),
    }
}

fn flat_directory(kind: DirectoryType, layout: &LayoutDirectory) -> Directory {
    let mut directory = Directory::new(kind);
    directory.internal_mount_point = layout.internal_mount_point.clone();
    for server in &layout.file_servers {
        directory.add_file_server(server.clone());
    }
    directory
}

/// Flat directories for every mapped slot of `layout`. Unmapped slots are dropped.
pub fn layout_to_directories(layout: &FileSystemLayout) -> Vec<Directory> {
    layout
        .occupied()
        .filter_map(|(slot, dir)| match slot_directory_type(slot) {
            Some(kind) => Some(flat_directory(kind, dir)),
            None => {
                warn!(slot = %slot, "no directory type for layout slot; dropping it");
                None
            }
        })
        .collect()
}

pub fn directories_to_layout<'a>(
    directories: impl IntoIterator<Item = &'a Directory>,
) -> FileSystemLayout {
    let mut layout = FileSystemLayout::default();
    for directory in directories {
        layout.set(directory_slot(directory.kind), layout_directory(directory));
    }
    layout
}

/// Replace the directories of `site` with those described by `layout`.
///
/// Node-level profiles of the layout are merged into the site profiles.
pub fn apply_layout(site: &mut Site, layout: &FileSystemLayout) {
    for directory in layout_to_directories(layout) {
        site.set_directory(directory);
    }
    site.profiles_mut().merge(&layout.head.profiles);
    site.profiles_mut().merge(&layout.worker.profiles);
}

pub fn site_layout(site: &Site) -> FileSystemLayout {
    directories_to_layout(site.directories())
}

fn gateway_type_for_globus(version: &str) -> GatewayType {
    match version.trim().chars().next() {
        Some('4') => GatewayType::Gt4,
        Some('5') => GatewayType::Gt5,
        _ => GatewayType::Gt2,
    }
}

fn globus_version_for_gateway(gateway_type: GatewayType) -> &'static str {
    match gateway_type {
        GatewayType::Gt4 => "4.0.0",
        GatewayType::Gt5 => "5.0.0",
        _ => DEFAULT_GLOBUS_VERSION,
    }
}

fn scheme_of(url: &str) -> &str {
    url.split_once("://").map(|(s, _)| s).unwrap_or(url)
}

fn job_manager_to_gateway(jm: &JobManager, job_type: JobType) -> GridGateway {
    let scheduler = jm
        .jobmanager_type
        .as_deref()
        .map(SchedulerType::parse_lenient)
        .unwrap_or_else(|| SchedulerType::from_contact(&jm.url));

    let mut gateway = GridGateway::new(gateway_type_for_globus(&jm.globus_version), &jm.url, scheduler)
        .with_job_type(job_type);
    gateway.idle_nodes = jm.idle_nodes.as_deref().and_then(|n| n.trim().parse().ok());
    gateway.total_nodes = jm.total_nodes.as_deref().and_then(|n| n.trim().parse().ok());
    gateway.os = jm.os_type.as_deref().and_then(|os| os.parse().ok());
    gateway.arch = jm.arch_type.as_deref().and_then(|a| a.parse().ok());
    gateway
}

/// Convert a legacy pool into a flat site.
///
/// `vanilla` job managers become compute gateways and `transfer` job managers
/// auxiliary gateways; only the first of each is kept. The work directory
/// becomes shared scratch and the GridFTP servers shared storage.
pub fn pool_site_to_site(pool: &PoolSite) -> Site {
    let mut site = Site::new(&pool.handle);

    if let Some(info) = &pool.sysinfo {
        match SysInfo::from_vds(info) {
            Ok(sysinfo) => site.sysinfo = sysinfo,
            Err(e) => warn!(site = %pool.handle, error = %e, "ignoring unparseable sysinfo"),
        }
    }

    for jm in &pool.job_managers {
        let job_type = match jm.universe.as_str() {
            VANILLA_UNIVERSE => JobType::Compute,
            TRANSFER_UNIVERSE => JobType::Auxiliary,
            other => {
                warn!(site = %pool.handle, universe = %other, "skipping job manager with unmapped universe");
                continue;
            }
        };
        if site.grid_gateway(job_type).is_some() {
            debug!(site = %pool.handle, contact = %jm.url, "keeping first {} job manager", jm.universe);
            continue;
        }
        site.add_grid_gateway(job_manager_to_gateway(jm, job_type));
    }

    if let Some(work_dir) = &pool.work_dir {
        let mut scratch = Directory::new(DirectoryType::SharedScratch);
        scratch.internal_mount_point = InternalMountPoint {
            mount_point: Some(work_dir.path.clone()),
            total_size: work_dir.total_size.clone(),
            free_size: work_dir.free_size.clone(),
        };
        for server in &pool.gridftp_servers {
            scratch.add_file_server(FileServer::new(
                scheme_of(&server.url),
                &server.url,
                &work_dir.path,
            ));
        }
        site.set_directory(scratch);
    }

    if let Some(first) = pool.gridftp_servers.first() {
        let mut storage = Directory::new(DirectoryType::SharedStorage);
        storage.internal_mount_point = InternalMountPoint {
            mount_point: Some(first.storage_dir.clone()),
            total_size: first.total_size.clone(),
            free_size: first.free_size.clone(),
        };
        for server in &pool.gridftp_servers {
            storage.add_file_server(FileServer::new(
                scheme_of(&server.url),
                &server.url,
                &server.storage_dir,
            ));
        }
        site.set_directory(storage);
    }

    for lrc in &pool.lrcs {
        site.add_replica_catalog(ReplicaCatalog::new(&lrc.url, LRC_CATALOG_TYPE));
    }

    if let Some(path) = &pool.grid_launch {
        site.add_profile(Profile::new(Namespace::Pegasus, GRIDSTART_PATH_KEY, path));
    }

    for profile in &pool.profiles {
        site.add_profile(profile.clone());
    }

    site
}

/// Convert a flat site back into a legacy pool.
///
/// Only compute and auxiliary gateways have a legacy universe; the others are
/// skipped. Shared-storage file servers become GridFTP servers.
pub fn site_to_pool_site(site: &Site) -> PoolSite {
    let mut pool = PoolSite::new(site.handle());
    pool.sysinfo = Some(site.sysinfo.to_vds());

    for gateway in site.grid_gateways() {
        let universe = match gateway.job_type {
            JobType::Compute => VANILLA_UNIVERSE,
            JobType::Auxiliary => TRANSFER_UNIVERSE,
            other => {
                debug!(site = %site.handle(), job_type = %other, "no legacy universe for gateway");
                continue;
            }
        };
        let mut jm = JobManager::new(
            universe,
            &gateway.contact,
            globus_version_for_gateway(gateway.gateway_type),
        );
        jm.idle_nodes = gateway.idle_nodes.map(|n| n.to_string());
        jm.total_nodes = gateway.total_nodes.map(|n| n.to_string());
        pool.job_managers.push(jm);
    }

    if let Some(scratch) = site.directory(DirectoryType::SharedScratch) {
        if let Some(path) = scratch.mount_point() {
            pool.work_dir = Some(WorkDir {
                path: path.to_string(),
                total_size: scratch.internal_mount_point.total_size.clone(),
                free_size: scratch.internal_mount_point.free_size.clone(),
            });
        }
    }

    let globus_version = site
        .grid_gateway(JobType::Compute)
        .map(|g| globus_version_for_gateway(g.gateway_type))
        .unwrap_or(DEFAULT_GLOBUS_VERSION);

    if let Some(storage) = site.directory(DirectoryType::SharedStorage) {
        for (i, server) in storage.all_file_servers().enumerate() {
            let mut gridftp = GridFtpServer {
                url: server.url_prefix.clone(),
                storage_dir: server.mount_point.clone(),
                globus_version: globus_version.to_string(),
                ..GridFtpServer::default()
            };
            if i == 0 {
                gridftp.total_size = storage.internal_mount_point.total_size.clone();
                gridftp.free_size = storage.internal_mount_point.free_size.clone();
            }
            pool.gridftp_servers.push(gridftp);
        }
    }

    for catalog in site.replica_catalogs() {
        if catalog.catalog_type.eq_ignore_ascii_case(LRC_CATALOG_TYPE) {
            pool.lrcs.push(Lrc::new(&catalog.url));
        }
    }

    for profile in site.profiles().iter() {
        if profile.namespace == Namespace::Pegasus && profile.key == GRIDSTART_PATH_KEY {
            pool.grid_launch = Some(profile.value);
        } else {
            pool.profiles.push(profile);
        }
    }

    pool
}

pub fn pool_config_to_store(config: &PoolConfig) -> SiteStore {
    config.sites().map(pool_site_to_site).collect()
}

pub fn store_to_pool_config(store: &SiteStore) -> PoolConfig {
    let mut config = PoolConfig::new();
    for site in store.entries() {
        config.add(site.handle(), site_to_pool_site(site));
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_server::Operation;

    fn sample_pool() -> PoolSite {
        let mut pool = PoolSite::new("isi_viz");
        pool.sysinfo = Some("INTEL32::LINUX".to_string());
        pool.grid_launch = Some("/nfs/vds/bin/kickstart".to_string());
        pool.work_dir = Some(WorkDir::new("/scratch"));
        pool.gridftp_servers
            .push(GridFtpServer::from_url("gsiftp://viz.isi.edu/data/storage", "2.4.3").unwrap());
        pool.job_managers
            .push(JobManager::new(VANILLA_UNIVERSE, "viz.isi.edu/jobmanager-pbs", "2.4.3"));
        pool.job_managers
            .push(JobManager::new(TRANSFER_UNIVERSE, "viz.isi.edu/jobmanager-fork", "4.0.1"));
        pool.lrcs.push(Lrc::new("rls://viz.isi.edu"));
        pool.profiles
            .push(Profile::new(Namespace::Env, "GLOBUS_LOCATION", "/opt/globus"));
        pool
    }

    #[test]
    fn test_mapping_table_is_bijective_over_directory_types() {
        for kind in DirectoryType::ALL {
            assert_eq!(slot_directory_type(directory_slot(kind)), Some(kind));
        }
        let unmapped = LayoutSlot::all()
            .filter(|s| slot_directory_type(*s).is_none())
            .count();
        assert_eq!(unmapped, 4);
    }

    #[test]
    fn test_layout_round_trip() {
        let mut site = Site::new("isi");
        for kind in DirectoryType::ALL {
            let mut dir = Directory::with_path(kind, format!("/{}", kind));
            dir.add_file_server(
                FileServer::from_url(&format!("gsiftp://isi.edu/{}", kind), Operation::Get).unwrap(),
            );
            site.add_directory(dir).unwrap();
        }

        let layout = site_layout(&site);
        assert!(layout.get(LayoutSlot::new(Node::Head, Area::Storage, Visibility::Local)).is_some());
        assert!(layout.get(LayoutSlot::new(Node::Worker, Area::Storage, Visibility::Local)).is_none());

        let mut rebuilt = Site::new("isi");
        apply_layout(&mut rebuilt, &layout);
        assert_eq!(rebuilt, site);
    }

    #[test]
    fn test_unmapped_slots_dropped() {
        let mut layout = FileSystemLayout::default();
        layout.set(
            LayoutSlot::new(Node::Worker, Area::Storage, Visibility::Shared),
            LayoutDirectory::default(),
        );
        layout.set(
            LayoutSlot::new(Node::Head, Area::Scratch, Visibility::Shared),
            LayoutDirectory {
                internal_mount_point: InternalMountPoint::new("/scratch"),
                ..LayoutDirectory::default()
            },
        );
        let dirs = layout_to_directories(&layout);
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].kind, DirectoryType::SharedScratch);
    }

    #[test]
    fn test_pool_site_to_site() {
        let site = pool_site_to_site(&sample_pool());

        assert_eq!(site.handle(), "isi_viz");
        assert_eq!(site.arch(), crate::Architecture::X86);
        assert_eq!(site.work_directory_mount_point(), Some("/scratch"));

        let compute = site.grid_gateway(JobType::Compute).unwrap();
        assert_eq!(compute.scheduler, SchedulerType::Pbs);
        assert_eq!(compute.gateway_type, GatewayType::Gt2);
        let aux = site.grid_gateway(JobType::Auxiliary).unwrap();
        assert_eq!(aux.scheduler, SchedulerType::Fork);
        assert_eq!(aux.gateway_type, GatewayType::Gt4);

        let storage = site.directory(DirectoryType::SharedStorage).unwrap();
        assert_eq!(storage.mount_point(), Some("/data/storage"));
        let fs = storage.select_file_server(Operation::Put).unwrap();
        assert_eq!(fs.url(), "gsiftp://viz.isi.edu/data/storage");
        assert_eq!(fs.protocol, "gsiftp");

        let scratch_fs = site.select_shared_scratch_file_server(Operation::Get).unwrap();
        assert_eq!(scratch_fs.url(), "gsiftp://viz.isi.edu/scratch");

        assert_eq!(site.replica_catalogs()[0].catalog_type, LRC_CATALOG_TYPE);
        assert_eq!(
            site.profiles().get(Namespace::Pegasus, GRIDSTART_PATH_KEY),
            Some("/nfs/vds/bin/kickstart")
        );
        assert_eq!(site.environment_variable("GLOBUS_LOCATION"), Some("/opt/globus"));
    }

    #[test]
    fn test_unknown_universe_skipped() {
        let mut pool = PoolSite::new("odd");
        pool.job_managers
            .push(JobManager::new("globus", "odd.edu/jobmanager", "2.4"));
        let site = pool_site_to_site(&pool);
        assert_eq!(site.grid_gateways().count(), 0);
    }

    #[test]
    fn test_site_to_pool_site_round_trip() {
        let pool = sample_pool();
        let back = site_to_pool_site(&pool_site_to_site(&pool));

        assert_eq!(back.handle, pool.handle);
        assert_eq!(back.sysinfo, pool.sysinfo);
        assert_eq!(back.grid_launch, pool.grid_launch);
        assert_eq!(back.work_dir, pool.work_dir);
        assert_eq!(back.lrcs, pool.lrcs);
        assert_eq!(back.profiles, pool.profiles);
        assert_eq!(back.gridftp_servers[0].full_url(), pool.gridftp_servers[0].full_url());
        assert_eq!(back.job_managers.len(), 2);
        assert!(back.select_job_manager(VANILLA_UNIVERSE).is_some());
    }
}
