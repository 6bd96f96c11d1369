use std::str::FromStr;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use sitecat_core::adapter::apply_layout;
use sitecat_core::layout::{Area, FileSystemLayout, LayoutDirectory, Node, NodeFileSystem, StorageArea, Visibility};
use sitecat_core::{
    Connection, Directory, DirectoryType, FileServer, GridGateway, InternalMountPoint, Namespace,
    Operation, Profile, ReplicaCatalog, SchedulerType, Site, SiteStore,
};
use tracing::debug;

use crate::{ConfigError, ConfigResult};

/// An element being built, with everything read from its children so far.
enum Frame {
    Catalog(SiteStore),
    Site { site: Site, layout: FileSystemLayout },
    Grid(GridGateway),
    Directory(Directory),
    FileServer(FileServer),
    ReplicaCatalog(ReplicaCatalog),
    Alias(String),
    Connection(Connection),
    Profile(Profile),
    NodeFs { node: Node, fs: NodeFileSystem },
    Area { area: Area, storage: StorageArea },
    Slot { visibility: Visibility, directory: LayoutDirectory },
    MountPoint(InternalMountPoint),
}

impl Frame {
    fn element(&self) -> &'static str {
        match self {
            Frame::Catalog(_) => "sitecatalog",
            Frame::Site { .. } => "site",
            Frame::Grid(_) => "grid",
            Frame::Directory(_) => "directory",
            Frame::FileServer(_) => "file-server",
            Frame::ReplicaCatalog(_) => "replica-catalog",
            Frame::Alias(_) => "alias",
            Frame::Connection(_) => "connection",
            Frame::Profile(p) if p.namespace == Namespace::Metadata => "metadata",
            Frame::Profile(_) => "profile",
            Frame::NodeFs { node: Node::Head, .. } => "head-fs",
            Frame::NodeFs { node: Node::Worker, .. } => "worker-fs",
            Frame::Area { area: Area::Scratch, .. } => "scratch",
            Frame::Area { area: Area::Storage, .. } => "storage",
            Frame::Slot { visibility: Visibility::Shared, .. } => "shared",
            Frame::Slot { visibility: Visibility::Local, .. } => "local",
            Frame::MountPoint(_) => "internal-mount-point",
        }
    }
}

/// Parse a version 3 or version 4 site catalog document.
///
/// Unknown elements and attributes are rejected with
/// [`ConfigError::UnsupportedKey`].
pub fn parse_xml(input: &str) -> ConfigResult<SiteStore> {
    let mut reader = Reader::from_str(input);

    let mut stack: Vec<Frame> = Vec::new();
    let mut result = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let frame = open(&e, stack.last())?;
                stack.push(frame);
            }
            Event::Empty(e) => {
                let frame = open(&e, stack.last())?;
                close(frame, &mut stack, &mut result)?;
            }
            Event::End(_) => {
                if let Some(frame) = stack.pop() {
                    close(frame, &mut stack, &mut result)?;
                }
            }
            // values are kept verbatim; text anywhere else is layout whitespace
            Event::Text(t) => push_text(stack.last_mut(), &t.unescape()?),
            Event::CData(t) => push_text(stack.last_mut(), &String::from_utf8_lossy(&t)),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let store = result.ok_or_else(|| ConfigError::MissingField("sitecatalog".to_string()))?;
    debug!(sites = store.len(), "parsed XML site catalog");
    Ok(store)
}

fn push_text(frame: Option<&mut Frame>, text: &str) {
    match frame {
        Some(Frame::Profile(profile)) => profile.value.push_str(text),
        Some(Frame::Connection(connection)) => connection.value.push_str(text),
        _ => {}
    }
}

pub(super) fn attributes(e: &BytesStart) -> ConfigResult<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "xmlns" || key.starts_with("xmlns:") || key.starts_with("xsi:") {
            continue;
        }
        let value = attr.unescape_value()?.into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn parse_value<T>(value: &str) -> ConfigResult<T>
where
    T: FromStr<Err = sitecat_core::Error>,
{
    Ok(value.parse()?)
}

fn parse_count(field: &str, value: &str) -> ConfigResult<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(field, format!("'{}' is not a node count", value)))
}

pub(super) fn required(field: &str, value: Option<String>) -> ConfigResult<String> {
    value.ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn accepts(parent: &Frame, child: &str) -> bool {
    match parent {
        Frame::Catalog(_) => child == "site",
        Frame::Site { .. } => matches!(
            child,
            "grid" | "directory" | "replica-catalog" | "profile" | "metadata" | "head-fs" | "worker-fs"
        ),
        Frame::Directory(_) => child == "file-server",
        Frame::FileServer(_) => child == "profile",
        Frame::ReplicaCatalog(_) => matches!(child, "alias" | "connection"),
        Frame::NodeFs { .. } => matches!(child, "scratch" | "storage" | "profile"),
        Frame::Area { .. } => matches!(child, "shared" | "local"),
        Frame::Slot { .. } => matches!(child, "file-server" | "internal-mount-point"),
        _ => false,
    }
}

/// Build the frame for a new element after checking that `parent` may contain it.
fn open(e: &BytesStart, parent: Option<&Frame>) -> ConfigResult<Frame> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let attrs = attributes(e)?;

    let Some(parent) = parent else {
        return match name.as_str() {
            "sitecatalog" => catalog_frame(attrs),
            _ => Err(ConfigError::unsupported(name, "document")),
        };
    };

    if !accepts(parent, &name) {
        return Err(ConfigError::unsupported(name, parent.element()));
    }

    match name.as_str() {
        "site" => site_frame(attrs),
        "grid" => grid_frame(attrs),
        "directory" => directory_frame(attrs),
        "file-server" => file_server_frame(attrs),
        "replica-catalog" => replica_catalog_frame(attrs),
        "alias" => alias_frame(attrs),
        "connection" => connection_frame(attrs),
        "profile" => profile_frame(attrs),
        "metadata" => metadata_frame(attrs),
        "head-fs" => no_attributes(&name, attrs, Frame::NodeFs { node: Node::Head, fs: NodeFileSystem::default() }),
        "worker-fs" => no_attributes(&name, attrs, Frame::NodeFs { node: Node::Worker, fs: NodeFileSystem::default() }),
        "scratch" => no_attributes(&name, attrs, Frame::Area { area: Area::Scratch, storage: StorageArea::default() }),
        "storage" => no_attributes(&name, attrs, Frame::Area { area: Area::Storage, storage: StorageArea::default() }),
        "shared" => no_attributes(&name, attrs, Frame::Slot { visibility: Visibility::Shared, directory: LayoutDirectory::default() }),
        "local" => no_attributes(&name, attrs, Frame::Slot { visibility: Visibility::Local, directory: LayoutDirectory::default() }),
        "internal-mount-point" => mount_point_frame(attrs),
        _ => Err(ConfigError::unsupported(name, parent.element())),
    }
}

fn no_attributes(name: &str, attrs: Vec<(String, String)>, frame: Frame) -> ConfigResult<Frame> {
    match attrs.into_iter().next() {
        Some((key, _)) => Err(ConfigError::unsupported(key, name)),
        None => Ok(frame),
    }
}

fn catalog_frame(attrs: Vec<(String, String)>) -> ConfigResult<Frame> {
    for (key, value) in attrs {
        match key.as_str() {
            "version" => debug!(version = %value, "site catalog schema version"),
            _ => return Err(ConfigError::unsupported(key, "sitecatalog")),
        }
    }
    Ok(Frame::Catalog(SiteStore::new()))
}

fn site_frame(attrs: Vec<(String, String)>) -> ConfigResult<Frame> {
    let mut site = Site::default();
    let mut handle = None;
    for (key, value) in attrs {
        match key.as_str() {
            "handle" => handle = Some(value),
            "arch" => site.sysinfo.arch = parse_value(&value)?,
            "os" => site.sysinfo.os = parse_value(&value)?,
            "osrelease" => site.sysinfo.os_release = Some(value),
            "osversion" => site.sysinfo.os_version = Some(value),
            "glibc" => site.sysinfo.glibc = Some(value),
            _ => return Err(ConfigError::unsupported(key, "site")),
        }
    }
    site.set_handle(required("site handle", handle)?);
    Ok(Frame::Site {
        site,
        layout: FileSystemLayout::default(),
    })
}

fn grid_frame(attrs: Vec<(String, String)>) -> ConfigResult<Frame> {
    let mut gateway = GridGateway::default();
    let mut contact = None;
    let mut scheduler = None;
    for (key, value) in attrs {
        match key.as_str() {
            "type" => gateway.gateway_type = parse_value(&value)?,
            "contact" => contact = Some(value),
            "scheduler" => scheduler = Some(SchedulerType::parse_lenient(&value)),
            "jobtype" => gateway.job_type = parse_value(&value)?,
            "os" => gateway.os = Some(parse_value(&value)?),
            "arch" => gateway.arch = Some(parse_value(&value)?),
            "osrelease" => gateway.os_release = Some(value),
            "osversion" => gateway.os_version = Some(value),
            "glibc" => gateway.glibc = Some(value),
            "idle-nodes" => gateway.idle_nodes = Some(parse_count(&key, &value)?),
            "total-nodes" => gateway.total_nodes = Some(parse_count(&key, &value)?),
            _ => return Err(ConfigError::unsupported(key, "grid")),
        }
    }
    gateway.contact = required("grid contact", contact)?;
    gateway.scheduler = scheduler.unwrap_or_else(|| SchedulerType::from_contact(&gateway.contact));
    Ok(Frame::Grid(gateway))
}

fn directory_frame(attrs: Vec<(String, String)>) -> ConfigResult<Frame> {
    let mut kind = None;
    let mut mount = InternalMountPoint::default();
    for (key, value) in attrs {
        match key.as_str() {
            "type" => kind = Some(parse_value::<DirectoryType>(&value)?),
            "path" => mount.mount_point = Some(value),
            "free-size" => mount.free_size = Some(value),
            "total-size" => mount.total_size = Some(value),
            _ => return Err(ConfigError::unsupported(key, "directory")),
        }
    }
    let kind = kind.ok_or_else(|| ConfigError::MissingField("directory type".to_string()))?;
    let mut directory = Directory::new(kind);
    directory.internal_mount_point = mount;
    Ok(Frame::Directory(directory))
}

/// Version 4 carries a full `url`; version 3 splits it into `url` and `mount-point`.
fn file_server_frame(attrs: Vec<(String, String)>) -> ConfigResult<Frame> {
    let mut protocol = None;
    let mut url = None;
    let mut mount_point = None;
    let mut operation = Operation::All;
    for (key, value) in attrs {
        match key.as_str() {
            "protocol" => protocol = Some(value),
            "url" => url = Some(value),
            "mount-point" => mount_point = Some(value),
            "operation" => operation = parse_value(&value)?,
            _ => return Err(ConfigError::unsupported(key, "file-server")),
        }
    }
    let url = required("file-server url", url)?;

    let server = match mount_point {
        Some(mount_point) => {
            let protocol = protocol.unwrap_or_else(|| {
                url.split_once("://")
                    .map(|(scheme, _)| scheme.to_string())
                    .unwrap_or_default()
            });
            FileServer::new(protocol, url, mount_point).with_operation(operation)
        }
        None => FileServer::from_url(&url, operation)?,
    };
    Ok(Frame::FileServer(server))
}

fn replica_catalog_frame(attrs: Vec<(String, String)>) -> ConfigResult<Frame> {
    let mut catalog_type = None;
    let mut url = None;
    for (key, value) in attrs {
        match key.as_str() {
            "type" => catalog_type = Some(value),
            "url" => url = Some(value),
            _ => return Err(ConfigError::unsupported(key, "replica-catalog")),
        }
    }
    Ok(Frame::ReplicaCatalog(ReplicaCatalog::new(
        required("replica-catalog url", url)?,
        required("replica-catalog type", catalog_type)?,
    )))
}

fn alias_frame(attrs: Vec<(String, String)>) -> ConfigResult<Frame> {
    let mut alias = None;
    for (key, value) in attrs {
        match key.as_str() {
            "name" => alias = Some(value),
            _ => return Err(ConfigError::unsupported(key, "alias")),
        }
    }
    Ok(Frame::Alias(required("alias name", alias)?))
}

fn connection_frame(attrs: Vec<(String, String)>) -> ConfigResult<Frame> {
    let mut connection_key = None;
    for (key, value) in attrs {
        match key.as_str() {
            "key" => connection_key = Some(value),
            _ => return Err(ConfigError::unsupported(key, "connection")),
        }
    }
    Ok(Frame::Connection(Connection::new(
        required("connection key", connection_key)?,
        "",
    )))
}

fn profile_frame(attrs: Vec<(String, String)>) -> ConfigResult<Frame> {
    let mut namespace = None;
    let mut profile_key = None;
    for (key, value) in attrs {
        match key.as_str() {
            "namespace" => namespace = Some(parse_value::<Namespace>(&value)?),
            "key" => profile_key = Some(value),
            _ => return Err(ConfigError::unsupported(key, "profile")),
        }
    }
    let namespace =
        namespace.ok_or_else(|| ConfigError::MissingField("profile namespace".to_string()))?;
    Ok(Frame::Profile(Profile::new(
        namespace,
        required("profile key", profile_key)?,
        "",
    )))
}

fn metadata_frame(attrs: Vec<(String, String)>) -> ConfigResult<Frame> {
    let mut metadata_key = None;
    for (key, value) in attrs {
        match key.as_str() {
            "key" => metadata_key = Some(value),
            _ => return Err(ConfigError::unsupported(key, "metadata")),
        }
    }
    Ok(Frame::Profile(Profile::new(
        Namespace::Metadata,
        required("metadata key", metadata_key)?,
        "",
    )))
}

fn mount_point_frame(attrs: Vec<(String, String)>) -> ConfigResult<Frame> {
    let mut mount = InternalMountPoint::default();
    for (key, value) in attrs {
        match key.as_str() {
            "mount-point" => mount.mount_point = Some(value),
            "free-size" => mount.free_size = Some(value),
            "total-size" => mount.total_size = Some(value),
            _ => return Err(ConfigError::unsupported(key, "internal-mount-point")),
        }
    }
    Ok(Frame::MountPoint(mount))
}

/// Attach a finished element to its parent.
fn close(frame: Frame, stack: &mut [Frame], result: &mut Option<SiteStore>) -> ConfigResult<()> {
    let parent = stack.last_mut();
    match (frame, parent) {
        (Frame::Catalog(store), None) => *result = Some(store),
        (Frame::Site { mut site, layout }, Some(Frame::Catalog(store))) => {
            apply_layout(&mut site, &layout);
            if let Some(previous) = store.add_entry(site) {
                debug!(site = %previous.handle(), "replacing earlier site with the same handle");
            }
        }
        (Frame::Grid(gateway), Some(Frame::Site { site, .. })) => {
            site.add_grid_gateway(gateway);
        }
        (Frame::Directory(directory), Some(Frame::Site { site, .. })) => {
            site.add_directory(directory)?;
        }
        (Frame::ReplicaCatalog(catalog), Some(Frame::Site { site, .. })) => {
            site.add_replica_catalog(catalog);
        }
        (Frame::Profile(profile), Some(Frame::Site { site, .. })) => site.add_profile(profile),
        (Frame::Profile(profile), Some(Frame::FileServer(server))) => server.profiles.add(profile),
        (Frame::Profile(profile), Some(Frame::NodeFs { fs, .. })) => fs.profiles.add(profile),
        (Frame::NodeFs { node, fs }, Some(Frame::Site { layout, .. })) => {
            *layout.node_mut(node) = fs;
        }
        (Frame::FileServer(server), Some(Frame::Directory(directory))) => {
            directory.add_file_server(server);
        }
        (Frame::FileServer(server), Some(Frame::Slot { directory, .. })) => {
            directory.file_servers.push(server);
        }
        (Frame::Alias(alias), Some(Frame::ReplicaCatalog(catalog))) => {
            catalog.add_alias(alias);
        }
        (Frame::Connection(connection), Some(Frame::ReplicaCatalog(catalog))) => {
            catalog.add_connection(Connection::new(connection.key, connection.value));
        }
        (Frame::Area { area, storage }, Some(Frame::NodeFs { fs, .. })) => match area {
            Area::Scratch => fs.scratch = storage,
            Area::Storage => fs.storage = storage,
        },
        (Frame::Slot { visibility, directory }, Some(Frame::Area { storage, .. })) => {
            match visibility {
                Visibility::Shared => storage.shared = Some(directory),
                Visibility::Local => storage.local = Some(directory),
            }
        }
        (Frame::MountPoint(mount), Some(Frame::Slot { directory, .. })) => {
            directory.internal_mount_point = mount;
        }
        // nesting is checked in `open`
        _ => {}
    }
    Ok(())
}
