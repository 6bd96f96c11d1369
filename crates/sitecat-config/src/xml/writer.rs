use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use sitecat_core::adapter::site_layout;
use sitecat_core::layout::{LayoutDirectory, NodeFileSystem, StorageArea};
use sitecat_core::{Directory, FileServer, GridGateway, Profile, Profiles, ReplicaCatalog, Site, SiteStore};

use super::{SITECATALOG_NAMESPACE, XSI_NAMESPACE, XmlSchema};
use crate::ConfigResult;

type XmlWriter = Writer<Vec<u8>>;

/// Serialize every site of `store` as a site catalog document.
pub fn write_xml(store: &SiteStore, schema: XmlSchema) -> ConfigResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let location = format!("{} {}", SITECATALOG_NAMESPACE, schema.schema_location());
    let root = BytesStart::new("sitecatalog").with_attributes([
        ("xmlns", SITECATALOG_NAMESPACE),
        ("xmlns:xsi", XSI_NAMESPACE),
        ("xsi:schemaLocation", location.as_str()),
        ("version", schema.version()),
    ]);
    writer.write_event(Event::Start(root))?;
    for site in store.entries() {
        write_site(&mut writer, site, schema)?;
    }
    end(&mut writer, "sitecatalog")?;

    let mut xml = String::from_utf8(writer.into_inner())?;
    xml.push('\n');
    Ok(xml)
}

fn end(writer: &mut XmlWriter, name: &str) -> ConfigResult<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn push_optional(element: &mut BytesStart, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        element.push_attribute((key, value));
    }
}

fn write_site(writer: &mut XmlWriter, site: &Site, schema: XmlSchema) -> ConfigResult<()> {
    let arch = site.arch().to_string();
    let os = site.os().to_string();
    let mut element = BytesStart::new("site");
    element.push_attribute(("handle", site.handle()));
    element.push_attribute(("arch", arch.as_str()));
    element.push_attribute(("os", os.as_str()));
    push_optional(&mut element, "osrelease", site.sysinfo.os_release.as_deref());
    push_optional(&mut element, "osversion", site.sysinfo.os_version.as_deref());
    push_optional(&mut element, "glibc", site.sysinfo.glibc.as_deref());
    writer.write_event(Event::Start(element))?;

    for gateway in site.grid_gateways() {
        write_grid(writer, gateway)?;
    }

    match schema {
        XmlSchema::V4 => {
            for directory in site.directories() {
                write_directory(writer, directory)?;
            }
        }
        XmlSchema::V3 => {
            let layout = site_layout(site);
            write_node_fs(writer, "head-fs", &layout.head)?;
            write_node_fs(writer, "worker-fs", &layout.worker)?;
        }
    }

    for catalog in site.replica_catalogs() {
        write_replica_catalog(writer, catalog)?;
    }
    write_profiles(writer, site.profiles())?;
    end(writer, "site")
}

fn write_grid(writer: &mut XmlWriter, gateway: &GridGateway) -> ConfigResult<()> {
    let gateway_type = gateway.gateway_type.to_string();
    let scheduler = gateway.scheduler.to_string();
    let job_type = gateway.job_type.to_string();
    let os = gateway.os.map(|o| o.to_string());
    let arch = gateway.arch.map(|a| a.to_string());
    let idle = gateway.idle_nodes.map(|n| n.to_string());
    let total = gateway.total_nodes.map(|n| n.to_string());

    let mut element = BytesStart::new("grid");
    element.push_attribute(("type", gateway_type.as_str()));
    element.push_attribute(("contact", gateway.contact.as_str()));
    element.push_attribute(("scheduler", scheduler.as_str()));
    element.push_attribute(("jobtype", job_type.as_str()));
    push_optional(&mut element, "os", os.as_deref());
    push_optional(&mut element, "arch", arch.as_deref());
    push_optional(&mut element, "osrelease", gateway.os_release.as_deref());
    push_optional(&mut element, "osversion", gateway.os_version.as_deref());
    push_optional(&mut element, "glibc", gateway.glibc.as_deref());
    push_optional(&mut element, "idle-nodes", idle.as_deref());
    push_optional(&mut element, "total-nodes", total.as_deref());
    writer.write_event(Event::Empty(element))?;
    Ok(())
}

fn write_directory(writer: &mut XmlWriter, directory: &Directory) -> ConfigResult<()> {
    let kind = directory.kind.to_string();
    let mount = &directory.internal_mount_point;
    let mut element = BytesStart::new("directory");
    element.push_attribute(("type", kind.as_str()));
    push_optional(&mut element, "path", mount.mount_point.as_deref());
    push_optional(&mut element, "free-size", mount.free_size.as_deref());
    push_optional(&mut element, "total-size", mount.total_size.as_deref());

    if !directory.has_file_servers() {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    }
    writer.write_event(Event::Start(element))?;
    for server in directory.all_file_servers() {
        let operation = server.operation.to_string();
        let url = server.url();
        let element = BytesStart::new("file-server")
            .with_attributes([("operation", operation.as_str()), ("url", url.as_str())]);
        write_with_profiles(writer, element, "file-server", &server.profiles)?;
    }
    end(writer, "directory")
}

fn write_with_profiles(
    writer: &mut XmlWriter,
    element: BytesStart,
    name: &str,
    profiles: &Profiles,
) -> ConfigResult<()> {
    if profiles.is_empty() {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    }
    writer.write_event(Event::Start(element))?;
    write_profiles(writer, profiles)?;
    end(writer, name)
}

fn write_node_fs(writer: &mut XmlWriter, name: &str, fs: &NodeFileSystem) -> ConfigResult<()> {
    if fs.is_empty() {
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    write_area(writer, "scratch", &fs.scratch)?;
    write_area(writer, "storage", &fs.storage)?;
    write_profiles(writer, &fs.profiles)?;
    end(writer, name)
}

fn write_area(writer: &mut XmlWriter, name: &str, area: &StorageArea) -> ConfigResult<()> {
    if area.is_empty() {
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    if let Some(shared) = &area.shared {
        write_layout_directory(writer, "shared", shared)?;
    }
    if let Some(local) = &area.local {
        write_layout_directory(writer, "local", local)?;
    }
    end(writer, name)
}

fn write_layout_directory(
    writer: &mut XmlWriter,
    name: &str,
    directory: &LayoutDirectory,
) -> ConfigResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    for server in &directory.file_servers {
        write_v3_file_server(writer, server)?;
    }
    let mount = &directory.internal_mount_point;
    let mut element = BytesStart::new("internal-mount-point");
    push_optional(&mut element, "mount-point", mount.mount_point.as_deref());
    push_optional(&mut element, "free-size", mount.free_size.as_deref());
    push_optional(&mut element, "total-size", mount.total_size.as_deref());
    writer.write_event(Event::Empty(element))?;
    end(writer, name)
}

fn write_v3_file_server(writer: &mut XmlWriter, server: &FileServer) -> ConfigResult<()> {
    let element = BytesStart::new("file-server").with_attributes([
        ("protocol", server.protocol.as_str()),
        ("url", server.url_prefix.as_str()),
        ("mount-point", server.mount_point.as_str()),
    ]);
    write_with_profiles(writer, element, "file-server", &server.profiles)
}

fn write_replica_catalog(writer: &mut XmlWriter, catalog: &ReplicaCatalog) -> ConfigResult<()> {
    let element = BytesStart::new("replica-catalog").with_attributes([
        ("type", catalog.catalog_type.as_str()),
        ("url", catalog.url.as_str()),
    ]);
    if catalog.aliases.is_empty() && catalog.connections.is_empty() {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    }
    writer.write_event(Event::Start(element))?;
    for alias in &catalog.aliases {
        let element = BytesStart::new("alias").with_attributes([("name", alias.as_str())]);
        writer.write_event(Event::Empty(element))?;
    }
    for connection in &catalog.connections {
        let element =
            BytesStart::new("connection").with_attributes([("key", connection.key.as_str())]);
        writer.write_event(Event::Start(element))?;
        writer.write_event(Event::Text(BytesText::new(&connection.value)))?;
        end(writer, "connection")?;
    }
    end(writer, "replica-catalog")
}

fn write_profiles(writer: &mut XmlWriter, profiles: &Profiles) -> ConfigResult<()> {
    for profile in profiles.iter() {
        write_profile(writer, &profile)?;
    }
    Ok(())
}

fn write_profile(writer: &mut XmlWriter, profile: &Profile) -> ConfigResult<()> {
    let namespace = profile.namespace.to_string();
    let element = BytesStart::new("profile").with_attributes([
        ("namespace", namespace.as_str()),
        ("key", profile.key.as_str()),
    ]);
    writer.write_event(Event::Start(element))?;
    writer.write_event(Event::Text(BytesText::new(&profile.value)))?;
    end(writer, "profile")
}
