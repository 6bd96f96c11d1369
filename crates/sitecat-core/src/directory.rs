//! Typed storage areas of a site.

use derive_more::Display;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::file_server::{FileServer, Operation};
use crate::{Error, Result};

/// Classification of a directory by visibility and role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum DirectoryType {
    #[display("shared-scratch")]
    SharedScratch,
    #[display("shared-storage")]
    SharedStorage,
    #[display("local-scratch")]
    LocalScratch,
    #[display("local-storage")]
    LocalStorage,
}

impl DirectoryType {
    pub const ALL: [DirectoryType; 4] = [
        DirectoryType::SharedScratch,
        DirectoryType::SharedStorage,
        DirectoryType::LocalScratch,
        DirectoryType::LocalStorage,
    ];

    /// Camel-case name used by YAML and JSON catalogs.
    pub fn camel_name(&self) -> &'static str {
        match self {
            DirectoryType::SharedScratch => "sharedScratch",
            DirectoryType::SharedStorage => "sharedStorage",
            DirectoryType::LocalScratch => "localScratch",
            DirectoryType::LocalStorage => "localStorage",
        }
    }
}

impl FromStr for DirectoryType {
    type Err = Error;

    /// Accepts the XML (`shared-scratch`), YAML (`sharedScratch`) and enum (`shared_scratch`) spellings.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shared-scratch" | "sharedScratch" | "shared_scratch" => Ok(Self::SharedScratch),
            "shared-storage" | "sharedStorage" | "shared_storage" => Ok(Self::SharedStorage),
            "local-scratch" | "localScratch" | "local_scratch" => Ok(Self::LocalScratch),
            "local-storage" | "localStorage" | "local_storage" => Ok(Self::LocalStorage),
            _ => Err(Error::invalid("directory type", s)),
        }
    }
}

/// Path of a directory as seen from inside the site.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InternalMountPoint {
    pub mount_point: Option<String>,
    pub total_size: Option<String>,
    pub free_size: Option<String>,
}

impl InternalMountPoint {
    pub fn new(mount_point: impl Into<String>) -> Self {
        Self {
            mount_point: Some(mount_point.into()),
            ..Self::default()
        }
    }

    pub fn with_sizes(
        mount_point: impl Into<String>,
        free_size: impl Into<String>,
        total_size: impl Into<String>,
    ) -> Self {
        Self {
            mount_point: Some(mount_point.into()),
            total_size: Some(total_size.into()),
            free_size: Some(free_size.into()),
        }
    }

    pub fn is_set(&self) -> bool {
        self.mount_point.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub kind: DirectoryType,
    pub internal_mount_point: InternalMountPoint,
    pub shared_file_system: bool,
    file_servers: BTreeMap<Operation, Vec<FileServer>>,
}

impl Directory {
    pub fn new(kind: DirectoryType) -> Self {
        Self {
            kind,
            internal_mount_point: InternalMountPoint::default(),
            shared_file_system: false,
            file_servers: BTreeMap::new(),
        }
    }

    pub fn with_path(kind: DirectoryType, path: impl Into<String>) -> Self {
        let mut dir = Self::new(kind);
        dir.internal_mount_point = InternalMountPoint::new(path);
        dir
    }

    /// File servers are grouped by the operation they declare.
    pub fn add_file_server(&mut self, server: FileServer) {
        self.file_servers
            .entry(server.operation)
            .or_default()
            .push(server);
    }

    /// Remove every server whose full URL is `url`. Returns whether any was removed.
    pub fn remove_file_server(&mut self, url: &str) -> bool {
        let before = self.file_server_count();
        for servers in self.file_servers.values_mut() {
            servers.retain(|server| server.url() != url);
        }
        self.file_servers.retain(|_, servers| !servers.is_empty());
        self.file_server_count() != before
    }

    pub fn file_servers(&self, operation: Operation) -> &[FileServer] {
        self.file_servers
            .get(&operation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All file servers, `all` first, then `get`, then `put`.
    pub fn all_file_servers(&self) -> impl Iterator<Item = &FileServer> {
        self.file_servers.values().flatten()
    }

    pub fn file_server_count(&self) -> usize {
        self.file_servers.values().map(Vec::len).sum()
    }

    pub fn has_file_servers(&self) -> bool {
        self.file_server_count() > 0
    }

    /// Pick a server for `operation`, falling back to one registered for `all`.
    pub fn select_file_server(&self, operation: Operation) -> Option<&FileServer> {
        self.file_servers(operation)
            .first()
            .or_else(|| self.file_servers(Operation::All).first())
    }

    pub fn mount_point(&self) -> Option<&str> {
        self.internal_mount_point.mount_point.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_file_servers() && !self.internal_mount_point.is_set()
    }
}
