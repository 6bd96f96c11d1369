//! Head-node / worker-node filesystem layout of the version 3 schema.
//!
//! Each node filesystem has a scratch and a storage area, and each area may
//! declare a shared and a local directory. The flat model addresses the same
//! directories by [`DirectoryType`](crate::DirectoryType); see
//! [`adapter`](crate::adapter) for the mapping.

use derive_more::Display;

use crate::directory::InternalMountPoint;
use crate::file_server::FileServer;
use crate::profile::Profiles;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Node {
    #[display("head")]
    Head,
    #[display("worker")]
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Area {
    #[display("scratch")]
    Scratch,
    #[display("storage")]
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Visibility {
    #[display("shared")]
    Shared,
    #[display("local")]
    Local,
}

/// Address of one directory inside a [`FileSystemLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{node}-{area}-{visibility}")]
pub struct LayoutSlot {
    pub node: Node,
    pub area: Area,
    pub visibility: Visibility,
}

impl LayoutSlot {
    pub const fn new(node: Node, area: Area, visibility: Visibility) -> Self {
        Self {
            node,
            area,
            visibility,
        }
    }

    pub fn all() -> impl Iterator<Item = LayoutSlot> {
        [Node::Head, Node::Worker].into_iter().flat_map(|node| {
            [Area::Scratch, Area::Storage].into_iter().flat_map(move |area| {
                [Visibility::Shared, Visibility::Local]
                    .into_iter()
                    .map(move |visibility| LayoutSlot::new(node, area, visibility))
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LayoutDirectory {
    pub file_servers: Vec<FileServer>,
    pub internal_mount_point: InternalMountPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageArea {
    pub shared: Option<LayoutDirectory>,
    pub local: Option<LayoutDirectory>,
}

impl StorageArea {
    fn get(&self, visibility: Visibility) -> Option<&LayoutDirectory> {
        match visibility {
            Visibility::Shared => self.shared.as_ref(),
            Visibility::Local => self.local.as_ref(),
        }
    }

    fn slot_mut(&mut self, visibility: Visibility) -> &mut Option<LayoutDirectory> {
        match visibility {
            Visibility::Shared => &mut self.shared,
            Visibility::Local => &mut self.local,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_none() && self.local.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeFileSystem {
    pub scratch: StorageArea,
    pub storage: StorageArea,
    pub profiles: Profiles,
}

impl NodeFileSystem {
    pub fn area(&self, area: Area) -> &StorageArea {
        match area {
            Area::Scratch => &self.scratch,
            Area::Storage => &self.storage,
        }
    }

    fn area_mut(&mut self, area: Area) -> &mut StorageArea {
        match area {
            Area::Scratch => &mut self.scratch,
            Area::Storage => &mut self.storage,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scratch.is_empty() && self.storage.is_empty() && self.profiles.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileSystemLayout {
    pub head: NodeFileSystem,
    pub worker: NodeFileSystem,
}

impl FileSystemLayout {
    pub fn node(&self, node: Node) -> &NodeFileSystem {
        match node {
            Node::Head => &self.head,
            Node::Worker => &self.worker,
        }
    }

    pub fn node_mut(&mut self, node: Node) -> &mut NodeFileSystem {
        match node {
            Node::Head => &mut self.head,
            Node::Worker => &mut self.worker,
        }
    }

    pub fn get(&self, slot: LayoutSlot) -> Option<&LayoutDirectory> {
        self.node(slot.node).area(slot.area).get(slot.visibility)
    }

    pub fn set(&mut self, slot: LayoutSlot, directory: LayoutDirectory) -> Option<LayoutDirectory> {
        self.node_mut(slot.node)
            .area_mut(slot.area)
            .slot_mut(slot.visibility)
            .replace(directory)
    }

    /// Occupied slots in head/worker, scratch/storage, shared/local order.
    pub fn occupied(&self) -> impl Iterator<Item = (LayoutSlot, &LayoutDirectory)> {
        LayoutSlot::all().filter_map(|slot| self.get(slot).map(|d| (slot, d)))
    }
}
