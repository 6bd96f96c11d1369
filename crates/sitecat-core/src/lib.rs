//! Core data model for the site catalog.
//!
//! This crate contains:
//! - System information (architecture, OS) and the legacy VDS sysinfo form
//! - Profiles, file servers, directories, grid gateways and replica catalogs
//! - The site entry and the in-memory site store
//! - The legacy pool-config model and the head/worker filesystem layout
//! - Adapters between the schema generations

pub mod adapter;
pub mod directory;
pub mod error;
pub mod file_server;
pub mod grid;
pub mod layout;
pub mod legacy;
pub mod profile;
pub mod replica;
pub mod site;
pub mod store;
pub mod sysinfo;

pub use directory::{Directory, DirectoryType, InternalMountPoint};
pub use error::{Error, Result};
pub use file_server::{FileServer, Operation};
pub use grid::{GatewayType, GridGateway, JobType, SchedulerType};
pub use profile::{Namespace, Profile, Profiles};
pub use replica::{Connection, ReplicaCatalog};
pub use site::Site;
pub use store::SiteStore;
pub use sysinfo::{Architecture, Os, SysInfo};
