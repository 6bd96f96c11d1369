//! Readers and writers for site catalogs.
//!
//! This crate handles:
//! - The legacy brace-delimited pool config format (scanner, parser, writer)
//! - XML catalogs in the version 3 and version 4 schemas, and version 2 on read
//! - YAML and JSON catalogs with reserved-key validation
//! - `${NAME}` variable expansion
//! - The KDL settings file

pub mod catalog;
pub mod error;
pub mod expansion;
pub mod pool;
pub mod scanner;
pub mod settings;
pub mod structured;
pub mod xml;

pub use catalog::{CatalogFormat, load_catalog, parse_catalog, write_catalog};
pub use error::{ConfigError, ConfigResult};
pub use expansion::expand_variables;
pub use pool::{parse_pool_config, write_pool_config};
pub use settings::{CatalogSettings, OsgmmSettings, Settings, VorsSettings, parse_settings};
pub use xml::{XmlSchema, is_pool_xml, parse_pool_xml, parse_xml, write_xml};
