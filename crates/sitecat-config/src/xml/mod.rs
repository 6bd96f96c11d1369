//! XML site catalogs.
//!
//! Version 4 documents list typed `<directory>` elements per site. Version 3
//! documents describe the same storage with `<head-fs>` and `<worker-fs>`
//! blocks, which are mapped onto directory types on read and write.
//! Version 2 documents are read into the legacy pool config model.

mod legacy;
mod reader;
mod writer;

use derive_more::Display;
use std::str::FromStr;

use crate::{ConfigError, ConfigResult};

pub use legacy::{POOL_SCHEMA_LOCATION, is_pool_xml, parse_pool_xml};
pub use reader::parse_xml;
pub use writer::write_xml;

pub const SITECATALOG_NAMESPACE: &str = "http://pegasus.isi.edu/schema/sitecatalog";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum XmlSchema {
    #[display("3.0")]
    V3,
    #[default]
    #[display("4.0")]
    V4,
}

impl XmlSchema {
    pub fn version(&self) -> &'static str {
        match self {
            XmlSchema::V3 => "3.0",
            XmlSchema::V4 => "4.0",
        }
    }

    pub fn schema_location(&self) -> &'static str {
        match self {
            XmlSchema::V3 => "http://pegasus.isi.edu/schema/sc-3.0.xsd",
            XmlSchema::V4 => "http://pegasus.isi.edu/schema/sc-4.0.xsd",
        }
    }
}

impl FromStr for XmlSchema {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s {
            "3" | "3.0" => Ok(XmlSchema::V3),
            "4" | "4.0" => Ok(XmlSchema::V4),
            _ => Err(ConfigError::invalid(
                "schema",
                format!("unsupported site catalog schema version '{}'", s),
            )),
        }
    }
}
