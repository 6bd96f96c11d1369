//! Error types for the site model.

use thiserror::Error;

use crate::directory::DirectoryType;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to add {directory_type} directory for site {site}: one already exists")]
    DuplicateDirectoryType {
        site: String,
        directory_type: DirectoryType,
    },

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

impl Error {
    pub(crate) fn invalid(field: &str, value: &str) -> Self {
        Error::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
