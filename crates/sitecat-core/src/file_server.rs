//! Network endpoints serving a directory.

use derive_more::Display;
use std::str::FromStr;
use url::Url;

use crate::profile::Profiles;
use crate::{Error, Result};

/// Operations a file server supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum Operation {
    #[display("all")]
    All,
    #[display("get")]
    Get,
    #[display("put")]
    Put,
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "get" => Ok(Self::Get),
            "put" => Ok(Self::Put),
            _ => Err(Error::invalid("operation", s)),
        }
    }
}

/// A file server, e.g. `gsiftp://smarty.isi.edu` serving `/lustre`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileServer {
    pub protocol: String,
    /// Scheme and authority, e.g. `gsiftp://smarty.isi.edu`.
    pub url_prefix: String,
    pub mount_point: String,
    pub operation: Operation,
    pub profiles: Profiles,
}

impl FileServer {
    pub fn new(
        protocol: impl Into<String>,
        url_prefix: impl Into<String>,
        mount_point: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            url_prefix: url_prefix.into(),
            mount_point: mount_point.into(),
            operation: Operation::All,
            profiles: Profiles::new(),
        }
    }

    /// Split a full URL into protocol, prefix and mount point.
    pub fn from_url(full_url: &str, operation: Operation) -> Result<Self> {
        let parsed = Url::parse(full_url).map_err(|_| Error::invalid("file server url", full_url))?;

        let mut prefix = format!("{}://", parsed.scheme());
        if let Some(host) = parsed.host_str() {
            prefix.push_str(host);
        }
        if let Some(port) = parsed.port() {
            prefix.push_str(&format!(":{}", port));
        }

        // keep the caller's spelling of the path when the prefix matches verbatim
        let mount_point = match full_url.strip_prefix(prefix.as_str()) {
            Some(rest) if rest.is_empty() => "/".to_string(),
            Some(rest) => rest.to_string(),
            None => parsed.path().to_string(),
        };

        Ok(Self {
            protocol: parsed.scheme().to_string(),
            url_prefix: prefix,
            mount_point,
            operation,
            profiles: Profiles::new(),
        })
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    /// Prefix followed by mount point.
    pub fn url(&self) -> String {
        format!("{}{}", self.url_prefix, self.mount_point)
    }
}
