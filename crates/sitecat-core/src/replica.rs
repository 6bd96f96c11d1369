//! Replica catalog references attached to a site.

use std::collections::BTreeSet;

/// A connection parameter passed to the replica catalog implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub key: String,
    pub value: String,
}

impl Connection {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaCatalog {
    pub url: String,
    pub catalog_type: String,
    pub aliases: BTreeSet<String>,
    pub connections: Vec<Connection>,
}

impl ReplicaCatalog {
    pub fn new(url: impl Into<String>, catalog_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            catalog_type: catalog_type.into(),
            aliases: BTreeSet::new(),
            connections: Vec::new(),
        }
    }

    pub fn add_alias(&mut self, alias: impl Into<String>) -> bool {
        self.aliases.insert(alias.into())
    }

    pub fn add_connection(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    pub fn connection(&self, key: &str) -> Option<&str> {
        self.connections
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }
}
