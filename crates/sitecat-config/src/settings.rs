//! The `sitecat.kdl` settings file.
//!
//! ```kdl
//! catalog {
//!     path "sites.yml"
//!     sites "local" "condorpool"
//!     schema "4.0"
//!     expand-variables #true
//!     variables {
//!         SCRATCH_ROOT "/lustre"
//!     }
//! }
//! vors host="vors.grid.iu.edu" port=80 vo="ligo" grid="osg" timeout-secs=30
//! osgmm collector="ligo-osgmm.renci.org" vo="ligo" grid="osg" validated-only=#true
//! ```

use kdl::{KdlDocument, KdlNode};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::xml::XmlSchema;
use crate::{ConfigError, ConfigResult};

/// Handle selecting every site.
pub const ALL_SITES: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    /// Catalog file to load when none is given on the command line.
    pub path: Option<PathBuf>,
    /// Handles to keep; `*` keeps all.
    pub sites: Vec<String>,
    /// Schema used when writing XML.
    pub schema: XmlSchema,
    pub expand_variables: bool,
    /// Values for `${NAME}` references, consulted before the process environment.
    pub variables: HashMap<String, String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            path: None,
            sites: vec![ALL_SITES.to_string()],
            schema: XmlSchema::default(),
            expand_variables: true,
            variables: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VorsSettings {
    pub host: String,
    pub port: u16,
    pub vo: String,
    pub grid: String,
    pub timeout: Duration,
}

impl Default for VorsSettings {
    fn default() -> Self {
        Self {
            host: "vors.grid.iu.edu".to_string(),
            port: 80,
            vo: "ligo".to_string(),
            grid: "osg".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsgmmSettings {
    /// Condor collector to query; chosen from the VO when unset.
    pub collector: Option<String>,
    pub vo: String,
    pub grid: String,
    /// Only list sites the matchmaker has verified.
    pub validated_only: bool,
}

impl Default for OsgmmSettings {
    fn default() -> Self {
        Self {
            collector: None,
            vo: "ligo".to_string(),
            grid: "osg".to_string(),
            validated_only: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub catalog: CatalogSettings,
    pub vors: VorsSettings,
    pub osgmm: OsgmmSettings,
}

impl Settings {
    pub fn load(path: &std::path::Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        parse_settings(&text)
    }
}

/// Parse settings from KDL text. Missing nodes keep their defaults.
pub fn parse_settings(kdl: &str) -> ConfigResult<Settings> {
    let doc: KdlDocument = kdl.parse()?;
    let mut settings = Settings::default();

    for node in doc.nodes() {
        match node.name().value() {
            "catalog" => parse_catalog(node, &mut settings.catalog)?,
            "vors" => parse_vors(node, &mut settings.vors)?,
            "osgmm" => parse_osgmm(node, &mut settings.osgmm)?,
            other => return Err(ConfigError::unsupported(other, "settings")),
        }
    }

    Ok(settings)
}

fn parse_catalog(node: &KdlNode, catalog: &mut CatalogSettings) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        match child.name().value() {
            "path" => {
                let path = get_first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("catalog path".to_string()))?;
                catalog.path = Some(PathBuf::from(path));
            }
            "sites" => {
                let sites = get_all_string_args(child);
                if sites.is_empty() {
                    return Err(ConfigError::MissingField("catalog sites".to_string()));
                }
                catalog.sites = sites;
            }
            "schema" => {
                let schema = get_first_string_arg(child)
                    .ok_or_else(|| ConfigError::MissingField("catalog schema".to_string()))?;
                catalog.schema = schema.parse()?;
            }
            "expand-variables" => {
                catalog.expand_variables = get_first_bool_arg(child).ok_or_else(|| {
                    ConfigError::invalid("expand-variables", "expected #true or #false")
                })?;
            }
            "variables" => {
                if let Some(vars) = child.children() {
                    for var in vars.nodes() {
                        let name = var.name().value().to_string();
                        let value = get_first_string_arg(var).ok_or_else(|| {
                            ConfigError::invalid(format!("variables.{}", name), "expected a string")
                        })?;
                        catalog.variables.insert(name, value);
                    }
                }
            }
            other => return Err(ConfigError::unsupported(other, "catalog")),
        }
    }
    Ok(())
}

fn parse_vors(node: &KdlNode, vors: &mut VorsSettings) -> ConfigResult<()> {
    for entry in node.entries() {
        let Some(name) = entry.name() else {
            return Err(ConfigError::invalid("vors", "expected key=value properties"));
        };
        let key = name.value();
        match key {
            "host" => vors.host = get_string_prop(node, key)?,
            "vo" => vors.vo = get_string_prop(node, key)?,
            "grid" => vors.grid = get_string_prop(node, key)?,
            "port" => {
                let port = get_integer_prop(node, key)?;
                vors.port = u16::try_from(port)
                    .map_err(|_| ConfigError::invalid("vors port", format!("{} is out of range", port)))?;
            }
            "timeout-secs" => {
                let secs = get_integer_prop(node, key)?;
                let secs = u64::try_from(secs).map_err(|_| {
                    ConfigError::invalid("vors timeout-secs", format!("{} is negative", secs))
                })?;
                vors.timeout = Duration::from_secs(secs);
            }
            other => return Err(ConfigError::unsupported(other, "vors")),
        }
    }
    Ok(())
}

fn parse_osgmm(node: &KdlNode, osgmm: &mut OsgmmSettings) -> ConfigResult<()> {
    for entry in node.entries() {
        let Some(name) = entry.name() else {
            return Err(ConfigError::invalid("osgmm", "expected key=value properties"));
        };
        let key = name.value();
        match key {
            "collector" => osgmm.collector = Some(get_string_prop(node, key)?),
            // VO names are matched in lower case
            "vo" => osgmm.vo = get_string_prop(node, key)?.to_lowercase(),
            "grid" => osgmm.grid = get_string_prop(node, key)?,
            "validated-only" => osgmm.validated_only = get_bool_prop(node, key)?,
            other => return Err(ConfigError::unsupported(other, "osgmm")),
        }
    }
    Ok(())
}

// Helpers for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

fn prop_field(node: &KdlNode, name: &str) -> String {
    format!("{} {}", node.name().value(), name)
}

fn get_string_prop(node: &KdlNode, name: &str) -> ConfigResult<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
        .ok_or_else(|| ConfigError::invalid(prop_field(node, name), "expected a string"))
}

fn get_integer_prop(node: &KdlNode, name: &str) -> ConfigResult<i128> {
    node.get(name)
        .and_then(|v| v.as_integer())
        .ok_or_else(|| ConfigError::invalid(prop_field(node, name), "expected an integer"))
}

fn get_bool_prop(node: &KdlNode, name: &str) -> ConfigResult<bool> {
    node.get(name)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| ConfigError::invalid(prop_field(node, name), "expected #true or #false"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_settings() {
        let kdl = r#"
catalog {
    path "sites.yml"
    sites "local" "condorpool"
    schema "3.0"
    expand-variables #false
    variables {
        SCRATCH_ROOT "/lustre"
    }
}
vors host="vors.example.org" port=8080 vo="engage" grid="osg-itb" timeout-secs=5
"#;
        let settings = parse_settings(kdl).unwrap();
        assert_eq!(settings.catalog.path, Some(PathBuf::from("sites.yml")));
        assert_eq!(settings.catalog.sites, vec!["local", "condorpool"]);
        assert_eq!(settings.catalog.schema, XmlSchema::V3);
        assert!(!settings.catalog.expand_variables);
        assert_eq!(
            settings.catalog.variables.get("SCRATCH_ROOT").map(String::as_str),
            Some("/lustre")
        );
        assert_eq!(settings.vors.host, "vors.example.org");
        assert_eq!(settings.vors.port, 8080);
        assert_eq!(settings.vors.vo, "engage");
        assert_eq!(settings.vors.grid, "osg-itb");
        assert_eq!(settings.vors.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_defaults() {
        let settings = parse_settings("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.catalog.sites, vec![ALL_SITES]);
        assert_eq!(settings.catalog.schema, XmlSchema::V4);
        assert_eq!(settings.vors.port, 80);
    }

    #[test]
    fn test_partial_vors() {
        let settings = parse_settings(r#"vors vo="engage""#).unwrap();
        assert_eq!(settings.vors.vo, "engage");
        assert_eq!(settings.vors.host, "vors.grid.iu.edu");
    }

    #[test]
    fn test_osgmm_settings() {
        let settings = parse_settings(
            r#"osgmm collector="engage-central.renci.org" vo="Engage" validated-only=#false"#,
        )
        .unwrap();
        assert_eq!(settings.osgmm.collector.as_deref(), Some("engage-central.renci.org"));
        assert_eq!(settings.osgmm.vo, "engage");
        assert_eq!(settings.osgmm.grid, "osg");
        assert!(!settings.osgmm.validated_only);

        let defaults = parse_settings("").unwrap().osgmm;
        assert!(defaults.collector.is_none());
        assert!(defaults.validated_only);

        assert!(matches!(
            parse_settings(r#"osgmm validated-only="yes""#),
            Err(ConfigError::InvalidValue { field, .. }) if field == "osgmm validated-only"
        ));
    }

    #[test]
    fn test_bad_port() {
        let result = parse_settings("vors port=70000");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_unknown_node() {
        let result = parse_settings("planner { }");
        assert!(matches!(result, Err(ConfigError::UnsupportedKey { .. })));
    }

    #[test]
    fn test_bad_schema() {
        let result = parse_settings(r#"catalog { schema "2.0" }"#);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_kdl() {
        let result = parse_settings("catalog {");
        assert!(matches!(result, Err(ConfigError::Kdl(_))));
    }
}
