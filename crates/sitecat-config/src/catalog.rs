//! Loading and writing catalogs in any supported format.

use derive_more::Display;
use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use sitecat_core::SiteStore;
use sitecat_core::adapter::{pool_config_to_store, store_to_pool_config};

use crate::expansion::expand_variables;
use crate::pool::{parse_pool_config, write_pool_config};
use crate::settings::CatalogSettings;
use crate::structured::{parse_json, parse_yaml, write_json, write_yaml};
use crate::xml::{XmlSchema, is_pool_xml, parse_pool_xml, parse_xml, write_xml};
use crate::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CatalogFormat {
    #[display("xml")]
    Xml,
    #[display("yaml")]
    Yaml,
    #[display("json")]
    Json,
    /// The legacy brace-delimited text format.
    #[display("pool")]
    PoolConfig,
}

impl CatalogFormat {
    /// Format implied by the file extension; anything unrecognised is a pool config.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("xml") => CatalogFormat::Xml,
            Some("yml" | "yaml") => CatalogFormat::Yaml,
            Some("json") => CatalogFormat::Json,
            _ => CatalogFormat::PoolConfig,
        }
    }
}

impl FromStr for CatalogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(CatalogFormat::Xml),
            "yaml" | "yml" => Ok(CatalogFormat::Yaml),
            "json" => Ok(CatalogFormat::Json),
            "pool" | "text" => Ok(CatalogFormat::PoolConfig),
            _ => Err(ConfigError::invalid(
                "format",
                format!("unknown catalog format '{}'", s),
            )),
        }
    }
}

/// Parse catalog text, expanding variables and keeping only the selected sites.
///
/// Variable expansion applies to XML, YAML and JSON input only. XML input
/// declaring schema version 2 is read as a pool config.
pub fn parse_catalog(
    input: &str,
    format: CatalogFormat,
    settings: &CatalogSettings,
) -> ConfigResult<SiteStore> {
    let text = if settings.expand_variables && format != CatalogFormat::PoolConfig {
        Cow::Owned(expand_variables(input, &settings.variables))
    } else {
        Cow::Borrowed(input)
    };

    let mut store = match format {
        CatalogFormat::Xml if is_pool_xml(&text)? => {
            debug!("reading version 2 XML through the pool config model");
            pool_config_to_store(&parse_pool_xml(&text)?)
        }
        CatalogFormat::Xml => parse_xml(&text)?,
        CatalogFormat::Yaml => parse_yaml(&text)?,
        CatalogFormat::Json => parse_json(&text)?,
        CatalogFormat::PoolConfig => pool_config_to_store(&parse_pool_config(&text)?),
    };

    let before = store.len();
    store.retain_handles(settings.sites.as_slice());
    debug!(
        format = %format,
        parsed = before,
        selected = store.len(),
        "applied site selection"
    );
    Ok(store)
}

pub fn load_catalog(path: &Path, settings: &CatalogSettings) -> ConfigResult<SiteStore> {
    let format = CatalogFormat::from_path(path);
    let text = std::fs::read_to_string(path)?;
    let store = parse_catalog(&text, format, settings)?;
    info!(path = %path.display(), format = %format, sites = store.len(), "loaded site catalog");
    Ok(store)
}

/// Serialize `store`; `schema` applies to XML output only.
pub fn write_catalog(
    store: &SiteStore,
    format: CatalogFormat,
    schema: XmlSchema,
) -> ConfigResult<String> {
    match format {
        CatalogFormat::Xml => write_xml(store, schema),
        CatalogFormat::Yaml => write_yaml(store),
        CatalogFormat::Json => write_json(store),
        CatalogFormat::PoolConfig => write_pool_config(&store_to_pool_config(store)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitecat_core::{DirectoryType, JobType};
    use std::collections::HashMap;

    const POOL: &str = r#"
pool local {
    workdir "/tmp";
    gridftp "gsiftp://localhost/storage" "4.0.5";
    universe transfer "localhost/jobmanager-fork" "4.0.5";
    universe vanilla "localhost/jobmanager-condor" "4.0.5";
}
pool isi {
    workdir "/scratch";
}
"#;

    #[test]
    fn test_format_from_path() {
        assert_eq!(CatalogFormat::from_path(Path::new("sites.xml")), CatalogFormat::Xml);
        assert_eq!(CatalogFormat::from_path(Path::new("sites.YML")), CatalogFormat::Yaml);
        assert_eq!(CatalogFormat::from_path(Path::new("a/sites.json")), CatalogFormat::Json);
        assert_eq!(CatalogFormat::from_path(Path::new("sites.txt")), CatalogFormat::PoolConfig);
        assert_eq!(CatalogFormat::from_path(Path::new("pool.config")), CatalogFormat::PoolConfig);
    }

    #[test]
    fn test_parse_pool_into_sites() {
        let store = parse_catalog(POOL, CatalogFormat::PoolConfig, &CatalogSettings::default()).unwrap();
        assert_eq!(store.list().collect::<Vec<_>>(), vec!["isi", "local"]);

        let local = store.lookup("local").unwrap();
        assert_eq!(local.work_directory_mount_point(), Some("/tmp"));
        assert!(local.directory(DirectoryType::SharedStorage).is_some());
        assert_eq!(
            local.grid_gateway(JobType::Compute).unwrap().contact,
            "localhost/jobmanager-condor"
        );
    }

    #[test]
    fn test_site_selection() {
        let settings = CatalogSettings {
            sites: vec!["isi".to_string()],
            ..CatalogSettings::default()
        };
        let store = parse_catalog(POOL, CatalogFormat::PoolConfig, &settings).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains("isi"));
    }

    #[test]
    fn test_expansion_before_parse() {
        let yaml = "sites:\n  - name: ${SITE}\n    directories:\n      - type: sharedScratch\n        path: ${ROOT}/scratch\n";
        let settings = CatalogSettings {
            variables: HashMap::from([
                ("SITE".to_string(), "isi".to_string()),
                ("ROOT".to_string(), "/lustre".to_string()),
            ]),
            ..CatalogSettings::default()
        };
        let store = parse_catalog(yaml, CatalogFormat::Yaml, &settings).unwrap();
        assert_eq!(
            store.lookup("isi").unwrap().work_directory_mount_point(),
            Some("/lustre/scratch")
        );

        let settings = CatalogSettings {
            expand_variables: false,
            ..settings
        };
        let store = parse_catalog(yaml, CatalogFormat::Yaml, &settings).unwrap();
        assert!(store.contains("${SITE}"));
    }

    #[test]
    fn test_convert_between_formats() {
        let settings = CatalogSettings::default();
        let store = parse_catalog(POOL, CatalogFormat::PoolConfig, &settings).unwrap();

        for format in [CatalogFormat::Xml, CatalogFormat::Yaml, CatalogFormat::Json] {
            let text = write_catalog(&store, format, XmlSchema::V4).unwrap();
            let back = parse_catalog(&text, format, &settings).unwrap();
            assert_eq!(back, store, "round trip through {}", format);
        }
    }

    #[test]
    fn test_write_pool_config() {
        let settings = CatalogSettings::default();
        let store = parse_catalog(POOL, CatalogFormat::PoolConfig, &settings).unwrap();
        let text = write_catalog(&store, CatalogFormat::PoolConfig, XmlSchema::V4).unwrap();
        assert!(text.contains("pool local {"));
        assert!(text.contains("universe vanilla \"localhost/jobmanager-condor\" \"4.0.0\";"));
        let back = parse_catalog(&text, CatalogFormat::PoolConfig, &settings).unwrap();
        assert_eq!(back.list().collect::<Vec<_>>(), vec!["isi", "local"]);
    }

    #[test]
    fn test_version_two_xml_into_sites() {
        let xml = r#"<sitecatalog version="2.0">
    <site handle="isi" sysinfo="INTEL32::LINUX">
        <gridftp url="gsiftp://viz.isi.edu" storage="/data" major="4" minor="0" patch="5"/>
        <jobmanager universe="transfer" url="viz.isi.edu/jobmanager-fork" major="4" minor="0" patch="5"/>
        <jobmanager universe="vanilla" url="viz.isi.edu/jobmanager-pbs" major="4" minor="0" patch="5"/>
        <workdirectory>/scratch</workdirectory>
    </site>
</sitecatalog>"#;
        let store = parse_catalog(xml, CatalogFormat::Xml, &CatalogSettings::default()).unwrap();
        let site = store.lookup("isi").unwrap();
        assert_eq!(site.work_directory_mount_point(), Some("/scratch"));
        assert_eq!(
            site.grid_gateway(JobType::Compute).unwrap().contact,
            "viz.isi.edu/jobmanager-pbs"
        );
        let storage = site.directory(DirectoryType::SharedStorage).unwrap();
        assert_eq!(storage.mount_point(), Some("/data"));
    }

    #[test]
    fn test_unknown_format_name() {
        assert!(matches!(
            "csv".parse::<CatalogFormat>(),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!("YAML".parse::<CatalogFormat>().unwrap(), CatalogFormat::Yaml);
    }
}
