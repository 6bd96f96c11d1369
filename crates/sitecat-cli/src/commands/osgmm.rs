//! Catalog generation from an OSGMM Condor collector.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use sitecat_config::{CatalogFormat, Settings, XmlSchema, write_catalog};
use sitecat_core::Site;
use sitecat_core::store::LOCAL_SITE;
use sitecat_query::{OsgmmQuery, ProcessRunner};

use super::{emit, host_environment};

pub async fn run(
    settings: &Settings,
    to: CatalogFormat,
    schema: XmlSchema,
    output: Option<PathBuf>,
) -> Result<()> {
    let query = OsgmmQuery::new(&settings.osgmm);
    let env = host_environment();
    let hostname = env
        .get("HOSTNAME")
        .cloned()
        .unwrap_or_else(|| "localhost".to_string());
    let local = query
        .local_site(&env, &hostname)
        .unwrap_or_else(|| Site::new(LOCAL_SITE));

    let store = query
        .catalog(&ProcessRunner, &settings.catalog.sites, local)
        .await
        .with_context(|| format!("Failed to query collector {}", query.collector))?
        .with_host_environment(env);

    let text = write_catalog(&store, to, schema)
        .with_context(|| format!("Failed to write catalog as {}", to))?;
    emit(&text, output.as_deref())?;
    info!(sites = store.len(), collector = %query.collector, "wrote OSGMM catalog");
    Ok(())
}

/// Print `pegasus.transfer.srm.*` properties, one `key=value` per line.
pub async fn srm_properties(settings: &Settings, output: Option<PathBuf>) -> Result<()> {
    let query = OsgmmQuery::new(&settings.osgmm);
    let properties = query
        .srm_properties(&ProcessRunner)
        .await
        .with_context(|| format!("Failed to query collector {}", query.collector))?;

    let text: String = properties
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect();
    emit(&text, output.as_deref())?;
    info!(properties = properties.len(), "wrote SRM properties");
    Ok(())
}
