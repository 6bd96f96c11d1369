//! Catalog generation from VORS.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use sitecat_config::{CatalogFormat, Settings, XmlSchema, write_catalog};
use sitecat_query::VorsClient;
use sitecat_query::vors::{local_site_info, to_site};

use super::{emit, host_environment};

pub async fn run(
    settings: &Settings,
    local: bool,
    to: CatalogFormat,
    schema: XmlSchema,
    output: Option<PathBuf>,
) -> Result<()> {
    let client = VorsClient::new(&settings.vors).context("Failed to create VORS client")?;
    let mut store = client.catalog().await;

    if local {
        let env = host_environment();
        let hostname = env
            .get("HOSTNAME")
            .cloned()
            .unwrap_or_else(|| "localhost".to_string());
        let info = local_site_info(&settings.vors.vo, &env, &hostname);
        if let Some(site) = to_site(&info, None) {
            store.add_entry(site);
        }
        store = store.with_host_environment(env);
    }

    store.retain_handles(settings.catalog.sites.as_slice());
    let text = write_catalog(&store, to, schema)
        .with_context(|| format!("Failed to write catalog as {}", to))?;
    emit(&text, output.as_deref())?;
    info!(sites = store.len(), vo = %settings.vors.vo, "wrote VORS catalog");
    Ok(())
}
