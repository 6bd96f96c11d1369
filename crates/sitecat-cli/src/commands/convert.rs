//! Format conversion.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use sitecat_config::{CatalogFormat, Settings, XmlSchema, write_catalog};

use super::{emit, read_store};

pub fn run(
    settings: &Settings,
    input: Option<PathBuf>,
    from: Option<CatalogFormat>,
    to: CatalogFormat,
    schema: XmlSchema,
    output: Option<PathBuf>,
) -> Result<()> {
    let store = read_store(settings, input, from)?;
    let text = write_catalog(&store, to, schema)
        .with_context(|| format!("Failed to write catalog as {}", to))?;
    emit(&text, output.as_deref())?;
    info!(sites = store.len(), format = %to, "converted catalog");
    Ok(())
}
