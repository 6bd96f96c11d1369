//! CLI command implementations.

pub mod convert;
pub mod list;
pub mod osgmm;
pub mod vors;

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use sitecat_config::{CatalogFormat, Settings, parse_catalog};
use sitecat_core::SiteStore;

/// Load the settings file, falling back to defaults when it does not exist.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        debug!(path = %path.display(), "no settings file; using defaults");
        return Ok(Settings::default());
    }
    Settings::load(path).with_context(|| format!("Failed to load settings from {}", path.display()))
}

pub fn host_environment() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Read the catalog named on the command line or in the settings file.
pub fn read_store(
    settings: &Settings,
    input: Option<PathBuf>,
    from: Option<CatalogFormat>,
) -> Result<SiteStore> {
    let Some(path) = input.or_else(|| settings.catalog.path.clone()) else {
        bail!("No catalog given and no catalog path in the settings file");
    };
    let format = from.unwrap_or_else(|| CatalogFormat::from_path(&path));
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    // explicit variables win over the process environment
    let env = host_environment();
    let mut catalog = settings.catalog.clone();
    let mut variables = env.clone();
    variables.extend(catalog.variables.drain());
    catalog.variables = variables;

    let store = parse_catalog(&text, format, &catalog)
        .with_context(|| format!("Failed to parse {} as {}", path.display(), format))?;
    Ok(store.with_host_environment(env))
}

/// Write `text` to `output`, or stdout when no path is given.
pub fn emit(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

pub fn validate(settings: &Settings, input: Option<PathBuf>, from: Option<CatalogFormat>) -> Result<()> {
    match read_store(settings, input, from) {
        Ok(store) => {
            println!("Catalog is valid ({} sites)", store.len());
            Ok(())
        }
        Err(e) => {
            println!("Catalog error: {:#}", e);
            std::process::exit(1);
        }
    }
}
