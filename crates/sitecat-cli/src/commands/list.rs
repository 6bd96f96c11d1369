//! Site listing.

use anyhow::Result;
use std::path::PathBuf;

use sitecat_config::{CatalogFormat, Settings};
use sitecat_core::Site;

use super::read_store;

pub fn run(
    settings: &Settings,
    input: Option<PathBuf>,
    from: Option<CatalogFormat>,
    verbose: bool,
) -> Result<()> {
    let store = read_store(settings, input, from)?;

    if store.is_empty() {
        println!("No sites");
        return Ok(());
    }

    for site in store.entries() {
        println!("{} ({}/{})", site.handle(), site.arch(), site.os());
        if verbose {
            print_details(site);
        }
    }
    Ok(())
}

fn print_details(site: &Site) {
    for directory in site.directories() {
        println!(
            "  directory {} {}",
            directory.kind,
            directory.mount_point().unwrap_or("-")
        );
        for server in directory.all_file_servers() {
            println!("    file-server {} {}", server.operation, server.url());
        }
    }
    for gateway in site.grid_gateways() {
        println!(
            "  grid {} {} {} ({})",
            gateway.gateway_type, gateway.job_type, gateway.contact, gateway.scheduler
        );
    }
    for catalog in site.replica_catalogs() {
        println!("  replica-catalog {} {}", catalog.catalog_type, catalog.url);
    }
    if !site.profiles().is_empty() {
        println!("  profiles: {}", site.profiles().len());
    }
}
