//! Site catalog CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sitecat_config::{CatalogFormat, XmlSchema};

mod commands;

#[derive(Parser)]
#[command(name = "sitecat")]
#[command(about = "Convert and inspect Pegasus site catalogs", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, global = true, env = "SITECAT_SETTINGS", default_value = "sitecat.kdl")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a catalog to another format
    Convert {
        /// Catalog to read; defaults to the path in the settings file
        input: Option<PathBuf>,
        /// Input format, detected from the extension when omitted
        #[arg(long)]
        from: Option<CatalogFormat>,
        /// Output format
        #[arg(long, default_value = "yaml")]
        to: CatalogFormat,
        /// XML schema version for XML output
        #[arg(long)]
        schema: Option<XmlSchema>,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that a catalog parses
    Validate {
        /// Catalog to read; defaults to the path in the settings file
        input: Option<PathBuf>,
        /// Input format, detected from the extension when omitted
        #[arg(long)]
        from: Option<CatalogFormat>,
    },
    /// List the sites of a catalog
    List {
        /// Catalog to read; defaults to the path in the settings file
        input: Option<PathBuf>,
        /// Input format, detected from the extension when omitted
        #[arg(long)]
        from: Option<CatalogFormat>,
        /// Show directories, gateways and replica catalogs
        #[arg(short, long)]
        verbose: bool,
    },
    /// Build a catalog from a VORS server
    Vors {
        /// Add a `local` site describing this host
        #[arg(long)]
        local: bool,
        /// Output format
        #[arg(long, default_value = "yaml")]
        to: CatalogFormat,
        /// XML schema version for XML output
        #[arg(long)]
        schema: Option<XmlSchema>,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build a catalog from an OSGMM Condor collector
    Osgmm {
        /// Print SRM transfer properties instead of a catalog
        #[arg(long)]
        srm_properties: bool,
        /// Output format
        #[arg(long, default_value = "yaml")]
        to: CatalogFormat,
        /// XML schema version for XML output
        #[arg(long)]
        schema: Option<XmlSchema>,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = commands::load_settings(&cli.settings)?;

    match cli.command {
        Commands::Convert {
            input,
            from,
            to,
            schema,
            output,
        } => {
            let schema = schema.unwrap_or(settings.catalog.schema);
            commands::convert::run(&settings, input, from, to, schema, output)?;
        }
        Commands::Validate { input, from } => {
            commands::validate(&settings, input, from)?;
        }
        Commands::List {
            input,
            from,
            verbose,
        } => {
            commands::list::run(&settings, input, from, verbose)?;
        }
        Commands::Vors {
            local,
            to,
            schema,
            output,
        } => {
            let schema = schema.unwrap_or(settings.catalog.schema);
            commands::vors::run(&settings, local, to, schema, output).await?;
        }
        Commands::Osgmm {
            srm_properties,
            to,
            schema,
            output,
        } => {
            if srm_properties {
                commands::osgmm::srm_properties(&settings, output).await?;
            } else {
                let schema = schema.unwrap_or(settings.catalog.schema);
                commands::osgmm::run(&settings, to, schema, output).await?;
            }
        }
    }

    Ok(())
}
