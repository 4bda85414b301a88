//! Chart Gatekeeper CLI
//!
//! A command-line client for uploading chart archives to the gatekeeper
//! and managing the releases it installed.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Chart Gatekeeper CLI
#[derive(Debug, Parser)]
#[command(name = "gkctl")]
#[command(author, version, about = "CLI for the Chart Gatekeeper deploy API", long_about = None)]
pub struct Cli {
    /// Gatekeeper URL (can also be set via GATEKEEPER_API_URL env var)
    #[arg(long, env = "GATEKEEPER_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Request timeout in seconds; deployments wait on helm for every chart
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload a chart archive (.zip, .tar.gz, .tgz) for gated deployment
    Deploy {
        /// Path to the archive
        archive: PathBuf,
    },

    /// Uninstall a release
    Undeploy {
        /// Release name
        release: String,
    },

    /// Show the status of a release
    Status {
        /// Release name
        release: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = client::ApiClient::new(&cli.api_url, Duration::from_secs(cli.timeout))?;

    match cli.command {
        Commands::Deploy { archive } => {
            commands::deploy::deploy(&client, &archive, cli.format).await?;
        }
        Commands::Undeploy { release } => {
            commands::releases::undeploy(&client, &release, cli.format).await?;
        }
        Commands::Status { release } => {
            commands::releases::status(&client, &release, cli.format).await?;
        }
    }

    Ok(())
}
