//! KPT operator CLI
//!
//! Inspect KptMonitor resources and the probe fleet from the command line.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{fleet, monitors};
use operator_lib::client::build_client;
use std::path::PathBuf;

/// KPT operator CLI
#[derive(Parser)]
#[command(name = "kptctl")]
#[command(author, version, about = "CLI for the KPT monitoring operator", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (inferred if not specified)
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List resources
    #[command(subcommand)]
    Get(GetCommands),

    /// Show manager, probe and visor pods
    Fleet,
}

#[derive(Subcommand)]
pub enum GetCommands {
    /// List KptMonitor resources
    Monitors {
        /// Namespace to list (all namespaces if not specified)
        #[arg(long, short, env = "KPT_NAMESPACE")]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let defaults = config::CliConfig::load()?;

    let kubeconfig = cli.kubeconfig.or(defaults.kubeconfig);
    let client = build_client(kubeconfig.as_deref())
        .await
        .context("Failed to connect to Kubernetes")?;

    match cli.command {
        Commands::Get(GetCommands::Monitors { namespace }) => {
            monitors::get_monitors(client, namespace.or(defaults.namespace), cli.format).await?;
        }
        Commands::Fleet => {
            fleet::show_fleet(client, cli.format).await?;
        }
    }

    Ok(())
}
