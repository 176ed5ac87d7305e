//! vaultbridge CLI - Main Entry Point
//!
//! Manages the host application's vault registry and issues one-shot
//! bridge calls against a launched host.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::{remote, vault};
use vaultbridge_harness::HarnessConfig;

/// vaultbridge CLI - drive a note-taking application from the terminal
#[derive(Parser)]
#[command(name = "vaultbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file
    #[arg(long, default_value = "vaultbridge.toml", global = true)]
    config: PathBuf,

    /// Vault directory, overriding the configuration file
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Vault registry directory, overriding the platform default
    #[arg(long, global = true)]
    registry_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the vault registry
    #[command(subcommand)]
    Vault(vault::VaultCommands),

    #[command(flatten)]
    Remote(remote::RemoteCommands),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut config = HarnessConfig::load(&cli.config)?;
    if cli.vault.is_some() {
        config.vault = cli.vault;
    }
    if cli.registry_dir.is_some() {
        config.registry_dir = cli.registry_dir;
    }

    match cli.command {
        Commands::Vault(cmd) => vault::execute(cmd, &config.registry()?, cli.format)?,
        Commands::Remote(cmd) => remote::execute(cmd, &config, cli.format).await?,
        Commands::Version => {
            println!("vaultbridge CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Bridge protocol: JSON lines");
        }
    }

    Ok(())
}
