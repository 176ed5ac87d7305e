//! vaultbridge agent
//!
//! Opens a vault, keeps its application state live and answers bridge
//! commands on stdio (or TCP with `--listen`). Logs go to stderr because
//! stdout carries the protocol.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vaultbridge_agent::{indexer, AgentConfig, AgentError, AgentResult, IndexerOptions, VaultApp};
use vaultbridge_common::registry::{id_from_open_uri, VaultRegistry, REGISTRY_DIR_ENV};

#[derive(Parser)]
#[command(name = "vaultbridge-agent")]
#[command(about = "vaultbridge agent - serves bridge commands for one open vault")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Vault directory to open
    #[arg(long)]
    vault: Option<PathBuf>,

    /// Vault registry directory (platform default when unset)
    #[arg(long, env = REGISTRY_DIR_ENV)]
    registry_dir: Option<PathBuf>,

    /// Serve TCP on this address instead of stdio
    #[arg(short, long)]
    listen: Option<String>,

    /// Delay before each indexing pass, in milliseconds
    #[arg(long)]
    index_delay_ms: Option<u64>,

    /// Do not re-index on filesystem changes
    #[arg(long)]
    no_watch: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// obsidian://open?vault=<id> URI naming a registered vault
    uri: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("vaultbridge agent v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };
    if cli.vault.is_some() {
        config.vault = cli.vault.clone();
    }
    if cli.registry_dir.is_some() {
        config.registry_dir = cli.registry_dir.clone();
    }
    if cli.listen.is_some() {
        config.listen = cli.listen.clone();
    }
    if let Some(delay) = cli.index_delay_ms {
        config.indexer.delay_ms = delay;
    }
    if cli.no_watch {
        config.indexer.watch = false;
    }

    let registry = || -> anyhow::Result<VaultRegistry> {
        Ok(match &config.registry_dir {
            Some(dir) => VaultRegistry::at(dir),
            None => VaultRegistry::for_current_platform()?,
        })
    };

    // Resolve the vault, through the registry when opened by URI
    let mut opened_id = None;
    let vault_path = match (&cli.uri, &config.vault) {
        (Some(uri), _) => {
            let id = id_from_open_uri(uri)?;
            let entry = registry()?
                .lookup(&id)?
                .ok_or_else(|| vaultbridge_common::Error::not_found("vault", id.as_str()))?;
            registry()?.set_open(&id, true)?;
            opened_id = Some(id);
            PathBuf::from(entry.path)
        }
        (None, Some(path)) => path.clone(),
        (None, None) => return Err(AgentError::NoVault.into()),
    };

    let app = VaultApp::open(&vault_path, config.indexer.ignore.clone())
        .with_context(|| format!("opening vault {}", vault_path.display()))?;

    let _indexer = indexer::spawn(
        app.clone(),
        IndexerOptions {
            delay: config.indexer.delay(),
            watch: config.indexer.watch,
        },
    )?;

    let serve = run_server(config.listen.clone(), app.clone());

    // Wait for shutdown signal
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
        }
        result = serve => {
            if let Err(e) = result {
                tracing::error!("Bridge server error: {}", e);
            }
        }
    }

    if let Some(id) = opened_id {
        if let Err(e) = registry().and_then(|r| Ok(r.set_open(&id, false)?)) {
            warn!("Could not clear open flag for {}: {}", id, e);
        }
    }

    info!("Agent shutdown complete");
    Ok(())
}

async fn run_server(listen: Option<String>, app: Arc<VaultApp>) -> AgentResult<()> {
    match listen {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            vaultbridge_agent::serve_tcp(listener, app).await
        }
        None => vaultbridge_agent::serve(tokio::io::stdin(), tokio::io::stdout(), app).await,
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
