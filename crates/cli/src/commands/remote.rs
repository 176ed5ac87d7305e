//! One-shot bridge calls
//!
//! Each command launches the host against the configured vault, waits for
//! its index to settle, issues one call and stops the host again.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::time::Duration;
use tracing::debug;
use vaultbridge_harness::{HarnessConfig, ReadMode, Session, SessionOptions};

use crate::output::{
    print_item, print_list, print_message, print_success, print_warning, LinkDisplay, OutputFormat,
};

#[derive(Subcommand)]
pub enum RemoteCommands {
    /// Print a file's content
    Read {
        /// Vault-relative path
        file: String,

        /// Read from storage instead of the content cache
        #[arg(long)]
        authoritative: bool,
    },

    /// Show the file handle for a path
    Resolve {
        /// Vault-relative path
        file: String,
    },

    /// Resolve a link path to its first destination
    Link {
        /// Link text, e.g. `Welcome` or `notes/Linked`
        linkpath: String,

        /// Path of the file containing the link
        #[arg(long, default_value = "")]
        from: String,
    },

    /// Outgoing links of a file
    Links {
        /// Vault-relative path
        file: String,
    },

    /// List every file in the vault
    Files,

    /// Wait for the indexer
    Wait {
        /// Timeout in milliseconds
        #[arg(long, default_value_t = vaultbridge_common::DEFAULT_INDEXING_TIMEOUT_MS)]
        timeout_ms: u64,

        /// Return at once if the index is already settled
        #[arg(long)]
        settled: bool,
    },

    /// Check the bridge and print the agent version
    Ping,
}

pub async fn execute(cmd: RemoteCommands, config: &HarnessConfig, format: OutputFormat) -> Result<()> {
    anyhow::ensure!(
        config.vault.is_some(),
        "no vault configured; pass --vault or set `vault` in the config file"
    );

    debug!("Launching host for vault {:?}", config.vault);
    let session = Session::launch(config, SessionOptions::default())
        .await
        .context("launching host")?;

    let result = run(&session, cmd, format).await;
    session.close().await;
    result
}

async fn run(session: &Session, cmd: RemoteCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        RemoteCommands::Read {
            file,
            authoritative,
        } => {
            let mode = if authoritative {
                ReadMode::Authoritative
            } else {
                ReadMode::Cached
            };
            let content = session.read_file(&file, mode).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "path": file, "content": content })),
                _ => print!("{}", content),
            }
        }
        RemoteCommands::Resolve { file } => {
            let handle = session.resolve_file(&file).await?;
            print_item(&handle, format);
        }
        RemoteCommands::Link { linkpath, from } => match session.resolve_link(&linkpath, &from).await? {
            Some(handle) => print_item(&handle, format),
            None => print_warning(&format!("{} does not resolve to a file", linkpath)),
        },
        RemoteCommands::Links { file } => {
            let links: Vec<LinkDisplay> = session
                .resolved_links(&file)
                .await?
                .into_iter()
                .map(|(target, count)| LinkDisplay { target, count })
                .collect();
            print_list(&links, format);
        }
        RemoteCommands::Files => {
            let files = session.list_files().await?;
            print_list(&files, format);
        }
        RemoteCommands::Wait {
            timeout_ms,
            settled,
        } => {
            let timeout = Duration::from_millis(timeout_ms);
            if settled {
                session.wait_for_index_settled(timeout).await?;
            } else {
                session.wait_for_indexing_complete(timeout).await?;
            }
            print_success("Indexing complete");
        }
        RemoteCommands::Ping => {
            let version = session.bridge().ping().await?;
            print_message(&version, format);
        }
    }

    Ok(())
}
