//! Vault Registry Commands

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::output::{print_list, print_message, print_success, OutputFormat, VaultDisplay};
use vaultbridge_common::registry::open_uri;
use vaultbridge_common::VaultRegistry;

#[derive(Subcommand)]
pub enum VaultCommands {
    /// Register a vault directory (no-op when already registered)
    Register {
        /// Vault directory
        path: PathBuf,
    },

    /// List registered vaults
    List,

    /// Print the open URI for a vault, registering it if needed
    Uri {
        /// Vault directory
        path: PathBuf,
    },
}

pub fn execute(cmd: VaultCommands, registry: &VaultRegistry, format: OutputFormat) -> Result<()> {
    match cmd {
        VaultCommands::Register { path } => {
            let id = registry.ensure_registered(&path)?;
            match format {
                OutputFormat::Json => print_message(&id, format),
                _ => print_success(&format!("Vault {} registered as {}", path.display(), id)),
            }
        }
        VaultCommands::List => {
            let vaults: Vec<VaultDisplay> = registry
                .entries()?
                .into_iter()
                .map(VaultDisplay::from)
                .collect();
            print_list(&vaults, format);
        }
        VaultCommands::Uri { path } => {
            let id = registry.ensure_registered(&path)?;
            print_message(&open_uri(&id)?, format);
        }
    }

    Ok(())
}
