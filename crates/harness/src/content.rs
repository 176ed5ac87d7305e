//! Vault content access over the bridge
//!
//! Everything returned as text is newline-normalized before it leaves this
//! module.

use std::collections::BTreeMap;
use vaultbridge_common::{normalize_eol, Command, FileHandle, ReadMode};

use crate::bridge::Bridge;
use crate::error::HarnessResult;

/// Resolve a vault-relative path to a file handle
///
/// Fails with `NotFound` when the vault has no such file.
pub async fn resolve_file(bridge: &Bridge, path: &str) -> HarnessResult<FileHandle> {
    bridge
        .call(Command::ResolveFile {
            path: path.to_string(),
        })
        .await
}

/// Read a file's content
///
/// `ReadMode::Cached` goes through the application's content cache and may
/// be stale after an external write. `ReadMode::Authoritative` always hits
/// storage.
pub async fn read_file(bridge: &Bridge, path: &str, mode: ReadMode) -> HarnessResult<String> {
    let raw: String = bridge
        .call(Command::ReadFile {
            path: path.to_string(),
            mode,
        })
        .await?;
    Ok(normalize_eol(&raw))
}

/// First destination a link path resolves to, seen from `source_path`
pub async fn resolve_link(
    bridge: &Bridge,
    linkpath: &str,
    source_path: &str,
) -> HarnessResult<Option<FileHandle>> {
    bridge
        .call(Command::ResolveLink {
            linkpath: linkpath.to_string(),
            source_path: source_path.to_string(),
        })
        .await
}

/// Every file in the vault, sorted by path
pub async fn list_files(bridge: &Bridge) -> HarnessResult<Vec<FileHandle>> {
    bridge.call(Command::ListFiles).await
}

/// Outgoing links of `path` as of the last indexing pass, keyed by target
pub async fn resolved_links(bridge: &Bridge, path: &str) -> HarnessResult<BTreeMap<String, u32>> {
    bridge
        .call(Command::ResolvedLinks {
            path: path.to_string(),
        })
        .await
}
