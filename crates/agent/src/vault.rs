//! In-memory application state for one open vault
//!
//! Mirrors what the note-taking application keeps per vault: a content
//! index of every file, a content cache filled as files are read or
//! indexed, and the link table built by the metadata indexer.

use crate::context::{AppContext, IndexState};
use crate::error::{AgentError, AgentResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vaultbridge_common::{FileHandle, FileStat};
use walkdir::WalkDir;

/// `[[target]]`, `[[target|alias]]`, `[[target#heading]]`
static WIKILINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\[\]|#]+)(?:#[^\[\]|]*)?(?:\|[^\[\]]*)?\]\]").unwrap());

/// State of an open vault
pub struct VaultApp {
    root: PathBuf,

    /// Top-level names skipped when scanning
    ignore: Vec<String>,

    /// Content index, keyed by vault-relative path
    files: RwLock<BTreeMap<String, FileHandle>>,

    /// Content cache, keyed by vault-relative path
    cache: RwLock<HashMap<String, String>>,

    /// Resolved link destinations per source path
    links: RwLock<HashMap<String, BTreeMap<String, u32>>>,

    index: watch::Sender<IndexState>,
}

impl VaultApp {
    /// Open the vault at `root` and build its content index
    pub fn open(root: impl Into<PathBuf>, ignore: Vec<String>) -> AgentResult<Arc<Self>> {
        let root = root.into();
        if !root.is_dir() {
            return Err(AgentError::VaultMissing(root));
        }

        let (index, _) = watch::channel(IndexState {
            generation: 0,
            pending: true,
        });

        let app = Arc::new(Self {
            root,
            ignore,
            files: RwLock::new(BTreeMap::new()),
            cache: RwLock::new(HashMap::new()),
            links: RwLock::new(HashMap::new()),
            index,
        });

        let changed = app.rescan();
        info!(
            "Opened vault {} ({} files)",
            app.root.display(),
            changed.len()
        );
        Ok(app)
    }

    /// Vault root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `relative` lies in a skipped part of the vault
    pub fn is_ignored(&self, relative: &Path) -> bool {
        relative.components().any(|c| {
            let name = c.as_os_str().to_string_lossy();
            name.starts_with('.') || self.ignore.iter().any(|i| *i == name)
        })
    }

    /// Rebuild the content index from disk
    ///
    /// Returns every path that appeared, disappeared or changed; those are
    /// dropped from the content cache. Unreadable entries are skipped.
    pub fn rescan(&self) -> Vec<String> {
        let mut scanned = BTreeMap::new();

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| match entry.path().strip_prefix(&self.root) {
                Ok(rel) => !self.is_ignored(rel),
                Err(_) => false,
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(path) = self.relative_key(entry.path()) else {
                continue;
            };
            let stat = match entry.metadata() {
                Ok(meta) => file_stat(&meta),
                Err(e) => {
                    warn!("Cannot stat {}: {}", path, e);
                    continue;
                }
            };
            scanned.insert(path.clone(), FileHandle::new(path, stat));
        }

        let mut files = self.files.write();
        let mut changed: Vec<String> = scanned
            .iter()
            .filter(|(path, handle)| files.get(*path).map(|old| old.stat) != Some(handle.stat))
            .map(|(path, _)| path.clone())
            .collect();
        changed.extend(files.keys().filter(|p| !scanned.contains_key(*p)).cloned());
        *files = scanned;
        drop(files);

        if !changed.is_empty() {
            let mut cache = self.cache.write();
            for path in &changed {
                cache.remove(path);
            }
            debug!("Rescan found {} changed path(s)", changed.len());
        }

        changed
    }

    /// Flag that an indexing pass is queued
    pub fn mark_pending(&self) {
        self.index.send_modify(|state| state.pending = true);
    }

    /// Read every markdown file, refresh the cache and resolve links
    ///
    /// Publishes a new generation with `pending == false` when done.
    pub async fn index_pass(&self) -> usize {
        self.mark_pending();

        let markdown: Vec<FileHandle> = self
            .files
            .read()
            .values()
            .filter(|f| f.is_markdown())
            .cloned()
            .collect();

        let mut resolved = HashMap::new();
        for file in &markdown {
            let content = match self.read(file).await {
                Ok(c) => c,
                Err(e) => {
                    warn!("Cannot index {}: {}", file.path, e);
                    continue;
                }
            };

            let mut targets: BTreeMap<String, u32> = BTreeMap::new();
            for capture in WIKILINK.captures_iter(&content) {
                let linkpath = capture[1].trim();
                if let Some(dest) = self.first_linkpath_dest(linkpath, &file.path) {
                    *targets.entry(dest.path).or_default() += 1;
                }
            }
            resolved.insert(file.path.clone(), targets);
            self.cache.write().insert(file.path.clone(), content);
        }

        *self.links.write() = resolved;
        self.index.send_modify(|state| {
            state.generation += 1;
            state.pending = false;
        });

        let generation = self.index.borrow().generation;
        info!(
            "Indexing pass {} resolved {} markdown file(s)",
            generation,
            markdown.len()
        );
        markdown.len()
    }

    fn relative_key(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    fn absolute(&self, file: &FileHandle) -> PathBuf {
        file.path
            .split('/')
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }
}

#[async_trait]
impl AppContext for VaultApp {
    fn file_by_path(&self, path: &str) -> Option<FileHandle> {
        self.files.read().get(path).cloned()
    }

    fn files(&self) -> Vec<FileHandle> {
        self.files.read().values().cloned().collect()
    }

    fn first_linkpath_dest(&self, linkpath: &str, source_path: &str) -> Option<FileHandle> {
        let linkpath = linkpath.split('#').next().unwrap_or("").trim();
        if linkpath.is_empty() {
            return None;
        }

        let files = self.files.read();
        if let Some(exact) = files.get(linkpath) {
            return Some(exact.clone());
        }
        let with_ext = format!("{}.md", linkpath);
        if let Some(exact) = files.get(&with_ext) {
            return Some(exact.clone());
        }

        let wanted = linkpath.to_lowercase();
        let wanted_md = with_ext.to_lowercase();
        let source_dir = match source_path.rfind('/') {
            Some(idx) => &source_path[..idx],
            None => "",
        };

        let candidates: Vec<&FileHandle> = files
            .values()
            .filter(|f| {
                let path = f.path.to_lowercase();
                path == wanted
                    || path == wanted_md
                    || path.ends_with(&format!("/{}", wanted))
                    || path.ends_with(&format!("/{}", wanted_md))
            })
            .collect();

        candidates
            .iter()
            .find(|f| f.parent() == source_dir)
            .or_else(|| candidates.iter().min_by_key(|f| f.path.len()))
            .map(|f| (*f).clone())
    }

    fn resolved_links(&self, path: &str) -> Option<BTreeMap<String, u32>> {
        self.links.read().get(path).cloned()
    }

    async fn cached_read(&self, file: &FileHandle) -> io::Result<String> {
        if let Some(content) = self.cache.read().get(&file.path) {
            return Ok(content.clone());
        }
        let content = self.read(file).await?;
        self.cache.write().insert(file.path.clone(), content.clone());
        Ok(content)
    }

    async fn read(&self, file: &FileHandle) -> io::Result<String> {
        tokio::fs::read_to_string(self.absolute(file)).await
    }

    fn index_state(&self) -> watch::Receiver<IndexState> {
        self.index.subscribe()
    }
}

fn file_stat(meta: &std::fs::Metadata) -> FileStat {
    let mtime = meta.modified().map(epoch_millis).unwrap_or(0);
    let ctime = meta.created().map(epoch_millis).unwrap_or(mtime);
    FileStat {
        ctime,
        mtime,
        size: meta.len(),
    }
}

fn epoch_millis(time: SystemTime) -> i64 {
    chrono::DateTime::<chrono::Utc>::from(time).timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("Welcome.md"), "This is your new *vault*.\r\nSee [[Ideas]].").unwrap();
        std::fs::create_dir_all(root.join("notes")).unwrap();
        std::fs::write(root.join("notes/Ideas.md"), "[[Welcome]] and [[Welcome|home]] and [[missing]]").unwrap();
        std::fs::create_dir_all(root.join("archive")).unwrap();
        std::fs::write(root.join("archive/Ideas.md"), "old").unwrap();
        std::fs::create_dir_all(root.join(".obsidian")).unwrap();
        std::fs::write(root.join(".obsidian/app.json"), "{}").unwrap();
        std::fs::write(root.join("image.png"), [0u8, 1, 2]).unwrap();
        tmp
    }

    fn open(tmp: &TempDir) -> Arc<VaultApp> {
        VaultApp::open(tmp.path(), vec![".obsidian".to_string()]).unwrap()
    }

    #[test]
    fn test_scan_skips_config_dir() {
        let tmp = fixture();
        let app = open(&tmp);

        let paths: Vec<String> = app.files().into_iter().map(|f| f.path).collect();
        assert_eq!(
            paths,
            vec!["Welcome.md", "archive/Ideas.md", "image.png", "notes/Ideas.md"]
        );
        assert_eq!(app.file_by_path("image.png").unwrap().stat.size, 3);
    }

    #[test]
    fn test_missing_root_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = VaultApp::open(tmp.path().join("nope"), vec![]);
        assert!(matches!(result, Err(AgentError::VaultMissing(_))));
    }

    #[test]
    fn test_link_resolution_prefers_exact_then_same_folder() {
        let tmp = fixture();
        let app = open(&tmp);

        let exact = app.first_linkpath_dest("archive/Ideas", "Welcome.md").unwrap();
        assert_eq!(exact.path, "archive/Ideas.md");

        let same_folder = app.first_linkpath_dest("Ideas", "archive/Other.md").unwrap();
        assert_eq!(same_folder.path, "archive/Ideas.md");

        let welcome = app.first_linkpath_dest("Welcome#Intro", "/").unwrap();
        assert_eq!(welcome.basename, "Welcome");

        assert!(app.first_linkpath_dest("nothing", "Welcome.md").is_none());
    }

    #[tokio::test]
    async fn test_index_pass_resolves_links_and_fills_cache() {
        let tmp = fixture();
        let app = open(&tmp);
        let mut state = app.index_state();
        assert!(!state.borrow_and_update().is_settled());

        assert_eq!(app.index_pass().await, 3);
        assert!(state.borrow_and_update().is_settled());

        let links = app.resolved_links("notes/Ideas.md").unwrap();
        assert_eq!(links.get("Welcome.md"), Some(&2));
        assert_eq!(links.len(), 1);

        assert!(app.cache.read().contains_key("Welcome.md"));
    }

    #[tokio::test]
    async fn test_cached_read_can_be_stale() {
        let tmp = fixture();
        let app = open(&tmp);
        let file = app.file_by_path("Welcome.md").unwrap();

        let first = app.cached_read(&file).await.unwrap();
        std::fs::write(tmp.path().join("Welcome.md"), "rewritten").unwrap();

        assert_eq!(app.cached_read(&file).await.unwrap(), first);
        assert_eq!(app.read(&file).await.unwrap(), "rewritten");
    }

    #[tokio::test]
    async fn test_rescan_invalidates_changed_paths() {
        let tmp = fixture();
        let app = open(&tmp);
        let file = app.file_by_path("Welcome.md").unwrap();
        app.cached_read(&file).await.unwrap();

        std::fs::write(tmp.path().join("New.md"), "fresh").unwrap();
        std::fs::remove_file(tmp.path().join("archive/Ideas.md")).unwrap();

        let changed = app.rescan();
        assert!(changed.contains(&"New.md".to_string()));
        assert!(changed.contains(&"archive/Ideas.md".to_string()));
        assert!(app.file_by_path("archive/Ideas.md").is_none());
        assert!(app.cache.read().contains_key("Welcome.md"));
    }
}
