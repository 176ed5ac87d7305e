//! Launching the agent binary the way a test run launches the host
//!
//! These go through `Session::launch`: vault registration, the open URI,
//! stdio bridge connect, the indexing wait and shutdown.

use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use vaultbridge_common::VaultRegistry;
use vaultbridge_harness::{HarnessConfig, ReadMode, Session, SessionOptions};

const WELCOME: &str = "This is your new *vault*.\r\n\r\nMake a note of something, [[create a link]], or try [[Linked]].\r\n";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("vaultbridge=debug")
        .with_test_writer()
        .try_init();
}

fn scratch_vault(root: &Path) -> PathBuf {
    let vault = root.join("vault");
    std::fs::create_dir_all(vault.join(".obsidian")).unwrap();
    std::fs::write(vault.join("Welcome.md"), WELCOME).unwrap();
    std::fs::write(vault.join("Linked.md"), "Back to [[Welcome]].\n").unwrap();
    vault
}

fn agent_config(vault: &Path, registry_dir: &Path, indexing_timeout_ms: u64) -> HarnessConfig {
    let mut config = HarnessConfig {
        vault: Some(vault.to_path_buf()),
        registry_dir: Some(registry_dir.to_path_buf()),
        indexing_timeout_ms,
        ..HarnessConfig::default()
    };
    config.host.program = Some(PathBuf::from(env!("CARGO_BIN_EXE_vaultbridge-agent")));
    config.host.args = vec!["--no-watch".to_string()];
    config.host.startup_timeout_secs = 20;
    config.host.stop_grace_ms = 5_000;
    config
}

fn is_running(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[tokio::test]
async fn launch_opens_vault_through_custom_registry() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let vault = scratch_vault(tmp.path());
    let registry_dir = tmp.path().join("registry");

    let indexing_timeout_ms = 20_000;
    let config = agent_config(&vault, &registry_dir, indexing_timeout_ms);

    let started = Instant::now();
    let session = Session::launch(&config, SessionOptions::default()).await.unwrap();
    assert!(
        started.elapsed() < Duration::from_millis(indexing_timeout_ms / 2),
        "launch waited {:?}",
        started.elapsed()
    );

    // The host looked the open URI up in this registry and marked it open
    let registry = VaultRegistry::at(&registry_dir);
    let entries = registry.entries().unwrap();
    assert_eq!(entries.len(), 1);
    let (id, entry) = &entries[0];
    assert_eq!(Path::new(&entry.path), vault.as_path());
    assert_eq!(entry.open, Some(true));
    assert_eq!(session.host().unwrap().vault_id(), Some(id.as_str()));

    session
        .assert_line_equals("Welcome.md", 0, "This is your new *vault*.", ReadMode::Cached)
        .await
        .unwrap();
    let files = session.list_files().await.unwrap();
    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["Linked.md", "Welcome.md"]);

    let pid = session.host().unwrap().pid().unwrap();
    assert!(is_running(pid));
    session.close().await;

    assert!(!is_running(pid));
    assert_eq!(registry.lookup(id).unwrap().unwrap().open, Some(false));
}

#[tokio::test]
async fn launch_reuses_registration_across_sessions() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let vault = scratch_vault(tmp.path());
    let registry_dir = tmp.path().join("obsidian");
    let config = agent_config(&vault, &registry_dir, 10_000);

    let first = Session::launch(&config, SessionOptions::default()).await.unwrap();
    let first_id = first.host().unwrap().vault_id().unwrap().to_string();
    first.close().await;

    let second = Session::launch(&config, SessionOptions::default()).await.unwrap();
    assert_eq!(second.host().unwrap().vault_id(), Some(first_id.as_str()));
    assert_eq!(second.bridge().ping().await.unwrap(), vaultbridge_common::VERSION);
    second.close().await;

    assert_eq!(VaultRegistry::at(&registry_dir).entries().unwrap().len(), 1);
}

#[tokio::test]
async fn launch_fails_when_vault_was_never_registered_with_host() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let vault = scratch_vault(tmp.path());

    // The host reads a different registry than the one the vault lands in
    let mut config = agent_config(&vault, &tmp.path().join("registry"), 10_000);
    config.host.env.insert(
        vaultbridge_common::registry::REGISTRY_DIR_ENV.to_string(),
        tmp.path().join("elsewhere").display().to_string(),
    );

    let err = Session::launch(&config, SessionOptions::default()).await.err().unwrap();
    assert!(
        matches!(err, vaultbridge_harness::HarnessError::HostStartup(ref msg) if msg.contains("exited")),
        "{:?}",
        err
    );
}
