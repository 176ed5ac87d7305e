//! Host application management - locating, spawning and stopping it

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vaultbridge_common::registry::open_uri;
use vaultbridge_common::Platform;

use crate::bridge::{Bridge, LineTransport};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};

/// Set on the host so it stays quiet about its own security settings
pub const SECURITY_WARNINGS_ENV: &str = "ELECTRON_DISABLE_SECURITY_WARNINGS";

/// How long a host that failed to connect gets to report its exit status
const EXIT_CHECK: Duration = Duration::from_secs(1);

/// Linux install locations, searched in order
const LINUX_INSTALL_DIRS: [&str; 6] = [
    "/opt/Obsidian",
    "/usr/lib/Obsidian",
    "/opt/obsidian",
    "/usr/lib/obsidian",
    "/var/lib/flatpak/app/md.obsidian.Obsidian/current/active/files",
    "/snap/obsidian/current",
];

/// Locate the installed host application bundle
///
/// `env` and `exists` are injected so discovery can be tested without
/// touching the real filesystem.
pub fn find_host_executable<E, F>(platform: Platform, env: E, exists: F) -> HarnessResult<PathBuf>
where
    E: Fn(&str) -> Option<OsString>,
    F: Fn(&Path) -> bool,
{
    platform.ensure_supported()?;

    let candidate = match platform {
        Platform::Windows => env("LOCALAPPDATA")
            .map(|dir| {
                PathBuf::from(dir)
                    .join("Obsidian")
                    .join("Resources")
                    .join("app.asar")
            })
            .filter(|path| exists(path)),
        _ => LINUX_INSTALL_DIRS
            .iter()
            .map(|dir| Path::new(dir).join("resources").join("app.asar"))
            .find(|path| exists(path)),
    };

    candidate.ok_or(HarnessError::HostNotFound)
}

/// Program and arguments used to start `program`
///
/// An `.asar` bundle is not executable on its own and runs through
/// `electron`.
pub fn host_command(program: &Path, args: &[String]) -> (PathBuf, Vec<OsString>) {
    let args = args.iter().map(OsString::from);
    if program.extension().is_some_and(|ext| ext == "asar") {
        let mut full = vec![program.as_os_str().to_os_string()];
        full.extend(args);
        (PathBuf::from("electron"), full)
    } else {
        (program.to_path_buf(), args.collect())
    }
}

/// Handle to a running host process
pub struct HostHandle {
    child: Child,
    vault_id: Option<String>,
    stop_grace: Duration,
    stderr_task: Option<JoinHandle<()>>,
}

impl HostHandle {
    /// Start the host and connect the bridge over its stdio
    ///
    /// When a vault is configured it is registered first and its open URI
    /// is passed as the last argument. A configured registry directory is
    /// exported to the host so it reads the same registry.
    pub async fn spawn(config: &HarnessConfig) -> HarnessResult<(Self, Bridge)> {
        Platform::current().ensure_supported()?;

        let program = match &config.host.program {
            Some(program) => program.clone(),
            None => find_host_executable(Platform::current(), |key| std::env::var_os(key), |path| {
                path.exists()
            })?,
        };

        let mut args = config.host.args.clone();
        let vault_id = match &config.vault {
            Some(vault) => {
                let id = config.registry()?.ensure_registered(vault)?;
                info!("Vault {} registered as {}", vault.display(), id);
                args.push(open_uri(&id)?);
                Some(id)
            }
            None => None,
        };

        let (exe, argv) = host_command(&program, &args);
        info!("Spawning host {}", exe.display());
        debug!("Host arguments: {:?}", argv);

        let mut cmd = Command::new(&exe);
        cmd.args(&argv).env(SECURITY_WARNINGS_ENV, "true");
        if let Some(dir) = &config.registry_dir {
            debug!("Host registry directory: {}", dir.display());
            cmd.envs(Platform::current().config_dir_env(dir));
        }
        cmd.envs(&config.host.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            HarnessError::HostStartup(format!("Failed to spawn {}: {}", exe.display(), e))
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(HarnessError::HostStartup("host stdio not captured".to_string()));
        };
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "vaultbridge::host", "{}", line);
                }
            })
        });

        let mut handle = HostHandle {
            child,
            vault_id,
            stop_grace: config.host.stop_grace(),
            stderr_task,
        };

        let transport = LineTransport::new(stdout, stdin);
        match Bridge::connect(transport, config.host.startup_timeout()).await {
            Ok(bridge) => {
                info!("Host is ready (pid: {:?})", handle.child.id());
                Ok((handle, bridge))
            }
            Err(e) => {
                if let Ok(Ok(status)) = tokio::time::timeout(EXIT_CHECK, handle.child.wait()).await {
                    return Err(HarnessError::HostStartup(format!(
                        "host exited before it was ready ({})",
                        status
                    )));
                }
                handle.stop().await;
                Err(e)
            }
        }
    }

    /// Registry id of the vault the host was opened with
    pub fn vault_id(&self) -> Option<&str> {
        self.vault_id.as_deref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Stop the host: SIGTERM, a grace period, then kill
    pub async fn stop(&mut self) {
        let Some(pid) = self.child.id() else {
            return;
        };
        info!("Stopping host (pid: {})", pid);

        if terminate(pid) {
            match tokio::time::timeout(self.stop_grace, self.child.wait()).await {
                Ok(Ok(status)) => debug!("Host exited with {}", status),
                Ok(Err(e)) => warn!("Waiting for host failed: {}", e),
                Err(_) => warn!("Host ignored SIGTERM, killing"),
            }
        }

        if self.child.id().is_some() {
            let _ = self.child.kill().await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

impl Drop for HostHandle {
    fn drop(&mut self) {
        if let Some(pid) = self.child.id() {
            if terminate(pid) {
                std::thread::sleep(self.stop_grace);
            }
            let _ = self.child.start_kill();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Ask the process to exit; false when no signal was sent
#[cfg(unix)]
fn terminate(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match i32::try_from(pid) {
        Ok(raw) => kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok(),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> bool {
    false
}
