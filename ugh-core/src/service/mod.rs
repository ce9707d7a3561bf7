//! Installing the daemon as a user-level system service
//!
//! [`ServiceManager`] is implemented once per platform:
//!
//! | Platform | Adapter | Service file |
//! |----------|---------|--------------|
//! | Linux with `systemctl` | [`Systemd`] | `$XDG_CONFIG_HOME/systemd/user/ughd.service` |
//! | macOS | [`Launchd`] | `~/Library/LaunchAgents/com.ugh.daemon.plist` |
//!
//! Everything else gets [`ServiceError::UnsupportedPlatform`].

mod command;
mod launchd;
mod systemd;

use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ServiceError;

pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use launchd::{render_plist, Launchd, LABEL};
pub use systemd::{render_unit, Systemd, UNIT_NAME};

/// What the installed service runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    pub binary_path: PathBuf,
    pub config_path: Option<PathBuf>,
    /// Status listener address passed as `--listen`
    pub listen: Option<String>,
}

impl InstallConfig {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            config_path: None,
            listen: None,
        }
    }

    /// `<binary> daemon run [--config <path>] [--listen <addr>]`
    pub fn program_arguments(&self) -> Vec<String> {
        let mut args = vec![
            self.binary_path.display().to_string(),
            "daemon".to_string(),
            "run".to_string(),
        ];
        if let Some(config) = &self.config_path {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        if let Some(listen) = self.listen.as_deref().filter(|l| !l.is_empty()) {
            args.push("--listen".to_string());
            args.push(listen.to_string());
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub installed: bool,
    pub running: bool,
    pub pid: Option<u32>,
    pub service_path: PathBuf,
}

/// Platform service manager
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// `"systemd"` or `"launchd"`
    fn name(&self) -> &'static str;

    /// Path of the unit or plist this adapter manages.
    fn service_path(&self) -> &Path;

    /// Write the service file and register it. Fails with
    /// `AlreadyInstalled` when the file exists.
    async fn install(&self, config: &InstallConfig) -> Result<(), ServiceError>;

    /// Stop (best-effort), deregister and delete the service file. Fails
    /// with `NotInstalled` when there is none.
    async fn uninstall(&self) -> Result<(), ServiceError>;

    async fn start(&self) -> Result<(), ServiceError>;

    /// Fails with `NotRunning` when the service isn't running.
    async fn stop(&self) -> Result<(), ServiceError>;

    async fn status(&self) -> Result<ServiceStatus, ServiceError>;

    /// Daemon log file, or `None` when logs go to the system journal.
    fn log_path(&self) -> Option<PathBuf>;

    /// Write the last `lines` log lines to `sink`; with `follow`, keep
    /// streaming until `cancel` fires.
    async fn tail_logs(
        &self,
        cancel: &CancellationToken,
        follow: bool,
        lines: usize,
        sink: &mut (dyn Write + Send),
    ) -> Result<(), ServiceError>;

    /// Stop (ignoring `NotRunning`), then start.
    async fn restart(&self) -> Result<(), ServiceError> {
        match self.stop().await {
            Ok(()) | Err(ServiceError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.start().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Systemd,
    Launchd,
    Unsupported,
}

/// Pick an adapter from the OS name (`std::env::consts::OS`) and whether
/// `systemctl` is on PATH.
pub fn select(os: &str, has_systemctl: bool) -> ServiceKind {
    match os {
        "linux" if has_systemctl => ServiceKind::Systemd,
        "macos" => ServiceKind::Launchd,
        _ => ServiceKind::Unsupported,
    }
}

/// The service manager for this machine.
pub fn detect() -> Result<Box<dyn ServiceManager>, ServiceError> {
    let os = std::env::consts::OS;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    match select(os, find_in_path("systemctl").is_some()) {
        ServiceKind::Systemd => Ok(Box::new(Systemd::new(runner))),
        ServiceKind::Launchd => Ok(Box::new(Launchd::new(runner))),
        ServiceKind::Unsupported => Err(ServiceError::UnsupportedPlatform(if os == "linux" {
            "linux without systemctl".to_string()
        } else {
            os.to_string()
        })),
    }
}

/// Locate an executable on PATH.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Create `dir` (and parents) with `mode` on Unix.
pub(crate) fn create_private_dir(dir: &Path, mode: u32) -> Result<(), ServiceError> {
    std::fs::create_dir_all(dir)?;
    set_mode(dir, mode)
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<(), ServiceError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> Result<(), ServiceError> {
    Ok(())
}

/// The last `n` lines of `text`.
pub(crate) fn last_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(n);
    lines[skip..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select() {
        assert_eq!(select("linux", true), ServiceKind::Systemd);
        assert_eq!(select("linux", false), ServiceKind::Unsupported);
        assert_eq!(select("macos", false), ServiceKind::Launchd);
        assert_eq!(select("macos", true), ServiceKind::Launchd);
        assert_eq!(select("windows", false), ServiceKind::Unsupported);
        assert_eq!(select("freebsd", true), ServiceKind::Unsupported);
    }

    #[test]
    fn test_program_arguments() {
        let mut config = InstallConfig::new("/usr/local/bin/ugh");
        assert_eq!(
            config.program_arguments(),
            vec!["/usr/local/bin/ugh", "daemon", "run"]
        );

        config.config_path = Some(PathBuf::from("/home/alice/.config/ugh/config.toml"));
        config.listen = Some("127.0.0.1:7777".to_string());
        assert_eq!(
            config.program_arguments(),
            vec![
                "/usr/local/bin/ugh",
                "daemon",
                "run",
                "--config",
                "/home/alice/.config/ugh/config.toml",
                "--listen",
                "127.0.0.1:7777",
            ]
        );
    }

    #[test]
    fn test_last_lines() {
        assert_eq!(last_lines("a\nb\nc\n", 2), vec!["b", "c"]);
        assert_eq!(last_lines("a\nb", 10), vec!["a", "b"]);
        assert!(last_lines("a\nb", 0).is_empty());
        assert!(last_lines("", 5).is_empty());
    }

    #[test]
    fn test_find_in_path_misses_nonsense() {
        assert!(find_in_path("ugh-definitely-not-a-real-binary").is_none());
    }
}
