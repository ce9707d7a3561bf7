//! systemd user unit

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::config::config_home;
use crate::error::ServiceError;

use super::command::{run_checked, CommandRunner};
use super::{create_private_dir, set_mode, InstallConfig, ServiceManager, ServiceStatus};

pub const UNIT_NAME: &str = "ughd.service";

const SYSTEMCTL: &str = "systemctl";
const JOURNALCTL: &str = "journalctl";
const UNIT_MODE: u32 = 0o600;
const UNIT_DIR_MODE: u32 = 0o750;

pub struct Systemd {
    unit_path: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl Systemd {
    /// Adapter for `$XDG_CONFIG_HOME/systemd/user/ughd.service`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_unit_path(config_home().join("systemd").join("user").join(UNIT_NAME), runner)
    }

    pub fn with_unit_path(unit_path: PathBuf, runner: Arc<dyn CommandRunner>) -> Self {
        Self { unit_path, runner }
    }

    fn installed(&self) -> bool {
        self.unit_path.exists()
    }

    async fn systemctl(&self, args: &[&str]) -> Result<String, ServiceError> {
        let mut full = vec!["--user"];
        full.extend_from_slice(args);
        Ok(run_checked(self.runner.as_ref(), SYSTEMCTL, &full).await?.stdout)
    }

    async fn is_active(&self) -> Result<bool, ServiceError> {
        let output = self
            .runner
            .run(SYSTEMCTL, &["--user", "is-active", UNIT_NAME])
            .await?;
        Ok(output.success && output.stdout.trim() == "active")
    }

    async fn main_pid(&self) -> Result<Option<u32>, ServiceError> {
        let stdout = self
            .systemctl(&["show", "-p", "MainPID", "--value", UNIT_NAME])
            .await?;
        Ok(stdout.trim().parse::<u32>().ok().filter(|pid| *pid > 0))
    }
}

/// Render the unit file.
pub fn render_unit(config: &InstallConfig) -> String {
    let exec_start = config
        .program_arguments()
        .iter()
        .map(|arg| quote(arg))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "[Unit]\n\
         Description=ugh daemon - background sync\n\
         After=network.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={exec_start}\n\
         Restart=on-failure\n\
         RestartSec=5\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n"
    )
}

/// Quote an ExecStart argument when it contains whitespace or quotes.
fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

#[async_trait]
impl ServiceManager for Systemd {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn service_path(&self) -> &Path {
        &self.unit_path
    }

    async fn install(&self, config: &InstallConfig) -> Result<(), ServiceError> {
        if self.installed() {
            return Err(ServiceError::AlreadyInstalled(
                self.unit_path.display().to_string(),
            ));
        }
        if let Some(dir) = self.unit_path.parent() {
            create_private_dir(dir, UNIT_DIR_MODE)?;
        }
        std::fs::write(&self.unit_path, render_unit(config))?;
        set_mode(&self.unit_path, UNIT_MODE)?;

        let registered = async {
            self.systemctl(&["daemon-reload"]).await?;
            self.systemctl(&["enable", UNIT_NAME]).await
        }
        .await;
        if let Err(e) = registered {
            let _ = std::fs::remove_file(&self.unit_path);
            return Err(e);
        }

        tracing::info!(path = %self.unit_path.display(), "Installed systemd unit");
        Ok(())
    }

    async fn uninstall(&self) -> Result<(), ServiceError> {
        if !self.installed() {
            return Err(ServiceError::NotInstalled);
        }
        match self.stop().await {
            Ok(()) | Err(ServiceError::NotRunning) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to stop service before uninstall"),
        }
        if let Err(e) = self.systemctl(&["disable", UNIT_NAME]).await {
            tracing::warn!(error = %e, "Failed to disable unit");
        }
        std::fs::remove_file(&self.unit_path)?;
        if let Err(e) = self.systemctl(&["daemon-reload"]).await {
            tracing::warn!(error = %e, "daemon-reload after uninstall failed");
        }
        tracing::info!(path = %self.unit_path.display(), "Removed systemd unit");
        Ok(())
    }

    async fn start(&self) -> Result<(), ServiceError> {
        if !self.installed() {
            return Err(ServiceError::NotInstalled);
        }
        self.systemctl(&["start", UNIT_NAME]).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if !self.installed() || !self.is_active().await? {
            return Err(ServiceError::NotRunning);
        }
        self.systemctl(&["stop", UNIT_NAME]).await?;
        Ok(())
    }

    async fn status(&self) -> Result<ServiceStatus, ServiceError> {
        let installed = self.installed();
        let running = installed && self.is_active().await?;
        let pid = if running { self.main_pid().await? } else { None };
        Ok(ServiceStatus {
            installed,
            running,
            pid,
            service_path: self.unit_path.clone(),
        })
    }

    fn log_path(&self) -> Option<PathBuf> {
        None
    }

    async fn tail_logs(
        &self,
        cancel: &CancellationToken,
        follow: bool,
        lines: usize,
        sink: &mut (dyn Write + Send),
    ) -> Result<(), ServiceError> {
        let count = lines.to_string();
        let mut args = vec!["--user", "-u", UNIT_NAME, "--no-pager", "-n", count.as_str()];
        if follow {
            args.push("-f");
        }

        let mut child = tokio::process::Command::new(JOURNALCTL)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServiceError::Command {
                command: JOURNALCTL.to_string(),
                message: e.to_string(),
            })?;
        let stdout = child.stdout.take().ok_or_else(|| ServiceError::Command {
            command: JOURNALCTL.to_string(),
            message: "no stdout".to_string(),
        })?;
        let mut reader = BufReader::new(stdout).lines();

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = reader.next_line() => line?,
            };
            match line {
                Some(line) => writeln!(sink, "{}", line)?,
                None => break,
            }
        }

        let _ = child.start_kill();
        let _ = child.wait().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::command::fake::FakeRunner;
    use super::super::command::CommandOutput;
    use super::*;
    use tempfile::TempDir;

    const EXPECTED_UNIT: &str = "[Unit]
Description=ugh daemon - background sync
After=network.target

[Service]
Type=simple
ExecStart=/usr/local/bin/ugh daemon run --config /home/alice/.config/ugh/config.toml
Restart=on-failure
RestartSec=5

[Install]
WantedBy=default.target
";

    fn adapter(dir: &TempDir) -> (Systemd, Arc<FakeRunner>) {
        let runner = Arc::new(FakeRunner::default());
        let path = dir.path().join("systemd/user").join(UNIT_NAME);
        (Systemd::with_unit_path(path, runner.clone()), runner)
    }

    fn install_config() -> InstallConfig {
        InstallConfig {
            binary_path: PathBuf::from("/usr/local/bin/ugh"),
            config_path: Some(PathBuf::from("/home/alice/.config/ugh/config.toml")),
            listen: None,
        }
    }

    #[test]
    fn test_render_unit_is_exact() {
        assert_eq!(render_unit(&install_config()), EXPECTED_UNIT);
    }

    #[test]
    fn test_render_unit_without_config() {
        let unit = render_unit(&InstallConfig::new("/usr/bin/ugh"));
        assert!(unit.contains("\nExecStart=/usr/bin/ugh daemon run\n"));
    }

    #[test]
    fn test_render_unit_quotes_spaces() {
        let unit = render_unit(&InstallConfig::new("/opt/my tools/ugh"));
        assert!(unit.contains("ExecStart=\"/opt/my tools/ugh\" daemon run\n"));
    }

    #[tokio::test]
    async fn test_install_writes_unit_and_enables() {
        let dir = TempDir::new().unwrap();
        let (systemd, runner) = adapter(&dir);

        systemd.install(&install_config()).await.unwrap();

        let written = std::fs::read_to_string(systemd.service_path()).unwrap();
        assert_eq!(written, EXPECTED_UNIT);
        assert_eq!(
            runner.calls(),
            vec![
                "systemctl --user daemon-reload",
                "systemctl --user enable ughd.service",
            ]
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode(systemd.service_path()), 0o600);
            assert_eq!(mode(systemd.service_path().parent().unwrap()), 0o750);
        }
    }

    #[tokio::test]
    async fn test_install_twice_is_already_installed() {
        let dir = TempDir::new().unwrap();
        let (systemd, _runner) = adapter(&dir);
        systemd.install(&install_config()).await.unwrap();

        let err = systemd.install(&install_config()).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyInstalled(_)));
    }

    #[tokio::test]
    async fn test_failed_enable_removes_unit() {
        let dir = TempDir::new().unwrap();
        let (systemd, runner) = adapter(&dir);
        runner.respond(
            "systemctl --user enable ughd.service",
            CommandOutput::failed("Failed to connect to bus"),
        );

        let err = systemd.install(&install_config()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Command { .. }));
        assert!(!systemd.service_path().exists());
    }

    #[tokio::test]
    async fn test_not_installed_sentinels() {
        let dir = TempDir::new().unwrap();
        let (systemd, _runner) = adapter(&dir);

        assert!(matches!(systemd.start().await, Err(ServiceError::NotInstalled)));
        assert!(matches!(systemd.uninstall().await, Err(ServiceError::NotInstalled)));
        assert!(matches!(systemd.stop().await, Err(ServiceError::NotRunning)));

        let status = systemd.status().await.unwrap();
        assert!(!status.installed);
        assert!(!status.running);
        assert_eq!(status.pid, None);
    }

    #[tokio::test]
    async fn test_stop_when_inactive_is_not_running() {
        let dir = TempDir::new().unwrap();
        let (systemd, runner) = adapter(&dir);
        systemd.install(&install_config()).await.unwrap();
        runner.respond(
            "systemctl --user is-active ughd.service",
            CommandOutput {
                success: false,
                stdout: "inactive\n".to_string(),
                stderr: String::new(),
            },
        );

        assert!(matches!(systemd.stop().await, Err(ServiceError::NotRunning)));
    }

    #[tokio::test]
    async fn test_status_reports_pid() {
        let dir = TempDir::new().unwrap();
        let (systemd, runner) = adapter(&dir);
        systemd.install(&install_config()).await.unwrap();
        runner.respond(
            "systemctl --user is-active ughd.service",
            CommandOutput::ok("active\n"),
        );
        runner.respond(
            "systemctl --user show -p MainPID --value ughd.service",
            CommandOutput::ok("4242\n"),
        );

        let status = systemd.status().await.unwrap();
        assert!(status.installed);
        assert!(status.running);
        assert_eq!(status.pid, Some(4242));
        assert_eq!(status.service_path, systemd.service_path());
    }

    #[tokio::test]
    async fn test_restart_starts_stopped_service() {
        let dir = TempDir::new().unwrap();
        let (systemd, runner) = adapter(&dir);
        systemd.install(&install_config()).await.unwrap();
        runner.respond(
            "systemctl --user is-active ughd.service",
            CommandOutput::failed(""),
        );

        systemd.restart().await.unwrap();
        assert_eq!(
            runner.calls().last().map(String::as_str),
            Some("systemctl --user start ughd.service")
        );
    }

    #[tokio::test]
    async fn test_uninstall_removes_unit() {
        let dir = TempDir::new().unwrap();
        let (systemd, runner) = adapter(&dir);
        systemd.install(&install_config()).await.unwrap();
        runner.respond(
            "systemctl --user is-active ughd.service",
            CommandOutput::ok("active\n"),
        );

        systemd.uninstall().await.unwrap();
        assert!(!systemd.service_path().exists());
        let calls = runner.calls();
        assert!(calls.contains(&"systemctl --user stop ughd.service".to_string()));
        assert!(calls.contains(&"systemctl --user disable ughd.service".to_string()));
    }
}
