//! launchd user agent (macOS)

use async_trait::async_trait;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::home_dir;
use crate::error::ServiceError;

use super::command::{run_checked, CommandRunner};
use super::{last_lines, set_mode, InstallConfig, ServiceManager, ServiceStatus};

pub const LABEL: &str = "com.ugh.daemon";

const LAUNCHCTL: &str = "launchctl";
const LOG_FILE: &str = "ughd.log";
const PLIST_MODE: u32 = 0o644;
const FOLLOW_POLL: Duration = Duration::from_millis(500);

pub struct Launchd {
    plist_path: PathBuf,
    log_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl Launchd {
    /// Adapter for `~/Library/LaunchAgents/com.ugh.daemon.plist` logging to
    /// `~/Library/Logs/ugh/`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        let library = home_dir().join("Library");
        Self::with_paths(
            library.join("LaunchAgents").join(format!("{LABEL}.plist")),
            library.join("Logs").join("ugh"),
            runner,
        )
    }

    pub fn with_paths(plist_path: PathBuf, log_dir: PathBuf, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            plist_path,
            log_dir,
            runner,
        }
    }

    fn installed(&self) -> bool {
        self.plist_path.exists()
    }

    fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE)
    }

    fn plist_arg(&self) -> String {
        self.plist_path.display().to_string()
    }

    /// PID from `launchctl list <label>`, if loaded and running.
    async fn loaded_pid(&self) -> Result<(bool, Option<u32>), ServiceError> {
        let output = self.runner.run(LAUNCHCTL, &["list", LABEL]).await?;
        if !output.success {
            return Ok((false, None));
        }
        Ok((true, parse_pid(&output.stdout)))
    }
}

/// Extract `"PID" = 123;` from `launchctl list <label>` output.
fn parse_pid(listing: &str) -> Option<u32> {
    listing.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("\"PID\"")?;
        let value = rest.trim_start().strip_prefix('=')?;
        value.trim().trim_end_matches(';').trim().parse().ok()
    })
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Render the agent plist.
pub fn render_plist(config: &InstallConfig, log_file: &Path) -> String {
    let arguments: String = config
        .program_arguments()
        .iter()
        .map(|arg| format!("\t\t<string>{}</string>\n", xml_escape(arg)))
        .collect();
    let log = xml_escape(&log_file.display().to_string());
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>Label</key>
	<string>{LABEL}</string>
	<key>ProgramArguments</key>
	<array>
{arguments}	</array>
	<key>RunAtLoad</key>
	<false/>
	<key>KeepAlive</key>
	<dict>
		<key>SuccessfulExit</key>
		<false/>
	</dict>
	<key>StandardOutPath</key>
	<string>{log}</string>
	<key>StandardErrorPath</key>
	<string>{log}</string>
	<key>ProcessType</key>
	<string>Background</string>
</dict>
</plist>
"#
    )
}

#[async_trait]
impl ServiceManager for Launchd {
    fn name(&self) -> &'static str {
        "launchd"
    }

    fn service_path(&self) -> &Path {
        &self.plist_path
    }

    async fn install(&self, config: &InstallConfig) -> Result<(), ServiceError> {
        if self.installed() {
            return Err(ServiceError::AlreadyInstalled(
                self.plist_path.display().to_string(),
            ));
        }
        if let Some(dir) = self.plist_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::write(&self.plist_path, render_plist(config, &self.log_file()))?;
        set_mode(&self.plist_path, PLIST_MODE)?;

        let plist = self.plist_arg();
        if let Err(e) = run_checked(self.runner.as_ref(), LAUNCHCTL, &["load", &plist]).await {
            let _ = std::fs::remove_file(&self.plist_path);
            return Err(e);
        }

        tracing::info!(path = %self.plist_path.display(), "Installed launchd agent");
        Ok(())
    }

    async fn uninstall(&self) -> Result<(), ServiceError> {
        if !self.installed() {
            return Err(ServiceError::NotInstalled);
        }
        match self.stop().await {
            Ok(()) | Err(ServiceError::NotRunning) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to stop agent before uninstall"),
        }
        let plist = self.plist_arg();
        if let Err(e) = run_checked(self.runner.as_ref(), LAUNCHCTL, &["unload", &plist]).await {
            tracing::warn!(error = %e, "Failed to unload agent");
        }
        std::fs::remove_file(&self.plist_path)?;
        tracing::info!(path = %self.plist_path.display(), "Removed launchd agent");
        Ok(())
    }

    async fn start(&self) -> Result<(), ServiceError> {
        if !self.installed() {
            return Err(ServiceError::NotInstalled);
        }
        run_checked(self.runner.as_ref(), LAUNCHCTL, &["start", LABEL]).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServiceError> {
        if !self.installed() {
            return Err(ServiceError::NotRunning);
        }
        let (_, pid) = self.loaded_pid().await?;
        if pid.is_none() {
            return Err(ServiceError::NotRunning);
        }
        run_checked(self.runner.as_ref(), LAUNCHCTL, &["stop", LABEL]).await?;
        Ok(())
    }

    async fn status(&self) -> Result<ServiceStatus, ServiceError> {
        let installed = self.installed();
        let pid = if installed {
            self.loaded_pid().await?.1
        } else {
            None
        };
        Ok(ServiceStatus {
            installed,
            running: pid.is_some(),
            pid,
            service_path: self.plist_path.clone(),
        })
    }

    fn log_path(&self) -> Option<PathBuf> {
        Some(self.log_file())
    }

    async fn tail_logs(
        &self,
        cancel: &CancellationToken,
        follow: bool,
        lines: usize,
        sink: &mut (dyn Write + Send),
    ) -> Result<(), ServiceError> {
        let path = self.log_file();
        let mut offset = match std::fs::read(&path) {
            Ok(bytes) => {
                // A crash mid-write can leave a partial UTF-8 sequence behind
                let text = String::from_utf8_lossy(&bytes);
                for line in last_lines(&text, lines) {
                    writeln!(sink, "{}", line)?;
                }
                bytes.len() as u64
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && follow => 0,
            Err(e) => return Err(e.into()),
        };
        sink.flush()?;

        if !follow {
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(FOLLOW_POLL) => {}
            }
            let Ok(mut file) = std::fs::File::open(&path) else {
                continue;
            };
            let len = file.metadata()?.len();
            if len < offset {
                // Truncated or rotated
                offset = 0;
            }
            if len == offset {
                continue;
            }
            file.seek(SeekFrom::Start(offset))?;
            let mut appended = Vec::new();
            file.read_to_end(&mut appended)?;
            offset += appended.len() as u64;
            sink.write_all(&appended)?;
            sink.flush()?;
        }
    }
}
