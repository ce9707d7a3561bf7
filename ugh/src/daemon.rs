//! `ugh daemon ...` subcommands

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use ugh_core::daemon::{bind_status_listener, query_status, serve_status};
use ugh_core::service::{self, InstallConfig, ServiceManager, ServiceStatus};
use ugh_core::{logging, Config, Daemon, DaemonHandle, DaemonStatus, HttpReplica};

use crate::daemon_lock;
use crate::output::Output;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Install the daemon as a user service
    Install {
        /// Also serve sync status on this address (e.g. 127.0.0.1:7777)
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },

    /// Remove the user service
    Uninstall,

    Start,

    Stop,

    /// Stop (if running) and start again
    Restart,

    /// Show whether the service is installed and running
    Status {
        /// Also query the status listener of a running daemon
        #[arg(long, value_name = "ADDR")]
        addr: Option<SocketAddr>,
    },

    /// Show daemon logs
    Logs {
        /// Keep streaming new lines
        #[arg(long, short = 'f')]
        follow: bool,

        /// Number of lines to show
        #[arg(long, short = 'n', default_value_t = 50)]
        lines: usize,
    },

    /// Run the sync loop in the foreground (what the service executes)
    Run {
        /// Serve sync status as JSON on this address
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct ActionReport<'a> {
    action: &'a str,
    service: &'a str,
    path: &'a Path,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    #[serde(flatten)]
    service: ServiceStatus,
    manager: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    daemon: Option<DaemonStatus>,
}

pub async fn run(
    command: DaemonCommand,
    config_path: Option<&Path>,
    config: Config,
    out: Output,
) -> Result<()> {
    match command {
        DaemonCommand::Run { listen } => run_foreground(config_path, config, listen).await,
        DaemonCommand::Install { listen } => {
            let manager = service::detect()?;
            let mut install = InstallConfig::new(
                std::env::current_exe().context("cannot determine the ugh binary path")?,
            );
            install.config_path = match config_path {
                Some(path) => Some(
                    std::fs::canonicalize(path)
                        .with_context(|| format!("cannot resolve {}", path.display()))?,
                ),
                None => None,
            };
            install.listen = listen;
            manager.install(&install).await?;
            report(out, "install", manager.as_ref(), "Installed")
        }
        DaemonCommand::Uninstall => {
            let manager = service::detect()?;
            manager.uninstall().await?;
            report(out, "uninstall", manager.as_ref(), "Uninstalled")
        }
        DaemonCommand::Start => {
            let manager = service::detect()?;
            manager.start().await?;
            report(out, "start", manager.as_ref(), "Started")
        }
        DaemonCommand::Stop => {
            let manager = service::detect()?;
            manager.stop().await?;
            report(out, "stop", manager.as_ref(), "Stopped")
        }
        DaemonCommand::Restart => {
            let manager = service::detect()?;
            manager.restart().await?;
            report(out, "restart", manager.as_ref(), "Restarted")
        }
        DaemonCommand::Status { addr } => {
            let manager = service::detect()?;
            let service = manager.status().await?;
            let daemon = match addr {
                Some(addr) => Some(
                    query_status(addr)
                        .await
                        .with_context(|| format!("no daemon status listener at {}", addr))?,
                ),
                None => None,
            };
            let status = StatusReport {
                service,
                manager: manager.name(),
                daemon,
            };
            out.emit(&status, || status_text(&status))
        }
        DaemonCommand::Logs { follow, lines } => {
            let manager = service::detect()?;
            let cancel = cancel_on_ctrl_c();
            let mut stdout = std::io::stdout();
            manager.tail_logs(&cancel, follow, lines, &mut stdout).await?;
            Ok(())
        }
    }
}

fn report(out: Output, action: &str, manager: &dyn ServiceManager, verb: &str) -> Result<()> {
    let path = manager.service_path();
    tracing::info!(action, service = manager.name(), path = %path.display(), "Service updated");
    out.emit(
        &ActionReport {
            action,
            service: manager.name(),
            path,
        },
        || format!("{} {} service ({})", verb, manager.name(), path.display()),
    )
}

fn status_text(status: &StatusReport) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let mut lines = vec![
        format!("Service:   {}", status.manager),
        format!("Installed: {}", yes_no(status.service.installed)),
        match status.service.pid {
            Some(pid) if status.service.running => format!("Running:   yes (pid {})", pid),
            _ => format!("Running:   {}", yes_no(status.service.running)),
        },
        format!("Path:      {}", status.service.service_path.display()),
    ];
    if let Some(daemon) = &status.daemon {
        lines.push(format!("Phase:     {}", daemon.phase.as_str()));
        lines.push(format!(
            "Last sync: {}",
            daemon
                .last_sync_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        ));
        if let Some(error) = &daemon.last_sync_error {
            lines.push(format!("Error:     {}", error));
        }
        lines.push(format!("Failures:  {}", daemon.consecutive_failures));
    }
    lines.join("\n")
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

/// `ugh daemon run`: hold the per-database lock and sync until signalled.
async fn run_foreground(
    config_path: Option<&Path>,
    config: Config,
    listen: Option<String>,
) -> Result<()> {
    let _log_guard = logging::init_daemon(&config.daemon).context("failed to initialize logging")?;

    let db_path = config.effective_db_path();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        db = %db_path.display(),
        "ugh daemon starting"
    );
    let lock = daemon_lock::acquire_daemon_lock(&db_path)?;
    tracing::debug!(lock = %lock.path().display(), "Daemon lock acquired");

    let replica = HttpReplica::new().context("failed to create replica client")?;
    let daemon = Daemon::new(config, replica).context("invalid daemon configuration")?;
    let handle = daemon.handle();
    let cancel = CancellationToken::new();

    let mut helpers = Vec::new();
    if let Some(addr) = listen.as_deref().filter(|a| !a.is_empty()) {
        let listener = bind_status_listener(addr).await?;
        helpers.push(tokio::spawn(serve_status(
            listener,
            handle.clone(),
            cancel.child_token(),
        )));
    }
    helpers.push(tokio::spawn(reload_on_hangup(
        config_path.map(PathBuf::from),
        handle,
        cancel.child_token(),
    )));

    let result = daemon.run_until_signal(cancel.clone()).await;
    cancel.cancel();
    for helper in helpers {
        let _ = helper.await;
    }

    drop(lock);
    result.context("daemon failed")?;
    tracing::info!("ugh daemon stopped");
    Ok(())
}

/// Re-read the config file on SIGHUP and hand it to the running daemon.
#[cfg(unix)]
async fn reload_on_hangup(
    config_path: Option<PathBuf>,
    handle: DaemonHandle,
    cancel: CancellationToken,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                let reloaded = Config::load(config_path.as_deref())
                    .and_then(|config| handle.update_config(config));
                match reloaded {
                    Ok(()) => tracing::info!("Configuration reloaded"),
                    Err(e) => tracing::warn!(error = %e, "Ignoring config reload"),
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(
    _config_path: Option<PathBuf>,
    _handle: DaemonHandle,
    cancel: CancellationToken,
) {
    cancel.cancelled().await;
}
