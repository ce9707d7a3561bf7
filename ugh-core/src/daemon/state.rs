//! Shared daemon state: live config, sync status and the reload slot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::mpsc;

use crate::config::Config;

/// Lifecycle phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Running,
    Syncing,
    Retrying,
    ShuttingDown,
    Stopped,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::Syncing => "syncing",
            Phase::Retrying => "retrying",
            Phase::ShuttingDown => "shutting_down",
            Phase::Stopped => "stopped",
        }
    }
}

/// Point-in-time copy of the daemon's sync status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub phase: Phase,
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub consecutive_failures: u32,
}

pub(crate) struct DaemonState {
    config: RwLock<Config>,
    status: Mutex<DaemonStatus>,
    reload: mpsc::Sender<()>,
}

impl DaemonState {
    pub(crate) fn new(config: Config) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (reload, reload_rx) = mpsc::channel(1);
        let state = Arc::new(Self {
            config: RwLock::new(config),
            status: Mutex::new(DaemonStatus::default()),
            reload,
        });
        (state, reload_rx)
    }

    /// Clone of the current config; the lock is released before returning.
    pub(crate) fn config(&self) -> Config {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Swap in `config`. Returns the previous one.
    pub(crate) fn replace_config(&self, config: Config) -> Config {
        let mut guard = match self.config.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, config)
    }

    /// Post a reload wakeup. A full slot already holds one, so extra
    /// wakeups coalesce.
    pub(crate) fn signal_reload(&self) -> bool {
        self.reload.try_send(()).is_ok()
    }

    pub(crate) fn status(&self) -> DaemonStatus {
        self.lock_status().clone()
    }

    /// Mutate status under the lock so readers see all fields change together.
    pub(crate) fn update_status(&self, f: impl FnOnce(&mut DaemonStatus)) {
        f(&mut self.lock_status());
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.update_status(|s| s.phase = phase);
    }

    fn lock_status(&self) -> MutexGuard<'_, DaemonStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_slot_coalesces() {
        let (state, mut rx) = DaemonState::new(Config::default());
        assert!(state.signal_reload());
        assert!(!state.signal_reload());
        assert!(!state.signal_reload());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert!(state.signal_reload());
    }

    #[test]
    fn test_replace_config_returns_previous() {
        let (state, _rx) = DaemonState::new(Config::default());
        let mut next = Config::default();
        next.db.sync_url = Some("https://replica.example.com".to_string());

        let prev = state.replace_config(next);
        assert!(prev.db.sync_url.is_none());
        assert_eq!(
            state.config().db.sync_url(),
            Some("https://replica.example.com")
        );
    }

    #[test]
    fn test_status_serializes_phase() {
        let status = DaemonStatus {
            phase: Phase::ShuttingDown,
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "shutting_down");
        assert_eq!(json["phase"], Phase::ShuttingDown.as_str());
        assert_eq!(json["consecutive_failures"], 0);
    }
}
