//! Background sync daemon
//!
//! Reconciles the local database with the remote replica every
//! `daemon.periodic_sync`, retrying transient failures with exponential
//! backoff. The loop reacts to four events:
//!
//! | Event  | Effect |
//! |--------|--------|
//! | tick   | one sync attempt (plus retries) |
//! | reload | recreate the ticker if the interval changed |
//! | cancel | final best-effort sync, then stop |
//! | signal | SIGINT/SIGTERM, handled as cancel by [`Daemon::run_until_signal`] |
//!
//! Syncs are awaited inside the loop, so at most one is ever in flight.
//! Cancellation reaches a running sync only through its token; the future
//! is always driven to completion, so work it started on the blocking pool
//! has finished before the next sync begins.
//! The database is opened by the replicator for the duration of a sync
//! only, leaving it free for CLI processes in between.

pub mod backoff;
mod listener;
mod signal;
mod state;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{format_duration, Config};
use crate::error::{Error, Result, SyncError};
use crate::replica::{Replicator, SyncReport, SyncTarget};

pub use listener::{bind_status_listener, query_status, serve_status};
pub use signal::shutdown_signal;
pub use state::{DaemonStatus, Phase};

use state::DaemonState;

/// Time allowed for the sync that runs after cancellation.
pub const FINAL_SYNC_BUDGET: Duration = Duration::from_secs(30);

/// The sync daemon. Consumed by [`Daemon::run`]; use a [`DaemonHandle`]
/// to talk to it while it runs.
pub struct Daemon<R> {
    state: Arc<DaemonState>,
    replicator: R,
    reload_rx: mpsc::Receiver<()>,
}

/// Cloneable handle for hot reload and status reads from any thread.
#[derive(Clone)]
pub struct DaemonHandle {
    state: Arc<DaemonState>,
}

impl DaemonHandle {
    /// Replace the live config. A changed `periodic_sync` wakes the run
    /// loop, which resets its ticker; other fields apply to the next sync.
    pub fn update_config(&self, config: Config) -> Result<()> {
        config.daemon.validate()?;
        let interval = config.daemon.periodic_sync;
        let previous = self.state.replace_config(config);

        if previous.daemon.periodic_sync != interval {
            let queued = self.state.signal_reload();
            tracing::info!(
                from = %format_duration(previous.daemon.periodic_sync),
                to = %format_duration(interval),
                queued,
                "Config reloaded with new sync interval"
            );
        } else {
            tracing::info!("Config reloaded");
        }
        Ok(())
    }

    /// Snapshot of the sync status.
    pub fn status(&self) -> DaemonStatus {
        self.state.status()
    }

    /// Snapshot of the live config.
    pub fn config(&self) -> Config {
        self.state.config()
    }
}

impl<R: Replicator> Daemon<R> {
    pub fn new(config: Config, replicator: R) -> Result<Self> {
        config.daemon.validate()?;
        let (state, reload_rx) = DaemonState::new(config);
        Ok(Self {
            state,
            replicator,
            reload_rx,
        })
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Run until `cancel` fires or SIGINT/SIGTERM arrives. Shutdown by
    /// signal or token is a clean exit.
    pub async fn run_until_signal(self, cancel: CancellationToken) -> Result<()> {
        let trigger = cancel.clone();
        let signals = tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(name) => {
                    tracing::info!(signal = name, "Received shutdown signal");
                    trigger.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "Failed to install signal handlers"),
            }
        });

        let result = self.run(cancel).await;
        signals.abort();
        match result {
            Err(Error::Cancelled) => Ok(()),
            other => other,
        }
    }

    /// Run the daemon loop.
    ///
    /// Returns `Ok(())` straight away when no sync URL is configured, and
    /// `Err(Error::Cancelled)` after shutdown on cancellation. Sync failures
    /// never end the loop.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let config = self.state.config();
        self.state.update_status(|s| {
            s.phase = Phase::Starting;
            s.running = true;
            s.started_at = Some(Utc::now());
        });

        let Some(sync_url) = config.db.sync_url().map(str::to_string) else {
            tracing::info!("No sync URL configured; nothing to do");
            self.stopped();
            return Ok(());
        };

        let mut interval = config.daemon.periodic_sync;
        tracing::info!(
            interval = %format_duration(interval),
            sync_url = %sync_url,
            db = %config.effective_db_path().display(),
            retry_max = config.daemon.sync_retry_max,
            retry_backoff = %format_duration(config.daemon.sync_retry_backoff),
            "Daemon starting"
        );

        match self.sync_with_retry(&cancel).await {
            Ok(_) => tracing::info!("Initial sync complete"),
            Err(SyncError::Cancelled) => {
                self.shutdown().await;
                return Err(Error::Cancelled);
            }
            Err(e) => tracing::warn!(error = %e, "Initial sync failed; continuing"),
        }
        self.state.set_phase(Phase::Running);

        let mut ticker = new_ticker(interval);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(()) = self.reload_rx.recv() => {
                    let next = self.state.config().daemon.periodic_sync;
                    if next != interval {
                        tracing::info!(
                            from = %format_duration(interval),
                            to = %format_duration(next),
                            "Resetting sync ticker"
                        );
                        interval = next;
                        ticker = new_ticker(interval);
                    }
                }
                _ = ticker.tick() => {
                    if let Err(SyncError::Cancelled) = self.sync_with_retry(&cancel).await {
                        break;
                    }
                    self.state.set_phase(Phase::Running);
                }
            }
        }

        self.shutdown().await;
        Err(Error::Cancelled)
    }

    /// One sync attempt plus up to `sync_retry_max` retries of transient
    /// failures. Only the final failure is recorded in status.
    async fn sync_with_retry(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Option<SyncReport>, SyncError> {
        let config = self.state.config();
        let Some(target) = SyncTarget::from_config(&config) else {
            tracing::debug!("Sync URL removed; skipping sync");
            return Ok(None);
        };
        let retry_max = config.daemon.sync_retry_max;
        let initial_backoff = config.daemon.sync_retry_backoff;

        let mut retry = 0;
        loop {
            self.state.set_phase(if retry == 0 {
                Phase::Syncing
            } else {
                Phase::Retrying
            });
            tracing::debug!(attempt = retry + 1, "Sync attempt");

            let result = self.replicator.sync(&target, cancel).await;

            match result {
                Ok(report) => {
                    self.record_success();
                    tracing::debug!(
                        pulled = report.pulled,
                        pushed = report.pushed,
                        generation = ?report.generation,
                        "Sync succeeded"
                    );
                    return Ok(Some(report));
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) if e.is_retryable() && retry < retry_max => {
                    retry += 1;
                    let delay = backoff::retry_delay(retry, initial_backoff);
                    tracing::debug!(error = %e, retry, delay = ?delay, "Sync failed; retrying");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    let mut failures = 0;
                    self.state.update_status(|s| {
                        s.consecutive_failures += 1;
                        s.last_sync_error = Some(e.to_string());
                        failures = s.consecutive_failures;
                    });
                    tracing::error!(
                        error = %e,
                        attempts = retry + 1,
                        consecutive_failures = failures,
                        "Sync failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Final best-effort sync under a fresh token. Past
    /// [`FINAL_SYNC_BUDGET`] the token is cancelled and the sync is awaited
    /// until it winds down.
    async fn shutdown(&self) {
        self.state.set_phase(Phase::ShuttingDown);
        tracing::info!("Daemon shutting down");

        if let Some(target) = SyncTarget::from_config(&self.state.config()) {
            let fresh = CancellationToken::new();
            let sync = self.replicator.sync(&target, &fresh);
            tokio::pin!(sync);
            let result = tokio::select! {
                result = &mut sync => result,
                _ = tokio::time::sleep(FINAL_SYNC_BUDGET) => {
                    tracing::warn!(budget = ?FINAL_SYNC_BUDGET, "Final sync timed out; cancelling");
                    fresh.cancel();
                    sync.await
                }
            };
            match result {
                Ok(_) => {
                    self.record_success();
                    tracing::info!("Final sync complete");
                }
                Err(SyncError::Cancelled) => {}
                Err(e) => tracing::warn!(error = %e, "Final sync failed"),
            }
        }

        self.stopped();
        tracing::info!("Daemon stopped");
    }

    fn record_success(&self) {
        self.state.update_status(|s| {
            s.last_sync_time = Some(Utc::now());
            s.last_sync_error = None;
            s.consecutive_failures = 0;
        });
    }

    fn stopped(&self) {
        self.state.update_status(|s| {
            s.phase = Phase::Stopped;
            s.running = false;
        });
    }
}

/// Ticker whose first fire is one full interval from now.
fn new_ticker(interval: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted results, then succeeds. Records when each call
    /// started and how many overlapped.
    #[derive(Default)]
    struct Scripted {
        script: Mutex<VecDeque<std::result::Result<SyncReport, SyncError>>>,
        calls: Mutex<Vec<Instant>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        latency: Duration,
    }

    impl Scripted {
        fn new(script: Vec<std::result::Result<SyncReport, SyncError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn with_latency(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                latency,
                ..Default::default()
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Replicator for Scripted {
        async fn sync(
            &self,
            _target: &SyncTarget,
            cancel: &CancellationToken,
        ) -> std::result::Result<SyncReport, SyncError> {
            let n = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlight(&self.in_flight);
            self.max_in_flight.fetch_max(n, Ordering::SeqCst);
            self.calls.lock().unwrap().push(Instant::now());
            if !self.latency.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(self.latency) => {}
                }
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(SyncReport::default()))
        }
    }

    /// Works on the blocking pool and, like a SQLite snapshot, cannot be
    /// interrupted once started; the token is only checked afterwards.
    #[derive(Default)]
    struct BlockingWork {
        work: Duration,
        calls: AtomicUsize,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Replicator for BlockingWork {
        async fn sync(
            &self,
            _target: &SyncTarget,
            cancel: &CancellationToken,
        ) -> std::result::Result<SyncReport, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = Arc::clone(&self.running);
            let max_running = Arc::clone(&self.max_running);
            let work = self.work;
            tokio::task::spawn_blocking(move || {
                let n = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(n, Ordering::SeqCst);
                std::thread::sleep(work);
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .map_err(|e| SyncError::Fatal(e.to_string()))?;
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            Ok(SyncReport::default())
        }
    }

    /// Decrements on drop so cancelled calls are not counted as running.
    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn transient() -> std::result::Result<SyncReport, SyncError> {
        Err(SyncError::Transient("connection refused".to_string()))
    }

    fn config(interval: Duration, retry_max: u32, backoff: Duration) -> Config {
        let mut config = Config::default();
        config.db.path = Some(PathBuf::from("/tmp/ugh-daemon-test/ugh.db"));
        config.db.sync_url = Some("https://replica.example.com".to_string());
        config.daemon.periodic_sync = interval;
        config.daemon.sync_retry_max = retry_max;
        config.daemon.sync_retry_backoff = backoff;
        config
    }

    fn within(actual: Duration, expected: Duration) -> bool {
        actual >= expected && actual < expected + Duration::from_millis(5)
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_sync_url_exits_cleanly() {
        let replica = Scripted::new(vec![]);
        let mut config = config(Duration::from_secs(1), 3, Duration::from_secs(1));
        config.db.sync_url = Some(String::new());

        let daemon = Daemon::new(config, Arc::clone(&replica)).unwrap();
        let handle = daemon.handle();
        daemon.run(CancellationToken::new()).await.unwrap();

        assert!(replica.calls().is_empty());
        let status = handle.status();
        assert_eq!(status.phase, Phase::Stopped);
        assert!(!status.running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_then_recovery() {
        let ms = Duration::from_millis;
        let replica = Scripted::new(vec![transient(), transient(), transient()]);
        let daemon = Daemon::new(
            config(Duration::from_secs(3600), 2, ms(10)),
            Arc::clone(&replica),
        )
        .unwrap();
        let handle = daemon.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(daemon.run(cancel.clone()));

        tokio::time::sleep(ms(100)).await;
        let calls = replica.calls();
        assert_eq!(calls.len(), 3, "initial attempt plus two retries");
        assert!(within(calls[1] - calls[0], ms(10)));
        assert!(within(calls[2] - calls[1], ms(20)));

        let status = handle.status();
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_sync_error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(status.phase, Phase::Running);
        assert!(status.running);

        // Next tick succeeds
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(replica.calls().len(), 4);
        let status = handle.status();
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_sync_error.is_none());
        assert!(status.last_sync_time.is_some());

        cancel.cancel();
        assert!(matches!(task.await.unwrap(), Err(Error::Cancelled)));
        assert!(!handle.status().running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_accumulate_across_ticks() {
        let replica = Scripted::new(vec![transient(), transient(), transient()]);
        let daemon = Daemon::new(
            config(Duration::from_secs(60), 0, Duration::from_secs(1)),
            Arc::clone(&replica),
        )
        .unwrap();
        let handle = daemon.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(daemon.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.status().consecutive_failures, 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(handle.status().consecutive_failures, 2);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(handle.status().consecutive_failures, 3);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(handle.status().consecutive_failures, 0);

        cancel.cancel();
        let _ = task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_returns_promptly() {
        let replica = Scripted::new((0..10).map(|_| transient()).collect());
        let daemon = Daemon::new(
            config(Duration::from_secs(3600), 5, Duration::from_secs(10)),
            Arc::clone(&replica),
        )
        .unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(daemon.run(cancel.clone()));

        // Inside the first 10s backoff
        tokio::time::sleep(Duration::from_secs(1)).await;
        let cancelled_at = Instant::now();
        cancel.cancel();

        assert!(matches!(task.await.unwrap(), Err(Error::Cancelled)));
        assert!(Instant::now() - cancelled_at < Duration::from_millis(10));
        // Initial attempt, then the final flush; no retry after cancel
        assert_eq!(replica.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hot_reload_resets_ticker() {
        let replica = Scripted::new(vec![]);
        let start = Instant::now();
        let daemon = Daemon::new(
            config(Duration::from_secs(1), 0, Duration::from_secs(1)),
            Arc::clone(&replica),
        )
        .unwrap();
        let handle = daemon.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(daemon.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(replica.calls().len(), 2, "initial sync plus first tick");

        let reload_at = Instant::now();
        handle
            .update_config(config(Duration::from_secs(5), 0, Duration::from_secs(1)))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(7)).await;
        let calls = replica.calls();
        assert_eq!(calls.len(), 3, "no fire at the old 1s cadence");
        assert!(within(calls[1] - start, Duration::from_secs(1)));
        assert!(within(calls[2] - reload_at, Duration::from_secs(5)));

        cancel.cancel();
        let _ = task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_without_interval_change_keeps_cadence() {
        let replica = Scripted::new(vec![]);
        let daemon = Daemon::new(
            config(Duration::from_secs(2), 0, Duration::from_secs(1)),
            Arc::clone(&replica),
        )
        .unwrap();
        let handle = daemon.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(daemon.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let mut next = config(Duration::from_secs(2), 4, Duration::from_secs(1));
        next.db.auth_token = Some("rotated".to_string());
        handle.update_config(next).unwrap();
        assert_eq!(handle.config().daemon.sync_retry_max, 4);

        tokio::time::sleep(Duration::from_secs(2)).await;
        // t=0, t=2, t=4
        assert_eq!(replica.calls().len(), 3);

        cancel.cancel();
        let _ = task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_errors_are_not_retried() {
        let replica = Scripted::new(vec![Err(SyncError::Fatal("401 unauthorized".to_string()))]);
        let daemon = Daemon::new(
            config(Duration::from_secs(3600), 3, Duration::from_millis(10)),
            Arc::clone(&replica),
        )
        .unwrap();
        let handle = daemon.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(daemon.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(replica.calls().len(), 1);
        let status = handle.status();
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_sync_error.unwrap().contains("401"));

        cancel.cancel();
        let _ = task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_sync_in_flight() {
        let replica = Scripted::with_latency(Duration::from_secs(3));
        let daemon = Daemon::new(
            config(Duration::from_secs(1), 0, Duration::from_secs(1)),
            Arc::clone(&replica),
        )
        .unwrap();
        let handle = daemon.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(daemon.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(4)).await;
        // Reload while a sync is in flight
        handle
            .update_config(config(Duration::from_secs(2), 0, Duration::from_secs(1)))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        cancel.cancel();
        let _ = task.await.unwrap();
        assert!(replica.calls().len() >= 3);
        assert_eq!(replica.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_waits_for_blocking_sync_before_final_sync() {
        let replica = Arc::new(BlockingWork {
            work: Duration::from_millis(300),
            ..Default::default()
        });
        let daemon = Daemon::new(
            config(Duration::from_millis(100), 0, Duration::from_millis(10)),
            Arc::clone(&replica),
        )
        .unwrap();
        let handle = daemon.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(daemon.run(cancel.clone()));

        // Mid-way through the initial sync
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();

        assert!(matches!(task.await.unwrap(), Err(Error::Cancelled)));
        assert_eq!(replica.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(replica.running.load(Ordering::SeqCst), 0);
        // Initial sync, then the final flush
        assert_eq!(replica.calls.load(Ordering::SeqCst), 2);
        assert_eq!(handle.status().phase, Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_sync_is_cancelled_past_budget() {
        let replica = Scripted::with_latency(FINAL_SYNC_BUDGET * 2);
        let daemon = Daemon::new(
            config(Duration::from_secs(3600), 0, Duration::from_secs(1)),
            Arc::clone(&replica),
        )
        .unwrap();
        let handle = daemon.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(daemon.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let cancelled_at = Instant::now();
        cancel.cancel();

        assert!(matches!(task.await.unwrap(), Err(Error::Cancelled)));
        let elapsed = Instant::now() - cancelled_at;
        assert!(within(elapsed, FINAL_SYNC_BUDGET), "{elapsed:?}");
        assert_eq!(replica.calls().len(), 2);
        assert_eq!(replica.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(handle.status().last_sync_time.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_signal_treats_cancel_as_clean_exit() {
        let replica = Scripted::new(vec![]);
        let daemon = Daemon::new(
            config(Duration::from_secs(60), 0, Duration::from_secs(1)),
            Arc::clone(&replica),
        )
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        daemon.run_until_signal(cancel).await.unwrap();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut bad = config(Duration::from_secs(1), 0, Duration::from_secs(1));
        bad.daemon.periodic_sync = Duration::ZERO;
        assert!(Daemon::new(bad.clone(), Scripted::new(vec![])).is_err());

        let daemon = Daemon::new(
            config(Duration::from_secs(1), 0, Duration::from_secs(1)),
            Scripted::new(vec![]),
        )
        .unwrap();
        let handle = daemon.handle();
        assert!(handle.update_config(bad).is_err());
        assert_eq!(handle.config().daemon.periodic_sync, Duration::from_secs(1));
    }
}
