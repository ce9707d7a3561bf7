//! HTTP snapshot replica
//!
//! The remote stores one SQLite snapshot per database under
//! `{sync_url}/v1/snapshot`, versioned by `ETag`. A sync:
//!
//! 1. writes a consistent local snapshot (`VACUUM INTO`) and hashes it
//! 2. pulls with `If-None-Match` (304 unchanged, 404 empty, 200 new snapshot)
//! 3. restores the remote snapshot when only the remote moved, or pushes the
//!    local one with `If-Match` when only local moved
//! 4. records generation and digest in the sidecar
//!
//! Both sides moving is a fatal conflict; there is no merge. A remote
//! snapshot byte-identical to the local one is adopted as-is, whatever the
//! sidecar says.
//!
//! Syncs of one database are serialized through a [`FileLock`] in its cache
//! directory, held until every blocking step has finished, so the daemon,
//! `ugh sync` and `ugh add` never work on the same snapshot at once.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::{RequestBuilder, StatusCode};
use rusqlite::{Connection, DatabaseName, OpenFlags};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::lock::FileLock;

use super::state::ReplicaState;
use super::{Replicator, SyncReport, SyncTarget};

const SNAPSHOT_ENDPOINT: &str = "/v1/snapshot";
const SNAPSHOT_FILE: &str = "snapshot.db";
const INCOMING_FILE: &str = "incoming.db";
const LOCK_FILE: &str = "sync.lock";
const LOCK_POLL: Duration = Duration::from_millis(100);
const SNAPSHOT_CONTENT_TYPE: &str = "application/vnd.sqlite3";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Replica client over HTTP
pub struct HttpReplica {
    http_client: reqwest::Client,
}

impl HttpReplica {
    pub fn new() -> Result<Self, SyncError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Client with a per-request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, SyncError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ugh/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Fatal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    async fn fetch(&self, target: &SyncTarget, generation: Option<&str>) -> Result<Remote, SyncError> {
        let mut request = self.authorize(self.http_client.get(snapshot_url(&target.sync_url)), target);
        if let Some(generation) = generation {
            request = request.header(IF_NONE_MATCH, generation);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        match status {
            StatusCode::NOT_MODIFIED => Ok(Remote::Unchanged),
            StatusCode::NOT_FOUND => Ok(Remote::Empty),
            s if s.is_success() => {
                let generation = etag(&response);
                let body = response.bytes().await.map_err(transport_error)?.to_vec();
                Ok(Remote::Snapshot { body, generation })
            }
            s => {
                let detail = response.text().await.unwrap_or_default();
                Err(classify_status(s, &detail))
            }
        }
    }

    async fn push(
        &self,
        target: &SyncTarget,
        generation: Option<&str>,
        body: Vec<u8>,
    ) -> Result<Option<String>, SyncError> {
        let request = self
            .authorize(self.http_client.put(snapshot_url(&target.sync_url)), target)
            .header(CONTENT_TYPE, SNAPSHOT_CONTENT_TYPE)
            .body(body);
        let request = match generation {
            Some(generation) => request.header(IF_MATCH, generation),
            None => request.header(IF_NONE_MATCH, "*"),
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(etag(&response))
        } else if status == StatusCode::PRECONDITION_FAILED {
            Err(SyncError::Fatal(
                "remote snapshot changed during sync (412 precondition failed)".to_string(),
            ))
        } else {
            let detail = response.text().await.unwrap_or_default();
            Err(classify_status(status, &detail))
        }
    }

    fn authorize(&self, request: RequestBuilder, target: &SyncTarget) -> RequestBuilder {
        match &target.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl Replicator for HttpReplica {
    async fn sync(
        &self,
        target: &SyncTarget,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        checkpoint(cancel)?;
        let lock = lock_replica(target, cancel).await?;
        let mut state = ReplicaState::load(&target.cache_dir);

        let local = {
            let db_path = target.db_path.clone();
            let cache_dir = target.cache_dir.clone();
            blocking(&lock, move || take_snapshot(&db_path, &cache_dir)).await?
        };
        let local_changed = state.local_changed(&local.digest);
        tracing::debug!(
            db = %target.db_path.display(),
            local_changed,
            generation = ?state.generation,
            "Local snapshot taken"
        );

        checkpoint(cancel)?;
        let remote = race(cancel, self.fetch(target, state.generation.as_deref())).await?;

        let mut report = SyncReport::default();
        match plan(remote, &local, local_changed, state.generation.is_some()) {
            Plan::Conflict => {
                discard(&local.path);
                return Err(SyncError::Fatal(
                    "local and remote both changed since the last sync".to_string(),
                ));
            }
            Plan::Pull { body, generation } => {
                checkpoint(cancel)?;
                let db_path = target.db_path.clone();
                let cache_dir = target.cache_dir.clone();
                let refreshed = blocking(&lock, move || {
                    restore_snapshot(&db_path, &cache_dir, &body)?;
                    take_snapshot(&db_path, &cache_dir)
                })
                .await?;
                state.generation = generation;
                state.digest = Some(refreshed.digest);
                discard(&refreshed.path);
                report.pulled = true;
            }
            Plan::Push => {
                checkpoint(cancel)?;
                let body = tokio::fs::read(&local.path).await?;
                let generation =
                    race(cancel, self.push(target, state.generation.as_deref(), body)).await?;
                state.generation = generation;
                state.digest = Some(local.digest.clone());
                report.pushed = true;
            }
            Plan::Adopt { generation } => {
                tracing::debug!(generation = ?generation, "Remote snapshot matches local");
                state.generation = generation;
                state.digest = Some(local.digest.clone());
            }
            Plan::Nothing => {
                state.digest = Some(local.digest.clone());
            }
        }
        discard(&local.path);

        state.synced_at = Some(Utc::now());
        state.save(&target.cache_dir)?;
        report.generation = state.generation.clone();

        tracing::debug!(pulled = report.pulled, pushed = report.pushed, "Sync complete");
        Ok(report)
    }
}

enum Remote {
    Unchanged,
    Empty,
    Snapshot {
        body: Vec<u8>,
        generation: Option<String>,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Plan {
    Nothing,
    /// Remote already holds the local bytes; only record its generation
    Adopt {
        generation: Option<String>,
    },
    Pull {
        body: Vec<u8>,
        generation: Option<String>,
    },
    Push,
    Conflict,
}

/// Decide what to do with a remote answer.
///
/// A database that has never synced and holds no tasks adopts the remote
/// snapshot instead of conflicting with it.
fn plan(remote: Remote, local: &LocalSnapshot, local_changed: bool, has_generation: bool) -> Plan {
    match remote {
        Remote::Snapshot { body, generation } => {
            if sha256_hex(&body) == local.digest {
                Plan::Adopt { generation }
            } else if !local_changed || (local.pristine && !has_generation) {
                Plan::Pull { body, generation }
            } else {
                Plan::Conflict
            }
        }
        Remote::Unchanged if local_changed => Plan::Push,
        Remote::Unchanged => Plan::Nothing,
        Remote::Empty if local_changed || has_generation => Plan::Push,
        Remote::Empty => Plan::Nothing,
    }
}

/// Map a non-success HTTP status to a sync error.
///
/// Timeouts, rate limiting and server errors are transient; everything else
/// (auth, bad request, missing endpoint) is fatal.
pub fn classify_status(status: StatusCode, detail: &str) -> SyncError {
    let message = match detail.trim() {
        "" => format!("remote returned {}", status),
        detail => format!("remote returned {}: {}", status, detail),
    };
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        SyncError::Transient(message)
    } else {
        SyncError::Fatal(message)
    }
}

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_builder() {
        SyncError::Fatal(format!("invalid sync request: {}", err))
    } else {
        SyncError::Transient(format!("HTTP request failed: {}", err))
    }
}

fn snapshot_url(sync_url: &str) -> String {
    format!("{}{}", sync_url.trim().trim_end_matches('/'), SNAPSHOT_ENDPOINT)
}

fn etag(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

async fn race<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, SyncError>>,
) -> Result<T, SyncError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = fut => result,
    }
}

/// Take the per-database sync lock, waiting for any other sync of the same
/// database to finish.
async fn lock_replica(
    target: &SyncTarget,
    cancel: &CancellationToken,
) -> Result<Arc<FileLock>, SyncError> {
    tokio::fs::create_dir_all(&target.cache_dir).await?;
    let path = target.cache_dir.join(LOCK_FILE);
    let note = format!("db={}", target.db_path.display());

    let mut waiting = false;
    loop {
        if let Some(lock) = FileLock::try_acquire(&path, &note)? {
            return Ok(Arc::new(lock));
        }
        if !waiting {
            tracing::debug!(lock = %path.display(), "Waiting for another sync of this database");
            waiting = true;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            _ = tokio::time::sleep(LOCK_POLL) => {}
        }
    }
}

/// Run `f` on the blocking pool. The closure keeps the sync lock alive, so
/// the lock outlasts the work even if this future is dropped.
async fn blocking<T, F>(lock: &Arc<FileLock>, f: F) -> Result<T, SyncError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
{
    let held = Arc::clone(lock);
    tokio::task::spawn_blocking(move || {
        let _held = held;
        f()
    })
    .await
    .map_err(|e| SyncError::Fatal(format!("sync worker failed: {}", e)))?
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

struct LocalSnapshot {
    path: PathBuf,
    digest: String,
    /// No tasks stored
    pristine: bool,
}

/// Open the database, copy it into the cache dir and close it again.
fn take_snapshot(db_path: &Path, cache_dir: &Path) -> Result<LocalSnapshot, SyncError> {
    std::fs::create_dir_all(cache_dir)?;
    let path = cache_dir.join(SNAPSHOT_FILE);
    remove_if_exists(&path)?;

    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let pristine = task_count(&conn)? == 0;
    let target = path.to_string_lossy().to_string();
    conn.execute("VACUUM INTO ?1", [target.as_str()])?;
    drop(conn);

    let digest = sha256_hex(&std::fs::read(&path)?);
    Ok(LocalSnapshot {
        path,
        digest,
        pristine,
    })
}

fn task_count(conn: &Connection) -> Result<i64, SyncError> {
    let has_tasks: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'tasks')",
        [],
        |row| row.get(0),
    )?;
    if !has_tasks {
        return Ok(0);
    }
    Ok(conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?)
}

/// Replace the local database with a downloaded snapshot.
fn restore_snapshot(db_path: &Path, cache_dir: &Path, body: &[u8]) -> Result<(), SyncError> {
    let incoming = cache_dir.join(INCOMING_FILE);
    std::fs::write(&incoming, body)?;

    {
        let src = Connection::open_with_flags(&incoming, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        src.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
            .map_err(|e| SyncError::Fatal(format!("remote snapshot is not a database: {}", e)))?;
    }

    let mut dst = Connection::open(db_path)?;
    dst.busy_timeout(BUSY_TIMEOUT)?;
    dst.restore(
        DatabaseName::Main,
        &incoming,
        None::<fn(rusqlite::backup::Progress)>,
    )?;
    drop(dst);

    remove_if_exists(&incoming)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), SyncError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn discard(path: &Path) {
    if let Err(e) = remove_if_exists(path) {
        tracing::debug!(path = %path.display(), error = %e, "Failed to remove snapshot");
    }
}
