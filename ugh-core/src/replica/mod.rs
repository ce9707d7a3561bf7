//! Remote replica synchronization
//!
//! The daemon and `ugh sync` talk to the remote through the [`Replicator`]
//! trait. [`HttpReplica`] is the production implementation; tests script
//! their own.
//!
//! ## Usage
//!
//! ```toml
//! [db]
//! sync_url = "https://replica.example.com/alice"
//! auth_token = "..."
//! ```

mod http;
mod state;

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{replica_cache_dir, Config};
use crate::error::SyncError;

pub use http::{classify_status, HttpReplica};
pub use state::ReplicaState;

/// Everything one sync attempt needs. Built fresh from a config snapshot
/// for each attempt so hot reloads apply to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub db_path: PathBuf,
    pub sync_url: String,
    pub auth_token: Option<String>,
    pub cache_dir: PathBuf,
}

impl SyncTarget {
    /// Build a target from config. `None` when no sync URL is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let sync_url = config.db.sync_url()?.to_string();
        let db_path = config.effective_db_path();
        let cache_dir = replica_cache_dir(&db_path);
        Some(Self {
            db_path,
            sync_url,
            auth_token: config
                .db
                .auth_token
                .clone()
                .filter(|t| !t.trim().is_empty()),
            cache_dir,
        })
    }
}

/// Outcome of a successful sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// A remote snapshot was restored locally
    pub pulled: bool,
    /// The local snapshot was uploaded
    pub pushed: bool,
    /// Remote generation after the sync
    pub generation: Option<String>,
}

/// One pull-then-push reconciliation against a remote replica.
///
/// Callers drive `sync` to completion rather than dropping it, and expect
/// `SyncError::Cancelled` soon after `cancel` fires.
#[async_trait]
pub trait Replicator: Send + Sync {
    async fn sync(
        &self,
        target: &SyncTarget,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError>;
}

#[async_trait]
impl<T: Replicator + ?Sized> Replicator for Arc<T> {
    async fn sync(
        &self,
        target: &SyncTarget,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        (**self).sync(target, cancel).await
    }
}
