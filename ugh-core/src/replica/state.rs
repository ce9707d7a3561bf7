//! Sidecar state recorded after each successful sync
//!
//! Lives next to the snapshot cache as `replica-state.json`. Losing it is
//! harmless: the next sync treats local as changed and pushes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SyncError;

pub const STATE_FILE: &str = "replica-state.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaState {
    /// Remote generation (`ETag`) last pulled or pushed
    pub generation: Option<String>,
    /// SHA-256 of the local snapshot at that generation
    pub digest: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl ReplicaState {
    pub fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(STATE_FILE)
    }

    /// Load the sidecar. A missing or unreadable file yields the empty state.
    pub fn load(cache_dir: &Path) -> Self {
        let path = Self::path(cache_dir);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt replica state");
                Self::default()
            }
        }
    }

    /// Write the sidecar atomically (temp file + rename).
    pub fn save(&self, cache_dir: &Path) -> Result<(), SyncError> {
        std::fs::create_dir_all(cache_dir)?;
        let path = Self::path(cache_dir);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(self)
            .map_err(|e| SyncError::Fatal(format!("failed to encode replica state: {}", e)))?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// True when the local snapshot differs from the one last synced.
    pub fn local_changed(&self, digest: &str) -> bool {
        self.digest.as_deref() != Some(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_state_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(ReplicaState::load(dir.path()), ReplicaState::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let state = ReplicaState {
            generation: Some("\"g7\"".to_string()),
            digest: Some("abc".to_string()),
            synced_at: Some(Utc::now()),
        };
        state.save(dir.path()).unwrap();
        assert_eq!(ReplicaState::load(dir.path()), state);
    }

    #[test]
    fn test_corrupt_state_is_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(ReplicaState::path(dir.path()), "{not json").unwrap();
        assert_eq!(ReplicaState::load(dir.path()), ReplicaState::default());
    }

    #[test]
    fn test_local_changed() {
        let state = ReplicaState {
            digest: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(!state.local_changed("abc"));
        assert!(state.local_changed("def"));
        assert!(ReplicaState::default().local_changed("abc"));
    }
}
