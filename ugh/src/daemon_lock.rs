//! Process lock so only one `ugh daemon run` serves a given database.
//!
//! The lock is a [`FileLock`] in the runtime directory, scoped by a hash
//! of the database path and held for the daemon's lifetime.

use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use ugh_core::lock::FileLock;

const DAEMON_LOCK_FILE: &str = "ughd.lock";

/// Held by `daemon run`; releases the lock and removes its file on drop.
pub struct DaemonGuard {
    lock: FileLock,
}

impl DaemonGuard {
    pub fn path(&self) -> &Path {
        self.lock.path()
    }
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.lock.path());
    }
}

/// Take the daemon lock for `db_path`, failing if another daemon holds it.
pub fn acquire_daemon_lock(db_path: &Path) -> Result<DaemonGuard> {
    let dir = lock_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create runtime lock directory: {}", dir.display()))?;

    let path = dir.join(scoped_lock_filename(DAEMON_LOCK_FILE, db_path));
    let note = format!("db={}", db_path.display());
    match FileLock::try_acquire(&path, &note)
        .with_context(|| format!("failed to lock file: {}", path.display()))?
    {
        Some(lock) => Ok(DaemonGuard { lock }),
        None => anyhow::bail!(
            "another ugh daemon is already running for {}",
            db_path.display()
        ),
    }
}

fn lock_dir() -> PathBuf {
    let mut dir = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => std::env::temp_dir(),
    };
    dir.push("ugh");
    dir
}

fn scoped_lock_filename(base_filename: &str, db_path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    db_path.to_string_lossy().hash(&mut hasher);
    let digest = hasher.finish();
    format!("{base_filename}.{digest:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_filename_is_scoped_by_db_path() {
        let a = scoped_lock_filename(DAEMON_LOCK_FILE, Path::new("/tmp/a/ugh.db"));
        let b = scoped_lock_filename(DAEMON_LOCK_FILE, Path::new("/tmp/b/ugh.db"));
        assert!(a.starts_with("ughd.lock."));
        assert_ne!(a, b);
        assert_eq!(
            a,
            scoped_lock_filename(DAEMON_LOCK_FILE, Path::new("/tmp/a/ugh.db"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_second_daemon_is_refused_until_release() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("ugh.db");

        let guard = acquire_daemon_lock(&db_path).unwrap();
        assert!(guard.path().exists());

        let err = acquire_daemon_lock(&db_path).err().unwrap();
        assert!(err.to_string().contains("already running"));

        drop(guard);
        assert!(acquire_daemon_lock(&db_path).is_ok());
    }

    #[test]
    fn test_different_databases_do_not_conflict() {
        let dir = TempDir::new().unwrap();
        let _a = acquire_daemon_lock(&dir.path().join("a.db")).unwrap();
        let _b = acquire_daemon_lock(&dir.path().join("b.db")).unwrap();
    }
}
