//! Advisory file locks
//!
//! An exclusive `flock` on a small file, released when the [`FileLock`] is
//! dropped. Used to keep a single daemon per database and to serialize
//! syncs of one database across processes. Every `try_acquire` opens its
//! own file description, so two locks on one path conflict even inside a
//! single process.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Exclusive lock on a file; unlocked on drop. The file itself is left in
/// place.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Try to lock `path` without blocking, creating the file if needed.
    ///
    /// Returns `Ok(None)` when someone else holds the lock. On success the
    /// file is rewritten with the owner's pid followed by `note`.
    pub fn try_acquire(path: &Path, note: &str) -> io::Result<Option<Self>> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match lock_file_nonblocking(&file) {
            Ok(()) => {}
            Err(e) if is_lock_busy(&e) => return Ok(None),
            Err(e) => return Err(e),
        }

        // Owner info for debugging.
        let _ = file.set_len(0);
        let _ = file.seek(SeekFrom::Start(0));
        let _ = writeln!(file, "pid={}", std::process::id());
        if !note.is_empty() {
            let _ = writeln!(file, "{}", note);
        }
        let _ = file.flush();

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = unlock_file(&self.file);
    }
}

fn is_lock_busy(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock)
        || matches!(error.raw_os_error(), Some(11) | Some(35))
}

#[cfg(unix)]
fn lock_file_nonblocking(file: &File) -> io::Result<()> {
    use std::os::fd::AsRawFd;
    const LOCK_EX: i32 = 2;
    const LOCK_NB: i32 = 4;
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(file.as_raw_fd(), LOCK_EX | LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock_file(file: &File) -> io::Result<()> {
    use std::os::fd::AsRawFd;
    const LOCK_UN: i32 = 8;
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(file.as_raw_fd(), LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
extern "C" {
    fn flock(fd: i32, operation: i32) -> i32;
}

// No service manager is supported off Unix, so the lock file alone is kept.
#[cfg(not(unix))]
fn lock_file_nonblocking(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock_file(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_second_lock_is_refused_until_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.lock");

        let held = FileLock::try_acquire(&path, "db=/tmp/ugh.db").unwrap().unwrap();
        assert_eq!(held.path(), path);
        assert!(FileLock::try_acquire(&path, "").unwrap().is_none());

        drop(held);
        assert!(FileLock::try_acquire(&path, "").unwrap().is_some());
    }

    #[test]
    fn test_lock_file_records_owner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ughd.lock");
        let _held = FileLock::try_acquire(&path, "db=/tmp/ugh.db").unwrap().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            format!("pid={}\ndb=/tmp/ugh.db\n", std::process::id())
        );
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(FileLock::try_acquire(&dir.path().join("nope/x.lock"), "").is_err());
    }
}
