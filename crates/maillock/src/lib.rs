/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Per-mailbox advisory locking.
//!
//! A process-wide table, keyed by canonical mailbox name, owning one
//! open file descriptor per locked mailbox. Recursive acquisition
//! within the same process is reference-counted rather than
//! re-`flock`ed (a second `flock` on the same fd would be a no-op on
//! Linux but is still modelled explicitly so mode mismatches are
//! caught): a second `acquire` for a name already held must request
//! the same [`LockMode`] or fails with `MAILBOX_LOCKED`.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    os::unix::io::AsRawFd,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

/// The intent with which a mailbox lockfile is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
    /// Exclusive, but fails immediately with `MAILBOX_LOCKED` instead
    /// of blocking if the lock is contested.
    NonblockExclusive,
}

impl LockMode {
    fn flock_operation(self) -> i32 {
        match self {
            LockMode::Shared => libc::LOCK_SH,
            LockMode::Exclusive => libc::LOCK_EX,
            LockMode::NonblockExclusive => libc::LOCK_EX | libc::LOCK_NB,
        }
    }

    /// The mode two concurrent holders must agree on to share an
    /// entry; `NonblockExclusive` and `Exclusive` hold the same kind
    /// of lock, so they're compatible with each other but not with
    /// `Shared`.
    fn is_exclusive(self) -> bool {
        !matches!(self, LockMode::Shared)
    }
}

struct Entry {
    file: File,
    mode: LockMode,
    refcount: u32,
}

/// Process-wide table of held per-mailbox locks.
#[derive(Clone)]
pub struct LockTable {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl LockTable {
    pub fn new() -> Self {
        LockTable {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Acquires the lock for `name`, whose lockfile lives at `path`.
    /// If the name is already held in this process, the acquisition
    /// is recursive: the mode must match the held mode, and only the
    /// refcount is bumped.
    pub fn acquire(&self, name: &str, path: &Path, mode: LockMode) -> trc::Result<LockGuard> {
        let mut table = self.inner.lock();
        if let Some(entry) = table.get_mut(name) {
            if entry.mode.is_exclusive() != mode.is_exclusive() {
                return Err(mode_mismatch(name));
            }
            entry.refcount += 1;
            return Ok(LockGuard {
                table: self.clone(),
                name: name.to_string(),
            });
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        if let Err(err) = flock_retrying_eintr(&file, mode.flock_operation()) {
            if matches!(mode, LockMode::NonblockExclusive) && err.kind() == std::io::ErrorKind::WouldBlock {
                return Err(locked(name));
            }
            return Err(err.into());
        }

        table.insert(
            name.to_string(),
            Entry {
                file,
                mode,
                refcount: 1,
            },
        );
        Ok(LockGuard {
            table: self.clone(),
            name: name.to_string(),
        })
    }

    fn release(&self, name: &str) {
        let mut table = self.inner.lock();
        if let Some(entry) = table.get_mut(name) {
            entry.refcount -= 1;
            if entry.refcount == 0 {
                if let Some(entry) = table.remove(name) {
                    let _ = unsafe { libc::flock(entry.file.as_raw_fd(), libc::LOCK_UN) };
                }
            }
        }
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Issues `flock(2)` with `operation`, retrying on `EINTR`.
fn flock_retrying_eintr(file: &File, operation: i32) -> std::io::Result<()> {
    loop {
        let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn mode_mismatch(name: &str) -> trc::Error {
    trc::Error::new(trc::EventType::Lock(trc::LockEvent::ModeMismatch))
        .ctx(trc::Key::MailboxName, name.to_string())
        .caused_by(trc::location!())
}

fn locked(name: &str) -> trc::Error {
    trc::Error::new(trc::EventType::Lock(trc::LockEvent::Locked))
        .ctx(trc::Key::MailboxName, name.to_string())
        .caused_by(trc::location!())
}

/// Releases the per-mailbox lock reference when dropped.
pub struct LockGuard {
    table: LockTable,
    name: String,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.table.release(&self.name);
    }
}

/// Derives the lockfile path for `name` under `lock_dir`, hashed by
/// its first byte so a single directory doesn't accumulate one entry
/// per mailbox on disk.
pub fn lockfile_path(lock_dir: &Path, name: &str) -> PathBuf {
    let letter = name.chars().next().map(|c| c.to_ascii_lowercase()).unwrap_or('q');
    lock_dir.join(letter.to_string()).join(format!("{name}.lock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_then_recursive_exclusive_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = lockfile_path(dir.path(), "user.fred");
        let table = LockTable::new();

        let first = table.acquire("user.fred", &path, LockMode::Exclusive).unwrap();
        let second = table.acquire("user.fred", &path, LockMode::Exclusive).unwrap();
        drop(second);
        drop(first);
    }

    #[test]
    fn recursive_mode_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = lockfile_path(dir.path(), "user.fred");
        let table = LockTable::new();

        let _held = table.acquire("user.fred", &path, LockMode::Shared).unwrap();
        let err = table.acquire("user.fred", &path, LockMode::Exclusive).unwrap_err();
        assert_eq!(err.event, trc::EventType::Lock(trc::LockEvent::ModeMismatch));
    }

    #[test]
    fn release_on_drop_allows_reacquisition() {
        let dir = tempfile::tempdir().unwrap();
        let path = lockfile_path(dir.path(), "user.fred");
        let table = LockTable::new();

        {
            let _held = table.acquire("user.fred", &path, LockMode::Exclusive).unwrap();
        }
        let _held_again = table.acquire("user.fred", &path, LockMode::Exclusive).unwrap();
    }

    #[test]
    fn nonblock_exclusive_fails_immediately_when_contested_across_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = lockfile_path(dir.path(), "user.fred");
        let table_a = LockTable::new();
        let table_b = LockTable::new();

        let _held = table_a.acquire("user.fred", &path, LockMode::Exclusive).unwrap();
        let err = table_b
            .acquire("user.fred", &path, LockMode::NonblockExclusive)
            .unwrap_err();
        assert_eq!(err.event, trc::EventType::Lock(trc::LockEvent::Locked));
    }
}
