/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! The per-name monotonic modseq counter backing `next_modseq`.
//!
//! Counters live one-per-file (`<name>.modseq`) so a rename can carry
//! or drop the file independently of the KV registry. Updates are
//! serialised with a blocking exclusive `flock` on the counter file
//! itself, since the counter is consulted far more often than it is
//! renamed.

use std::{
    fs::OpenOptions,
    io::{Read, Seek, SeekFrom, Write},
    os::unix::io::AsRawFd,
    path::Path,
};

fn flock_exclusive(fd: i32) -> trc::Result<()> {
    loop {
        let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err.into());
        }
    }
}

/// Returns a value strictly greater than both the counter file's
/// previous contents and `proposed`, and persists it. Creates the
/// counter file (starting from 0) if it does not exist.
pub fn next_modseq(path: &Path, proposed: u64) -> trc::Result<u64> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).read(true).write(true).open(path)?;
    flock_exclusive(file.as_raw_fd())?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    let previous: u64 = contents.trim().parse().unwrap_or(0);

    let next = previous.max(proposed) + 1;

    file.seek(SeekFrom::Start(0))?;
    file.set_len(0)?;
    write!(file, "{next}")?;
    file.sync_all()?;

    // Dropping `file` releases the flock.
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_sequence_matches_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bloggs.com!user.fred.modseq");

        assert_eq!(next_modseq(&path, 0).unwrap(), 1);
        assert_eq!(next_modseq(&path, 0).unwrap(), 2);
        assert_eq!(next_modseq(&path, 100).unwrap(), 101);
        assert_eq!(next_modseq(&path, 5).unwrap(), 102);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/name.modseq");
        assert_eq!(next_modseq(&path, 0).unwrap(), 1);
    }
}
