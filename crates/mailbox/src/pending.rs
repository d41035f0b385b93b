/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Pending-action queue (§4.3.1): readers holding a shared lock post a
//! compact tag recording a side effect that must land under the next
//! exclusive-lock acquisition. The queue is a flat append-only file;
//! draining reads it in FIFO order and truncates it so a second drain
//! (absent new posts) sees nothing.

use std::{
    fs::OpenOptions,
    io::{BufRead, BufReader, Write},
    path::PathBuf,
};

pub struct ActionQueue {
    path: PathBuf,
}

impl ActionQueue {
    pub fn new(path: PathBuf) -> Self {
        ActionQueue { path }
    }

    /// Appends `tag` to the queue without requiring the mailbox to be
    /// open for write.
    pub fn post_action(&self, tag: u64) -> trc::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{tag:016x}")?;
        Ok(())
    }

    /// Drains every queued tag in FIFO order and truncates the queue.
    /// Returns an empty vector if nothing was queued.
    pub fn drain(&self) -> trc::Result<Vec<u64>> {
        let file = match OpenOptions::new().read(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut tags = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            if let Ok(tag) = u64::from_str_radix(line.trim(), 16) {
                tags.push(tag);
            }
        }
        // Truncate in place rather than unlinking, so a concurrent
        // `post_action` racing the drain either lands before the
        // truncation (and is read here) or after it (and is kept for
        // the next drain).
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(tags)
    }
}
