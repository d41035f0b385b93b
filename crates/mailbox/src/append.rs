/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Append engine (§4.4): a staged message is written once per
//! partition, then hard-linked (or copied across partitions) into
//! every destination mailbox, so fan-out to N recipients in the same
//! partition costs one on-disk copy.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

/// A file in a partition's stage directory, named uniquely by
/// `(pid, internaldate, msgnum)` so concurrent deliveries never
/// collide without needing a lock.
pub struct StageHandle {
    pub path: PathBuf,
}

/// Creates a new staged file under `<partition_root>/stage./`.
pub fn newstage(partition_root: &Path, pid: u32, internaldate: i64, msgnum: u32) -> trc::Result<(fs::File, StageHandle)> {
    let stage_dir = partition_root.join("stage.");
    fs::create_dir_all(&stage_dir)?;
    let path = stage_dir.join(format!("{pid}-{internaldate}-{msgnum}"));
    let file = fs::OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
    Ok((file, StageHandle { path }))
}

/// Removes a staged file once every destination mailbox has linked
/// or copied it.
pub fn remove_stage(stage: StageHandle) -> trc::Result<()> {
    match fs::remove_file(&stage.path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// A directive returned by the annotation callout, merged into the
/// final index record for a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalloutDirective {
    AddFlag(String),
    RemoveFlag(String),
    Annotation { name: String, value: String },
}

/// Invokes the annotation callout with a fixed 10s timeout (§4.4,
/// §5): a timeout or malformed response aborts the hook without
/// failing the delivery, so the caller always gets a (possibly empty)
/// directive list back.
pub fn run_callout(
    hook: impl FnOnce(&str, &[String], &[u8]) -> trc::Result<Vec<CalloutDirective>> + Send + 'static,
    filename: String,
    annotations: Vec<String>,
    body: Vec<u8>,
) -> Vec<CalloutDirective> {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let result = hook(&filename, &annotations, &body).unwrap_or_default();
        let _ = tx.send(result);
    });
    rx.recv_timeout(Duration::from_secs(10)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newstage_names_are_unique_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let (mut file_a, stage_a) = newstage(dir.path(), 100, 1_700_000_000, 0).unwrap();
        let (mut file_b, stage_b) = newstage(dir.path(), 100, 1_700_000_000, 1).unwrap();
        write!(file_a, "a").unwrap();
        write!(file_b, "b").unwrap();
        assert_ne!(stage_a.path, stage_b.path);
        assert_eq!(fs::read_to_string(&stage_a.path).unwrap(), "a");
    }

    #[test]
    fn remove_stage_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (_file, stage) = newstage(dir.path(), 1, 0, 0).unwrap();
        let path = stage.path.clone();
        remove_stage(stage).unwrap();
        assert!(!path.exists());
        // Removing an already-gone stage file is not an error.
        remove_stage(StageHandle { path }).unwrap();
    }

    #[test]
    fn callout_returns_directives_within_timeout() {
        let directives = run_callout(
            |_filename, _annotations, _body| Ok(vec![CalloutDirective::AddFlag("\\Important".to_string())]),
            "msg".to_string(),
            vec![],
            b"body".to_vec(),
        );
        assert_eq!(directives, vec![CalloutDirective::AddFlag("\\Important".to_string())]);
    }

    #[test]
    fn callout_timeout_yields_empty_directives() {
        let directives = run_callout(
            |_filename, _annotations, _body| {
                std::thread::sleep(Duration::from_millis(50));
                Err(trc::Error::new(trc::EventType::Mailbox(trc::MailboxEvent::Internal)))
            },
            "msg".to_string(),
            vec![],
            b"body".to_vec(),
        );
        assert!(directives.is_empty());
    }
}
