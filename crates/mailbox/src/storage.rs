/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Per-mailbox on-disk state machine (§4.3): header + index + cache +
//! message files, opened with shared (`irl`) or exclusive (`iwl`)
//! intent, committed atomically.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use sha1::{Digest, Sha1};

use crate::{
    codec::{decode_header, decode_index_record, encode_header, encode_index_record, INDEX_RECORD_SIZE},
    model::{Header, IndexRecord, SystemFlags},
    notify::{MailboxUpdate, NotifyMessage, Notifier},
    pending::ActionQueue,
};

const HEADER_FILE: &str = "cyrus.header";
const INDEX_FILE: &str = "cyrus.index";
const CACHE_FILE: &str = "cyrus.cache";
const EXPUNGE_FILE: &str = "cyrus.expunge";

/// Intent with which a mailbox is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenIntent {
    /// Index read lock: shared.
    Irl,
    /// Index write lock: exclusive.
    Iwl,
}

/// Initialises a brand-new mailbox directory with an empty header,
/// index and cache. Fails with `StoreEvent::Exists` if the directory
/// is already populated.
pub fn create_on_disk(dir: &Path, uniqueid: &str, acl: &str, uidvalidity: u32) -> trc::Result<()> {
    if dir.join(HEADER_FILE).exists() {
        return Err(trc::Error::new(trc::EventType::Store(trc::StoreEvent::Exists))
            .ctx(trc::Key::Path, dir.display().to_string())
            .caused_by(trc::location!()));
    }
    fs::create_dir_all(dir)?;
    let header = Header::new(uniqueid.to_string(), acl.to_string(), uidvalidity);
    fs::write(dir.join(HEADER_FILE), encode_header(&header))?;
    fs::write(dir.join(INDEX_FILE), [])?;
    fs::write(dir.join(CACHE_FILE), [])?;
    fs::write(dir.join(EXPUNGE_FILE), [])?;
    Ok(())
}

/// Removes every file belonging to a mailbox directory. Used by
/// immediate `delete` and by [`crate::registry::MailboxRegistry::reap`].
pub fn remove_on_disk(dir: &Path) -> trc::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn read_header(dir: &Path) -> trc::Result<Header> {
    let bytes = fs::read(dir.join(HEADER_FILE))?;
    decode_header(&bytes)
}

fn read_index(dir: &Path, flag_name_count: usize) -> trc::Result<Vec<IndexRecord>> {
    let bytes = fs::read(dir.join(INDEX_FILE))?;
    let mut records = Vec::with_capacity(bytes.len() / INDEX_RECORD_SIZE);
    for chunk in bytes.chunks(INDEX_RECORD_SIZE) {
        records.push(decode_index_record(chunk, flag_name_count).map_err(|e| {
            trc::Error::new(trc::EventType::Mailbox(trc::MailboxEvent::HeaderCorrupt))
                .ctx(trc::Key::Reason, e.to_string())
                .caused_by(trc::location!())
        })?);
    }
    Ok(records)
}

/// A handle to an opened mailbox. Staged appends and expunges are
/// held in memory until [`OpenMailbox::commit`]; [`OpenMailbox::abort`]
/// discards them (and any message files written in this session).
pub struct OpenMailbox {
    pub dir: PathBuf,
    pub intent: OpenIntent,
    pub header: Header,
    pub records: Vec<IndexRecord>,
    new_message_files: Vec<PathBuf>,
    dirty: bool,
    /// Tags drained from the pending-action queue on `iwl` open, for
    /// the caller to apply inside this write critical section.
    pub drained_actions: Vec<u64>,
    mailboxname: String,
    notify_user: Option<String>,
    notifier: Notifier,
}

impl OpenMailbox {
    /// `mailboxname` and `notify_user` (the mailbox's owning userid,
    /// if it has one) are carried only to build the post-commit
    /// [`NotifyMessage`]; `notify_socket` is the configured delivery
    /// notifier socket, or `None` to make [`OpenMailbox::commit`]'s
    /// notification step a no-op.
    pub fn open(
        dir: PathBuf,
        intent: OpenIntent,
        queue: &ActionQueue,
        mailboxname: String,
        notify_user: Option<String>,
        notify_socket: Option<PathBuf>,
    ) -> trc::Result<Self> {
        let header = read_header(&dir)?;
        let records = read_index(&dir, header.flag_names.len())?;
        let drained_actions = match intent {
            OpenIntent::Iwl => queue.drain()?,
            OpenIntent::Irl => Vec::new(),
        };
        Ok(OpenMailbox {
            dir,
            intent,
            header,
            records,
            new_message_files: Vec::new(),
            dirty: false,
            drained_actions,
            mailboxname,
            notify_user,
            notifier: Notifier::new(notify_socket),
        })
    }

    fn require_iwl(&self) -> trc::Result<()> {
        if self.intent != OpenIntent::Iwl {
            return Err(trc::Error::new(trc::EventType::Mailbox(trc::MailboxEvent::Internal))
                .ctx(trc::Key::Reason, "mutation requires an exclusive (iwl) open".to_string())
                .caused_by(trc::location!()));
        }
        Ok(())
    }

    /// Appends one message: assigns `uid = last_uid + 1`,
    /// `modseq = highestmodseq + 1`, writes the message file, and
    /// stages an index record. Requires `iwl`.
    pub fn append_record(
        &mut self,
        body: &[u8],
        hdrsize: u32,
        internaldate: i64,
        sentdate: i64,
        system_flags: SystemFlags,
        user_flags: Vec<bool>,
    ) -> trc::Result<u32> {
        self.require_iwl()?;

        let uid = self.header.last_uid + 1;
        let modseq = self.header.highestmodseq + 1;

        let message_path = self.dir.join(format!("{uid}."));
        fs::write(&message_path, body)?;
        self.new_message_files.push(message_path);

        let mut hasher = Sha1::new();
        hasher.update(body);
        let guid: [u8; 20] = hasher.finalize().into();

        self.records.push(IndexRecord {
            uid,
            internaldate,
            sentdate,
            size: body.len() as u32,
            hdrsize,
            system_flags,
            user_flags,
            guid,
            modseq,
            cache_offset: 0,
        });

        self.header.last_uid = uid;
        self.header.highestmodseq = modseq;
        self.header.exists += 1;
        self.header.last_appenddate = internaldate;
        self.dirty = true;
        Ok(uid)
    }

    /// Like [`OpenMailbox::append_record`], but materialises the
    /// message file by hard-linking (same partition) or copying
    /// (cross-partition) a staged file rather than writing fresh
    /// bytes, so a single delivery to many mailboxes in one partition
    /// costs one copy on disk (§4.4 single-instance store).
    pub fn append_from_stage(
        &mut self,
        stage_path: &Path,
        same_partition: bool,
        hdrsize: u32,
        internaldate: i64,
        sentdate: i64,
        system_flags: SystemFlags,
        user_flags: Vec<bool>,
    ) -> trc::Result<u32> {
        self.require_iwl()?;

        let uid = self.header.last_uid + 1;
        let modseq = self.header.highestmodseq + 1;
        let message_path = self.dir.join(format!("{uid}."));

        if same_partition {
            fs::hard_link(stage_path, &message_path)?;
        } else {
            fs::copy(stage_path, &message_path)?;
        }
        self.new_message_files.push(message_path.clone());

        let body = fs::read(&message_path)?;
        let mut hasher = Sha1::new();
        hasher.update(&body);
        let guid: [u8; 20] = hasher.finalize().into();

        self.records.push(IndexRecord {
            uid,
            internaldate,
            sentdate,
            size: body.len() as u32,
            hdrsize,
            system_flags,
            user_flags,
            guid,
            modseq,
            cache_offset: 0,
        });

        self.header.last_uid = uid;
        self.header.highestmodseq = modseq;
        self.header.exists += 1;
        self.header.last_appenddate = internaldate;
        self.dirty = true;
        Ok(uid)
    }

    /// Marks every record matching `predicate` as `DELETED` and
    /// records an expunge-journal entry. The message file is not
    /// unlinked until [`crate::registry::MailboxRegistry::reap`] runs.
    pub fn expunge(&mut self, mut predicate: impl FnMut(&IndexRecord) -> bool) -> trc::Result<Vec<u32>> {
        self.require_iwl()?;
        let mut expunged = Vec::new();
        for record in &mut self.records {
            if predicate(record) && !record.system_flags.contains(SystemFlags::DELETED) {
                record.system_flags |= SystemFlags::DELETED;
                self.header.deleted_count += 1;
                expunged.push(record.uid);
            }
        }
        if !expunged.is_empty() {
            let mut journal = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(EXPUNGE_FILE))?;
            for uid in &expunged {
                writeln!(journal, "{uid}")?;
            }
            self.dirty = true;
        }
        Ok(expunged)
    }

    /// Fsyncs cache, index, then header, in that order, persists the
    /// staged index to disk, and invokes the delivery notifier with
    /// the mailbox's new modseq/uidnext/uidvalidity.
    pub fn commit(self) -> trc::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut index_bytes = Vec::with_capacity(self.records.len() * INDEX_RECORD_SIZE);
        for record in &self.records {
            encode_index_record(record, &mut index_bytes);
        }

        let cache_path = self.dir.join(CACHE_FILE);
        let cache = fs::OpenOptions::new().append(true).open(&cache_path)?;
        cache.sync_all()?;

        fs::write(self.dir.join(INDEX_FILE), &index_bytes)?;
        fs::File::open(self.dir.join(INDEX_FILE))?.sync_all()?;

        fs::write(self.dir.join(HEADER_FILE), encode_header(&self.header))?;
        fs::File::open(self.dir.join(HEADER_FILE))?.sync_all()?;

        self.notifier.notify(&NotifyMessage {
            user: self.notify_user.clone().unwrap_or_else(|| self.mailboxname.clone()),
            service: "mailbox".to_string(),
            session: String::new(),
            mailboxes: vec![MailboxUpdate {
                mailboxname: self.mailboxname.clone(),
                modseq: self.header.highestmodseq,
                uidnext: self.header.last_uid + 1,
                uidvalidity: self.header.uidvalidity,
            }],
        });
        Ok(())
    }

    /// Discards every staged change, including message files written
    /// in this session.
    pub fn abort(self) -> trc::Result<()> {
        for path in &self.new_message_files {
            let _ = fs::remove_file(path);
        }
        Ok(())
    }
}

/// Hard-links (same partition) or copies (cross-partition) every live
/// message file from `old_dir` into `new_dir`, and writes a fresh
/// header there with a new `uidvalidity` but the preserved
/// `last_uid`/`highestmodseq`.
pub fn rename_copy(old_dir: &Path, new_dir: &Path, new_uidvalidity: u32, same_partition: bool) -> trc::Result<()> {
    fs::create_dir_all(new_dir)?;
    let mut header = read_header(old_dir)?;
    let records = read_index(old_dir, header.flag_names.len())?;

    for record in &records {
        let file_name = format!("{}.", record.uid);
        let from = old_dir.join(&file_name);
        let to = new_dir.join(&file_name);
        if same_partition {
            if let Err(e) = fs::hard_link(&from, &to) {
                if e.kind() != std::io::ErrorKind::AlreadyExists {
                    return Err(e.into());
                }
            }
        } else {
            fs::copy(&from, &to)?;
        }
    }

    header.uidvalidity = new_uidvalidity;
    fs::write(new_dir.join(HEADER_FILE), encode_header(&header))?;

    let mut index_bytes = Vec::with_capacity(records.len() * INDEX_RECORD_SIZE);
    for record in &records {
        encode_index_record(record, &mut index_bytes);
    }
    fs::write(new_dir.join(INDEX_FILE), &index_bytes)?;

    let cache = fs::read(old_dir.join(CACHE_FILE)).unwrap_or_default();
    fs::write(new_dir.join(CACHE_FILE), cache)?;
    fs::write(new_dir.join(EXPUNGE_FILE), [])?;
    Ok(())
}
