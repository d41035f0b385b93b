/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Exercises the full delivery path — registry creation, staged
//! append, commit, and post-commit notification — the way a delivery
//! agent wires these pieces together, rather than any single crate's
//! unit tests in isolation.

use std::{
    collections::BTreeMap,
    io::Write,
    os::unix::net::UnixDatagram,
    sync::Arc,
    time::Duration,
};

use common::{HashMode, MailboxStoreConfig};
use mailbox::{append, Caller, MailboxRegistry, MbType, NotifyMessage, OpenIntent, SystemFlags};
use store::memory::MemoryStore;

fn registry(dir: &std::path::Path, notify_socket: Option<std::path::PathBuf>) -> MailboxRegistry {
    let mut partitions = BTreeMap::new();
    partitions.insert("default".to_string(), dir.join("spool"));
    let config = MailboxStoreConfig {
        config_dir: dir.join("conf"),
        partitions,
        default_partition: "default".to_string(),
        lock_dir: dir.join("lock"),
        deleted_prefix: "DELETED".to_string(),
        virtual_domains: false,
        default_acl: "anyone lrs".to_string(),
        hash_mode: HashMode::Full,
        folder_limit_per_user: 1000,
        max_mailbox_name_len: 490,
        notify_socket,
        update_peer: None,
    };
    MailboxRegistry::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()), config)
}

#[test]
fn append_from_stage_commits_and_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("notify.sock");
    let receiver = UnixDatagram::bind(&socket_path).unwrap();
    receiver.set_read_timeout(Some(Duration::from_secs(1))).unwrap();

    let registry = registry(dir.path(), Some(socket_path));

    let record = registry
        .create("user.smurf", &Caller::admin(), None, None, None, None, MbType::empty(), false)
        .unwrap();

    let partition_root = registry.config.partition_path(&record.partition).unwrap();
    let body = b"From: gargamel@example.com\r\nSubject: hi\r\n\r\nbody\r\n";
    let (mut stage_file, stage) = append::newstage(partition_root, std::process::id(), 1_700_000_000, 0).unwrap();
    stage_file.write_all(body).unwrap();
    drop(stage_file);

    {
        let (mut open, _lock) = registry.open_mailbox("user.smurf", OpenIntent::Iwl).unwrap();
        assert!(open.drained_actions.is_empty());

        let uid = open
            .append_from_stage(&stage.path, true, 27, 1_700_000_000, 1_700_000_000, SystemFlags::SEEN, vec![])
            .unwrap();
        assert_eq!(uid, 1);

        // commit() is expected to invoke the delivery notifier itself;
        // the receiver above was bound before this call, and nothing
        // else in this test sends to that socket.
        open.commit().unwrap();
    }
    append::remove_stage(stage).unwrap();

    let reopened = registry.lookup("user.smurf").unwrap();
    assert_eq!(reopened.uidvalidity, record.uidvalidity);

    let (message_path, last_uid, uidvalidity) = {
        let (reopened_mailbox, _lock) = registry.open_mailbox("user.smurf", OpenIntent::Irl).unwrap();
        assert_eq!(reopened_mailbox.header.exists, 1);
        assert_eq!(reopened_mailbox.header.last_uid, 1);
        (
            reopened_mailbox.dir.join("1."),
            reopened_mailbox.header.last_uid,
            reopened_mailbox.header.uidvalidity,
        )
    };
    assert_eq!(std::fs::metadata(&message_path).unwrap().len(), body.len() as u64);

    let mut buf = [0u8; 4096];
    let n = receiver.recv(&mut buf).unwrap();
    let decoded = NotifyMessage::decode(&buf[..n]).unwrap();
    assert_eq!(decoded.user, "smurf");
    assert_eq!(decoded.mailboxes.len(), 1);
    assert_eq!(decoded.mailboxes[0].mailboxname, "user.smurf");
    assert_eq!(decoded.mailboxes[0].uidnext, last_uid + 1);
    assert_eq!(decoded.mailboxes[0].uidvalidity, uidvalidity);
}

#[test]
fn second_iwl_open_after_commit_drains_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(dir.path(), None);
    registry
        .create("user.smurf", &Caller::admin(), None, None, None, None, MbType::empty(), false)
        .unwrap();

    let (open, _lock) = registry.open_mailbox("user.smurf", OpenIntent::Iwl).unwrap();
    drop(open);

    let (open, _lock) = registry.open_mailbox("user.smurf", OpenIntent::Iwl).unwrap();
    assert!(open.drained_actions.is_empty());
}
